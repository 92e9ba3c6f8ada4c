//! CloudEvents-compatible event envelope and its compact projection.
//!
//! The full form carries the standard `specversion`/`type`/`source`/`id`/
//! `time` attributes plus the `pars*` extension attributes. The compact form
//! is a short-key projection used by low-overhead transports; converting to
//! compact and back reconstructs an equivalent full event, with `source`
//! optionally supplied at decode time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::DeliveryGuarantee;

/// CloudEvents spec version stamped on every event.
pub const EVENT_SPEC_VERSION: &str = "1.0";

/// Content type stamped on events carrying JSON data.
pub const EVENT_CONTENT_TYPE: &str = "application/json";

/// Current wall-clock time truncated to millisecond precision.
///
/// Event times are kept at millisecond resolution so the compact form's
/// epoch-millis `t` field round-trips without loss.
#[must_use]
pub fn timestamp_now() -> DateTime<Utc> {
    let millis = Utc::now().timestamp_millis();
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// ParsEvent
// ---------------------------------------------------------------------------

/// Full event envelope. Attribute names follow the CloudEvents convention of
/// lowercase single words; extension attributes carry the `pars` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsEvent {
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Name of the emitting service.
    pub source: String,
    pub id: String,
    /// Emission time, millisecond precision.
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub datacontenttype: Option<String>,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subject: Option<String>,
    #[serde(rename = "parstenantid", skip_serializing_if = "Option::is_none", default)]
    pub tenant_id: Option<String>,
    #[serde(rename = "parsrequestid", skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    #[serde(rename = "parstracecontext", skip_serializing_if = "Option::is_none", default)]
    pub trace_context: Option<String>,
    #[serde(rename = "parsdelivery", skip_serializing_if = "Option::is_none", default)]
    pub delivery: Option<DeliveryGuarantee>,
}

impl ParsEvent {
    /// Projects this event into the compact short-key form.
    #[must_use]
    pub fn to_compact(&self) -> CompactEvent {
        CompactEvent {
            e: self.event_type.clone(),
            s: Some(self.source.clone()),
            i: self.id.clone(),
            t: self.time.timestamp_millis(),
            d: self.data.clone(),
            ctx: self.trace_context.clone(),
            tid: self.tenant_id.clone(),
            sub: self.subject.clone(),
            rid: self.request_id.clone(),
            dl: self.delivery,
        }
    }

    /// Reconstructs a full event from the compact form.
    ///
    /// When the compact event omitted `s`, the caller-supplied `source`
    /// override fills the gap; with neither present the source is empty.
    /// `datacontenttype` is restored to the JSON content type all emitted
    /// events carry.
    #[must_use]
    pub fn from_compact(compact: CompactEvent, source: Option<&str>) -> Self {
        let time = DateTime::from_timestamp_millis(compact.t).unwrap_or_default();
        Self {
            specversion: EVENT_SPEC_VERSION.to_string(),
            event_type: compact.e,
            source: compact
                .s
                .or_else(|| source.map(str::to_string))
                .unwrap_or_default(),
            id: compact.i,
            time,
            datacontenttype: Some(EVENT_CONTENT_TYPE.to_string()),
            data: compact.d,
            subject: compact.sub,
            tenant_id: compact.tid,
            request_id: compact.rid,
            trace_context: compact.ctx,
            delivery: compact.dl,
        }
    }
}

// ---------------------------------------------------------------------------
// CompactEvent
// ---------------------------------------------------------------------------

/// Short-key projection of [`ParsEvent`] for low-overhead transport.
///
/// Required keys: `e` (type), `i` (id), `t` (epoch millis), `d` (data).
/// `s` (source) may be omitted and supplied again at decode time. The
/// remaining optional keys exist so the round trip stays lossless for
/// events that carry subject, correlation, or delivery attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactEvent {
    pub e: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub s: Option<String>,
    pub i: String,
    pub t: i64,
    pub d: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ctx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dl: Option<DeliveryGuarantee>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
