//! W3C trace-context identifiers and header formatting.
//!
//! The propagation format is `traceparent: 00-<32 hex>-<16 hex>-<2 hex>`.
//! Parsing is strict (lowercase hex, non-zero ids, version `00`) but
//! forgiving in effect: a malformed header yields `None` -- "no incoming
//! context" -- never an error.

use serde::{Deserialize, Serialize};

/// Identifiers linking a unit of work to its causal chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// 16-byte trace id shared by every span in the trace.
    pub trace_id: [u8; 16],
    /// 8-byte id of the current span.
    pub span_id: [u8; 8],
    /// W3C trace flags; bit 0 is the sampled flag.
    pub trace_flags: u8,
    /// Vendor-specific `tracestate` header value, propagated opaquely.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_state: Option<String>,
}

impl TraceContext {
    /// Sampled bit of `trace_flags`.
    pub const FLAG_SAMPLED: u8 = 0x01;

    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.trace_flags & Self::FLAG_SAMPLED != 0
    }

    /// Formats the `traceparent` header value.
    #[must_use]
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            hex_encode(&self.trace_id),
            hex_encode(&self.span_id),
            self.trace_flags
        )
    }

    /// Parses a `traceparent` header value.
    ///
    /// Returns `None` for anything malformed: wrong field count or width,
    /// non-lowercase-hex characters, an unknown version, or all-zero ids.
    #[must_use]
    pub fn parse_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id_hex = parts.next()?;
        let span_id_hex = parts.next()?;
        let flags_hex = parts.next()?;
        if parts.next().is_some() || version != "00" {
            return None;
        }
        let trace_id: [u8; 16] = hex_decode(trace_id_hex)?;
        let span_id: [u8; 8] = hex_decode(span_id_hex)?;
        let [trace_flags]: [u8; 1] = hex_decode(flags_hex)?;
        if trace_id == [0u8; 16] || span_id == [0u8; 8] {
            return None;
        }
        Some(Self { trace_id, span_id, trace_flags, trace_state: None })
    }

    /// Parses `traceparent` and attaches the accompanying `tracestate`.
    #[must_use]
    pub fn parse_headers(traceparent: &str, tracestate: Option<&str>) -> Option<Self> {
        let mut ctx = Self::parse_traceparent(traceparent)?;
        ctx.trace_state = tracestate.map(str::to_string);
        Some(ctx)
    }

    /// Lowercase hex of the trace id.
    #[must_use]
    pub fn trace_id_hex(&self) -> String {
        hex_encode(&self.trace_id)
    }

    /// Lowercase hex of the span id.
    #[must_use]
    pub fn span_id_hex(&self) -> String {
        hex_encode(&self.span_id)
    }
}

/// Fixed-width lowercase hex encoding.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Decodes exactly `N` bytes of lowercase hex; uppercase is rejected per the
/// header spec.
fn hex_decode<const N: usize>(hex: &str) -> Option<[u8; N]> {
    if hex.len() != N * 2 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    let mut out = [0u8; N];
    for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
        let hi = hex_val(chunk[0]);
        let lo = hex_val(chunk[1]);
        out[i] = (hi << 4) | lo;
    }
    Some(out)
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        _ => b - b'a' + 10,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
