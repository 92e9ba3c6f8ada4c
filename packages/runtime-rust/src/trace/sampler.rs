//! Sampling policy for new traces.
//!
//! Sampling is decided once, at the root of a trace; children of a sampled
//! parent are always recorded so traces stay complete.

/// Policy deciding which root spans are recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampler {
    /// Record every trace.
    Always,
    /// Record nothing.
    Never,
    /// Record approximately this fraction of traces, in `[0.0, 1.0]`.
    Ratio(f64),
}

impl Sampler {
    /// Whether a new root trace should be recorded.
    ///
    /// Ratio sampling is deterministic per trace id when one is supplied:
    /// the id's leading 8 bytes are mapped to `[0, 1)` and compared against
    /// the ratio, so every participant makes the same decision for the same
    /// trace. Without an id the decision is randomized.
    #[must_use]
    pub fn should_sample(&self, trace_id: Option<&[u8; 16]>) -> bool {
        match *self {
            Sampler::Always => true,
            Sampler::Never => false,
            Sampler::Ratio(ratio) => {
                if ratio >= 1.0 {
                    return true;
                }
                if ratio <= 0.0 {
                    return false;
                }
                let fraction = match trace_id {
                    Some(id) => {
                        let mut prefix = [0u8; 8];
                        prefix.copy_from_slice(&id[..8]);
                        #[allow(clippy::cast_precision_loss)]
                        let scaled = u64::from_be_bytes(prefix) as f64 / u64::MAX as f64;
                        scaled
                    }
                    None => rand::random::<f64>(),
                };
                fraction < ratio
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
