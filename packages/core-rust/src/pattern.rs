//! Event-type pattern matching.
//!
//! Patterns are dot-segmented. A literal segment matches itself, `*` matches
//! exactly one segment, and `**` matches any number of remaining segments.
//! A non-final `**` consumes a prefix of the remaining segments until the
//! rest of the pattern matches the suffix.

/// Whether `event_type` matches `pattern`.
///
/// Matching is pure and deterministic: same inputs, same result.
#[must_use]
pub fn matches(event_type: &str, pattern: &str) -> bool {
    let type_segments: Vec<&str> = event_type.split('.').collect();
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    match_segments(&type_segments, &pattern_segments)
}

fn match_segments(types: &[&str], pattern: &[&str]) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return types.is_empty();
    };
    match *head {
        "**" => {
            if rest.is_empty() {
                // Final multi-wildcard greedily takes everything left.
                return true;
            }
            (0..=types.len()).any(|skip| match_segments(&types[skip..], rest))
        }
        "*" => types
            .split_first()
            .is_some_and(|(_, tail)| match_segments(tail, rest)),
        literal => types
            .split_first()
            .is_some_and(|(segment, tail)| *segment == literal && match_segments(tail, rest)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
