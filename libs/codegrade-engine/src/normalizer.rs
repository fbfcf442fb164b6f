//! Compiler diagnostic cleanup.
//!
//! Turns raw tool output into the line-oriented text carried by failing
//! verdicts. This is display formatting only and never decides a verdict.

/// Drop control characters (NUL, SUB and friends) except newlines and tabs.
pub fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// True when the stream carries anything besides control characters and
/// whitespace.
pub fn has_diagnostics(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    !strip_control(&text).trim().is_empty()
}

/// Normalize raw diagnostic bytes.
///
/// Every line keeps only what follows its first `:` (the file path or tool
/// name prefix), lines without one are kept as-is, order is preserved.
/// Stray invalid bytes (a compiler writing in a legacy locale) are replaced
/// and the rest is normalized; output that is mostly undecodable is
/// returned undecorated instead.
pub fn normalize(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if is_undecodable(&text) {
        tracing::debug!(bytes = raw.len(), "diagnostics are not text, kept raw");
        return text.into_owned();
    }
    strip_control(&text)
        .lines()
        .map(|line| match line.split_once(':') {
            Some((_, rest)) => rest,
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// More replacement characters than decoded ones
fn is_undecodable(text: &str) -> bool {
    let (replaced, decoded) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(replaced, decoded), c| {
            if c == char::REPLACEMENT_CHARACTER {
                (replaced + 1, decoded)
            } else {
                (replaced, decoded + 1)
            }
        });
    replaced > decoded
}
