//! Label canonicalisation.

/// Maps raw label cells onto `{0, 1}`.
///
/// A cell becomes `1` only when it parses to exactly `1`; `-1`, `0`, any other
/// number and any non-numeric token all collapse to `0`.
#[must_use]
pub fn normalize_labels<S: AsRef<str>>(raw: &[S]) -> Vec<u8> {
    raw.iter().map(|label| normalize_label(label.as_ref())).collect()
}

/// Canonical value of a single raw label cell.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn normalize_label(raw: &str) -> u8 {
    u8::from(raw.trim().parse::<f64>().map_or(false, |value| value == 1.0))
}

/// Number of positive (phishing) labels.
#[must_use]
pub fn count_positive(labels: &[u8]) -> usize {
    labels.iter().filter(|label| **label == 1).count()
}
