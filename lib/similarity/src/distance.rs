//! Per-feature comparison functions
//!
//! Ratios are in [0.0, 1.0] where 1.0 means identical.

/// Fuzzy ratio for long free-text features.
///
/// Sørensen–Dice coefficient over character bigrams, whitespace ignored.
/// Symmetric in its arguments.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b)
}

/// Categorical and hash features must be byte-identical
#[inline]
pub fn exact_match(a: &str, b: &str) -> bool {
    a == b
}

/// True when the two address lists share at least one entry
pub fn lists_overlap<'a>(
    a: impl IntoIterator<Item = &'a str>,
    b: impl IntoIterator<Item = &'a str> + Clone,
) -> bool {
    a.into_iter()
        .any(|x| b.clone().into_iter().any(|y| x == y))
}
