//! Text normalization shared by the store and the resolver
//!
//! Both sides must normalize identically: the store indexes the normalized
//! length of each display value, and the resolver compares against it.

/// Lower-case and strip every non-alphanumeric character
///
/// Unicode letters and digits are kept, so "für" stays "für".
///
/// # Examples
///
/// ```
/// use gleaner_domain::text::normalize;
///
/// assert_eq!(normalize("Max-Planck-Institut für Biologie"), "maxplanckinstitutfürbiologie");
/// ```
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Length of the normalized text in characters
pub fn normalized_len(text: &str) -> usize {
    normalize(text).chars().count()
}

/// Lower-cased alphanumeric tokens of at least `min_len` characters
///
/// # Examples
///
/// ```
/// use gleaner_domain::text::tokens;
///
/// assert_eq!(tokens("Max Planck Institute for Biology", 4), vec!["planck", "institute", "biology"]);
/// ```
pub fn tokens(text: &str, min_len: usize) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= min_len)
        .map(str::to_lowercase)
        .collect()
}
