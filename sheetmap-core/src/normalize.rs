//! Header normalization shared by every stage

use std::collections::HashSet;

/// Placeholder used for blank header cells
pub const UNNAMED: &str = "Unnamed";

/// Comparison key: all whitespace removed, lowercased.
///
/// `None` normalizes to the empty string.
pub fn normalize<S: AsRef<str>>(value: Option<S>) -> String {
    match value {
        Some(s) => normalize_str(s.as_ref()),
        None => String::new(),
    }
}

/// Same as [`normalize`] for a value known to be present
pub fn normalize_str(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Human-readable label: every character other than an ASCII letter, digit
/// or space becomes a space, whitespace runs collapse, ends are trimmed.
pub fn clean_label(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };

    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Make labels unique while keeping their order.
///
/// Blank labels become [`UNNAMED`] first, then every repeat of an already
/// seen label gets the next free `_1`, `_2`, ... suffix.
pub fn dedupe<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(labels.len());

    for label in labels {
        let trimmed = label.as_ref().trim();
        let base = if trimmed.is_empty() {
            UNNAMED.to_string()
        } else {
            trimmed.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        seen.insert(candidate.clone());
        out.push(candidate);
    }

    out
}
