//! Most-specific-wins lookup over dotted namespaces.

use crate::matcher::PATH_DELIMITER;

/// Walks `base`, `base.a`, `base.a.b`, ... for the path `a.b...`.
///
/// Each key found overrides the value found for its ancestors; a missing key
/// keeps the previous one. Returns `default` when no key on the walk exists.
pub fn resolve_most_specific<T, F>(base: &str, path: &str, default: T, mut lookup: F) -> T
where
    F: FnMut(&str) -> Option<T>,
{
    let mut closest = lookup(base).unwrap_or(default);
    let mut search_key = base.to_string();

    for segment in path.split(PATH_DELIMITER).filter(|s| !s.is_empty()) {
        search_key.push(PATH_DELIMITER);
        search_key.push_str(segment);
        if let Some(found) = lookup(&search_key) {
            closest = found;
        }
    }

    closest
}
