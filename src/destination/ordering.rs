//! Ordering of dynamically discovered children.

use std::collections::HashSet;

/// Sort `items` lexically by `sort_key` and move the first item matching
/// `is_default` to the front. The sort is stable, so equal keys keep their
/// discovery order.
pub fn sort_with_default<T>(
    mut items: Vec<T>,
    sort_key: impl Fn(&T) -> &str,
    is_default: impl Fn(&T) -> bool,
) -> Vec<T> {
    items.sort_by(|a, b| sort_key(a).cmp(sort_key(b)));
    if let Some(index) = items.iter().position(is_default) {
        let default = items.remove(index);
        items.insert(0, default);
    }
    items
}

/// Lexical order with `default` hoisted to the front when present.
pub fn order_names(names: Vec<String>, default: Option<&str>) -> Vec<String> {
    sort_with_default(names, String::as_str, |name| Some(name.as_str()) == default)
}

/// Drop later items whose key was already seen.
pub fn dedup_by_key<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(key(&item).to_string()) {
            unique.push(item);
        } else {
            log::warn!("Ignoring duplicate destination '{}'", key(&item));
        }
    }
    unique
}
