// SPDX-License-Identifier: Apache-2.0

/// Trim entries, drop empties, and deduplicate exactly, preserving the
/// first occurrence's position.
#[must_use]
pub fn normalize_list(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || !seen.insert(item.to_string()) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

/// Case-insensitive dedup preserving first-seen order and original casing.
#[must_use]
pub fn dedupe_fold(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || !seen.insert(item.to_lowercase()) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{dedupe_fold, normalize_list};

    #[test]
    fn normalize_list_trims_and_dedupes() {
        let input = vec![
            " a ".to_string(),
            String::new(),
            "b".to_string(),
            "a".to_string(),
        ];
        assert_eq!(normalize_list(&input), vec!["a", "b"]);
    }

    #[test]
    fn dedupe_fold_keeps_first_casing() {
        let input = vec!["Alpha".to_string(), "alpha".to_string(), "beta".to_string()];
        assert_eq!(dedupe_fold(&input), vec!["Alpha", "beta"]);
    }
}
