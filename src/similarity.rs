//! "Did you mean" suggestions for unknown item names.

/// Minimum similarity for a candidate to be suggested.
pub const SUGGESTION_THRESHOLD: f64 = 0.4;

/// Default cap on the number of suggestions.
pub const MAX_SUGGESTIONS: usize = 5;

/// Edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Case-insensitive similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Candidates that start with, or contain, `target` (case-insensitive).
/// Prefix matches come first.
pub fn find_by_prefix_or_substring(target: &str, candidates: &[String]) -> Vec<String> {
    let target = target.to_lowercase();
    if target.is_empty() {
        return Vec::new();
    }

    let (mut prefix, substring): (Vec<&String>, Vec<&String>) = candidates
        .iter()
        .filter(|c| c.to_lowercase().contains(&target))
        .partition(|c| c.to_lowercase().starts_with(&target));

    prefix.extend(substring);
    prefix.into_iter().cloned().collect()
}

/// Candidates whose similarity to `target` is at least `threshold`, best first.
pub fn find_by_similarity(
    target: &str,
    candidates: &[String],
    threshold: f64,
    max_results: usize,
) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .map(|c| (similarity(target, c), c))
        .filter(|(score, _)| *score >= threshold)
        .collect();

    // Stable sort keeps input order for equal scores.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(max_results)
        .map(|(_, c)| c.clone())
        .collect()
}

/// Ranked, deduplicated suggestions for `target`.
pub fn suggest(target: &str, candidates: &[String], max_suggestions: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    let ranked = find_by_prefix_or_substring(target, candidates)
        .into_iter()
        .chain(find_by_similarity(
            target,
            candidates,
            SUGGESTION_THRESHOLD,
            max_suggestions,
        ));

    for name in ranked {
        if out.len() >= max_suggestions {
            break;
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "ab"), 2);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("buton", "button"), 1);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("Button", "button"), 1.0);
        assert!((similarity("buton", "button") - (1.0 - 1.0 / 6.0)).abs() < 1e-9);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_find_by_prefix_or_substring() {
        let candidates = names(&["data-table", "table", "button", "tablet"]);
        let found = find_by_prefix_or_substring("table", &candidates);
        assert_eq!(found, names(&["table", "tablet", "data-table"]));
    }

    #[test]
    fn test_find_by_similarity_orders_and_caps() {
        let candidates = names(&["card", "button", "buttons", "badge"]);
        let found = find_by_similarity("buton", &candidates, 0.4, 1);
        assert_eq!(found, names(&["button"]));
    }

    #[test]
    fn test_suggest_typo() {
        let result = suggest("buton", &names(&["button", "card"]), MAX_SUGGESTIONS);
        assert!(result.contains(&"button".to_string()));
        assert!(!result.contains(&"card".to_string()));
    }

    #[test]
    fn test_suggest_dedups_and_caps() {
        let candidates = names(&["dialog", "dialog-form", "alert-dialog", "dial"]);
        let result = suggest("dialog", &candidates, 2);
        assert_eq!(result, names(&["dialog", "dialog-form"]));
    }

    #[test]
    fn test_suggest_nothing_close() {
        let result = suggest("zzzzzz", &names(&["button", "card"]), MAX_SUGGESTIONS);
        assert!(result.is_empty());
    }
}
