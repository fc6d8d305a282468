use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

/// Builds a case-insensitive matcher for the whitespace separated terms of a search query.
pub fn build_highlight_regex(query: &str) -> Option<Regex> {
    let mut unique = Vec::new();
    let mut seen = HashSet::new();
    for term in query.split_whitespace() {
        if seen.insert(term.to_lowercase()) {
            unique.push(term);
        }
    }
    if unique.is_empty() {
        return None;
    }
    unique.sort_by(|a, b| b.len().cmp(&a.len()));
    let pattern = unique
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Splits `text` into runs, flagging the ones matched by `regex`.
pub fn split_matches<'a>(text: &'a str, regex: Option<&Regex>) -> Vec<(&'a str, bool)> {
    let Some(regex) = regex else {
        return vec![(text, false)];
    };
    let mut runs = Vec::new();
    let mut last = 0;
    for found in regex.find_iter(text) {
        if found.start() > last {
            runs.push((&text[last..found.start()], false));
        }
        runs.push((found.as_str(), true));
        last = found.end();
    }
    if last < text.len() {
        runs.push((&text[last..], false));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_longer_terms_first() {
        let regex = build_highlight_regex("log login").expect("regex");
        let matches: Vec<_> = regex.find_iter("Fix login").map(|m| m.as_str()).collect();
        assert_eq!(matches, vec!["login"]);
    }

    #[test]
    fn blank_query_builds_nothing() {
        assert!(build_highlight_regex("   ").is_none());
    }

    #[test]
    fn splits_title_around_matches() {
        let regex = build_highlight_regex("BUG").expect("regex");
        let runs = split_matches("#12 bug in Bugzilla", Some(&regex));
        assert_eq!(
            runs,
            vec![
                ("#12 ", false),
                ("bug", true),
                (" in ", false),
                ("Bug", true),
                ("zilla", false),
            ]
        );
    }

    #[test]
    fn escapes_regex_metacharacters() {
        let regex = build_highlight_regex("c++").expect("regex");
        assert!(regex.is_match("learn C++ today"));
    }
}
