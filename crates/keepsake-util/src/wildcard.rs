//! Wildcard pattern matching for resource paths.
//!
//! Used to scope settings and exclusions to groups of resources. Supports
//! `*` as a wildcard that matches any sequence of characters, including
//! path separators, so `/work/*.log` matches logs at any depth below `/work`.

/// Match a path string against a wildcard pattern.
///
/// # Examples
///
/// ```
/// use keepsake_util::wildcard::matches;
///
/// assert!(matches("*.rs", "/src/main.rs"));
/// assert!(matches("/work/*", "/work/a/b.txt"));
/// assert!(!matches("/work/*", "/home/a.txt"));
/// ```
pub fn matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` seen and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && pattern[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < pattern.len() && pattern[pi] == text[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

/// Calculate the specificity of a pattern.
///
/// More literal characters and fewer wildcards rank higher. Used to pick
/// the override that applies when several patterns match one resource.
pub fn specificity(pattern: &str) -> u32 {
    let literal_chars = pattern.chars().filter(|&c| c != '*').count() as u32;
    let wildcard_count = pattern.chars().filter(|&c| c == '*').count() as u32;

    let mut score = (literal_chars * 100).saturating_sub(wildcard_count * 10);
    if !pattern.starts_with('*') {
        score += 50;
    }
    if !pattern.ends_with('*') {
        score += 50;
    }
    score
}

/// Whether any pattern matches.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], text: &str) -> bool {
    patterns.iter().any(|p| matches(p.as_ref(), text))
}

/// All matching patterns, most specific first.
///
/// Patterns of equal specificity are ordered by their text.
pub fn matches_by_specificity<'a, S: AsRef<str>>(patterns: &'a [S], text: &str) -> Vec<&'a str> {
    let mut found: Vec<&str> = patterns
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| matches(p, text))
        .collect();
    found.sort_by(|a, b| specificity(b).cmp(&specificity(a)).then_with(|| a.cmp(b)));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("/a/b.txt", "/a/b.txt"));
        assert!(!matches("/a/b.txt", "/a/c.txt"));
    }

    #[test]
    fn test_extension_patterns() {
        assert!(matches("*.log", "/var/app/server.log"));
        assert!(matches("*.log", ".log"));
        assert!(!matches("*.log", "/var/app/server.log.1"));
    }

    #[test]
    fn test_folder_prefix_spans_separators() {
        assert!(matches("/work/*", "/work/x.txt"));
        assert!(matches("/work/*", "/work/deep/er/x.txt"));
        assert!(!matches("/work/*", "/workshop/x.txt"));
    }

    #[test]
    fn test_multiple_wildcards() {
        assert!(matches("*/target/*", "/repo/target/debug/build.rs"));
        assert!(matches("*node_modules*", "/p/node_modules/x/index.js"));
        assert!(!matches("*/target/*", "/repo/src/main.rs"));
        assert!(matches("a**b", "ab"));
    }

    #[test]
    fn test_empty_and_star() {
        assert!(matches("*", ""));
        assert!(matches("*", "/anything"));
        assert!(matches("", ""));
        assert!(!matches("", "/a"));
    }

    #[test]
    fn test_backtracking() {
        assert!(matches("*ab*ab", "xabyabab"));
        assert!(!matches("*ab*ab", "xabyaba"));
    }

    #[test]
    fn test_specificity_ordering() {
        assert!(specificity("/work/notes.md") > specificity("/work/*"));
        assert!(specificity("/work/*") > specificity("*"));
        assert!(specificity("*.md") > specificity("*.md*"));
    }

    #[test]
    fn test_matches_by_specificity() {
        let patterns = ["*", "/work/*", "/work/*.md"];
        assert_eq!(
            matches_by_specificity(&patterns, "/work/notes.md"),
            vec!["/work/*.md", "/work/*", "*"]
        );
        assert_eq!(
            matches_by_specificity(&patterns, "/work/main.rs"),
            vec!["/work/*", "*"]
        );
        assert_eq!(matches_by_specificity(&patterns, "/tmp/x"), vec!["*"]);
        assert!(matches_by_specificity(&["/work/*"], "/tmp/x").is_empty());
    }

    #[test]
    fn test_matches_any() {
        let excluded = vec!["*.lock".to_string(), "*/.git/*".to_string()];
        assert!(matches_any(&excluded, "/repo/Cargo.lock"));
        assert!(matches_any(&excluded, "/repo/.git/HEAD"));
        assert!(!matches_any(&excluded, "/repo/src/lib.rs"));
    }
}
