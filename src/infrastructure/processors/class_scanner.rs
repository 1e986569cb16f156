use rayon::prelude::*;
use std::collections::BTreeSet;

/// File extensions searched for class candidates
pub const CANDIDATE_EXTENSIONS: &[&str] = &["html", "js", "jsx", "ts", "tsx", "vue", "svelte"];

/// Extracts class-name candidates from UI source text. Over-collects on
/// purpose: any run of class characters counts, so `"text-2xl"` inside a
/// string, an attribute or a template all qualify.
pub struct ClassScanner;

impl ClassScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, sources: &[String]) -> BTreeSet<String> {
        sources
            .par_iter()
            .map(|source| Self::tokens(source))
            .reduce(BTreeSet::new, |mut acc, set| {
                acc.extend(set);
                acc
            })
    }

    pub fn tokens(source: &str) -> BTreeSet<String> {
        source
            .split(|c: char| !is_class_char(c))
            .map(|raw| raw.trim_end_matches(['.', ':', '/']))
            .filter(|token| is_candidate(token))
            .map(str::to_string)
            .collect()
    }
}

impl Default for ClassScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_class_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '/' | '.')
}

fn is_candidate(token: &str) -> bool {
    !token.is_empty()
        && !token.starts_with("//")
        && token.bytes().any(|b| b.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_from_markup_and_code() {
        let tokens = ClassScanner::tokens(
            r#"<h1 class="text-2xl md:hover:bg-blue-500">Hi</h1> el.className = 'w-1/2 p-0.5';"#,
        );
        assert!(tokens.contains("text-2xl"));
        assert!(tokens.contains("md:hover:bg-blue-500"));
        assert!(tokens.contains("w-1/2"));
        assert!(tokens.contains("p-0.5"));
        assert!(tokens.contains("className"));
    }

    #[test]
    fn test_trailing_separators_are_trimmed() {
        let tokens = ClassScanner::tokens("Done. label: flex/");
        assert!(tokens.contains("Done"));
        assert!(tokens.contains("label"));
        assert!(tokens.contains("flex"));
        assert!(!tokens.contains("Done."));
    }

    #[test]
    fn test_numbers_alone_are_not_candidates() {
        let tokens = ClassScanner::tokens("x = 12 + 3.5;");
        assert!(!tokens.contains("12"));
        assert!(!tokens.contains("3.5"));
        assert!(tokens.contains("x"));
    }

    #[test]
    fn test_scan_merges_files() {
        let scanner = ClassScanner::new();
        let found = scanner.scan(&[
            "<div class=\"flex\"></div>".to_string(),
            "const c = `mt-4 ${x}`;".to_string(),
        ]);
        assert!(found.contains("flex"));
        assert!(found.contains("mt-4"));
        assert!(!found.contains("text-2xl"));
    }
}
