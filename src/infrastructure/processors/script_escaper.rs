use crate::core::interfaces::ScriptPass;
use crate::utils::{Logger, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{SourceType, Span};
use std::path::Path;

/// Lexical context of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalContext {
    /// String literals, template chunks and regular expressions
    Literal,
    Comment,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// `</script`, ASCII case-insensitive
    ScriptClose,
    /// `://`
    SchemeSlashes,
}

impl Pattern {
    /// Bytes of the match the rewrite touches: the script-close rule only
    /// edits between `<` and `/`
    fn edited_len(self) -> usize {
        match self {
            Pattern::ScriptClose => 2,
            Pattern::SchemeSlashes => 3,
        }
    }
}

/// What a match becomes in each context; `None` leaves it as is
struct Rule {
    pattern: Pattern,
    literal: Option<&'static str>,
    comment: Option<&'static str>,
    code: Option<&'static str>,
}

/// Replacements keep the matched text's case; they describe only what goes
/// between `<` and `/script`, or what replaces `://`.
const RULES: &[Rule] = &[
    Rule {
        pattern: Pattern::ScriptClose,
        literal: Some("\\"),
        comment: Some("\\"),
        code: Some(" "),
    },
    Rule {
        pattern: Pattern::SchemeSlashes,
        literal: Some(":\\u002F\\u002F"),
        comment: None,
        code: None,
    },
];

const SCRIPT_CLOSE_LEN: usize = "</script".len();

#[derive(Default)]
struct LiteralRanges {
    spans: Vec<Span>,
}

impl<'a> Visit<'a> for LiteralRanges {
    fn visit_string_literal(&mut self, lit: &StringLiteral<'a>) {
        self.spans.push(lit.span);
    }

    fn visit_template_element(&mut self, element: &TemplateElement<'a>) {
        self.spans.push(element.span);
    }

    fn visit_reg_exp_literal(&mut self, lit: &RegExpLiteral<'a>) {
        self.spans.push(lit.span);
    }
}

/// Neutralizes the two sequences the host's HTML template layer corrupts:
/// `</script` and `://`. Rewrites are chosen per lexical context of each
/// match and never create a new match, so the pass is idempotent.
pub struct ScriptEscaper;

impl ScriptEscaper {
    pub fn new() -> Self {
        Self
    }

    pub fn escape(&self, code: &str, origin: &Path) -> String {
        let matches = find_matches(code);
        if matches.is_empty() {
            return code.to_string();
        }

        let contexts = match classify(code) {
            Some(contexts) => contexts,
            None => {
                Logger::warn(&format!(
                    "{} does not parse; escaping only script-close sequences",
                    origin.display()
                ));
                return rewrite(code, &matches, |_, _| LexicalContext::Comment);
            }
        };

        rewrite(code, &matches, |offset, pattern| contexts.context_of(offset, pattern.edited_len()))
    }
}

impl Default for ScriptEscaper {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptPass for ScriptEscaper {
    fn name(&self) -> &'static str {
        "escape"
    }

    fn apply(&self, code: &str, origin: &Path) -> Result<String> {
        Ok(self.escape(code, origin))
    }
}

/// Sorted, non-overlapping ranges of literal and comment text
struct ContextMap {
    ranges: Vec<(u32, u32, LexicalContext)>,
}

impl ContextMap {
    fn range_at(&self, offset: usize) -> Option<(u32, u32, LexicalContext)> {
        let offset = offset as u32;
        let idx = self.ranges.partition_point(|(_, end, _)| *end <= offset);
        self.ranges.get(idx).copied().filter(|(start, _, _)| *start <= offset)
    }

    /// Context of `offset..offset + len`. A match that crosses the edge of a
    /// literal or comment sits on a token boundary and is treated as code.
    fn context_of(&self, offset: usize, len: usize) -> LexicalContext {
        let first = self.range_at(offset);
        if first != self.range_at(offset + len - 1) {
            return LexicalContext::Code;
        }
        first.map_or(LexicalContext::Code, |(_, _, context)| context)
    }
}

fn classify(code: &str) -> Option<ContextMap> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::cjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return None;
    }

    let mut literals = LiteralRanges::default();
    literals.visit_program(&ret.program);

    let mut ranges: Vec<(u32, u32, LexicalContext)> = literals
        .spans
        .into_iter()
        .map(|s| (s.start, s.end, LexicalContext::Literal))
        .chain(
            ret.program
                .comments
                .iter()
                .map(|c| (c.span.start, c.span.end, LexicalContext::Comment)),
        )
        .collect();
    ranges.sort_by_key(|(start, end, _)| (*start, *end));
    ranges.dedup_by_key(|(start, _, _)| *start);

    Some(ContextMap { ranges })
}

fn find_matches(code: &str) -> Vec<(usize, Pattern)> {
    let bytes = code.as_bytes();
    let mut matches = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<'
            && bytes.get(i + 1) == Some(&b'/')
            && bytes
                .get(i + 2..i + SCRIPT_CLOSE_LEN)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(b"script"))
        {
            matches.push((i, Pattern::ScriptClose));
            i += SCRIPT_CLOSE_LEN;
        } else if bytes[i..].starts_with(b"://") {
            matches.push((i, Pattern::SchemeSlashes));
            i += 3;
        } else {
            i += 1;
        }
    }

    matches
}

fn rewrite(code: &str, matches: &[(usize, Pattern)], context_of: impl Fn(usize, Pattern) -> LexicalContext) -> String {
    let mut out = String::with_capacity(code.len() + matches.len() * 12);
    let mut cursor = 0;

    for &(offset, pattern) in matches {
        let Some(rule) = RULES.iter().find(|r| r.pattern == pattern) else {
            continue;
        };
        let replacement = match context_of(offset, pattern) {
            LexicalContext::Literal => rule.literal,
            LexicalContext::Comment => rule.comment,
            LexicalContext::Code => rule.code,
        };
        let Some(replacement) = replacement else {
            continue;
        };

        match pattern {
            Pattern::ScriptClose => {
                // `<` + separator + `/script` in its original case
                out.push_str(&code[cursor..=offset]);
                out.push_str(replacement);
                cursor = offset + 1;
            }
            Pattern::SchemeSlashes => {
                out.push_str(&code[cursor..offset]);
                out.push_str(replacement);
                cursor = offset + 3;
            }
        }
    }

    out.push_str(&code[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(code: &str) -> String {
        ScriptEscaper::new().escape(code, Path::new("bundle.js"))
    }

    #[test]
    fn test_script_close_in_string() {
        let out = escape("el.innerHTML = '<script>a()</script>';");
        assert_eq!(out, "el.innerHTML = '<script>a()<\\/script>';");
        assert!(!out.contains("</script"));
    }

    #[test]
    fn test_script_close_is_case_insensitive_and_keeps_case() {
        assert_eq!(escape("var s = \"</SCRIPT>\";"), "var s = \"<\\/SCRIPT>\";");
        assert_eq!(escape("var s = \"</Script \";"), "var s = \"<\\/Script \";");
    }

    #[test]
    fn test_scheme_slashes_only_in_literals() {
        let code = "// see https://example.com\nvar u = \"https://example.com\"; var r = /https:\\/\\//;";
        let out = escape(code);
        assert_eq!(
            out,
            "// see https://example.com\nvar u = \"https:\\u002F\\u002Fexample.com\"; var r = /https:\\/\\//;"
        );
    }

    #[test]
    fn test_template_chunks_are_literals() {
        let out = escape("var u = `http://${host}/`;");
        assert_eq!(out, "var u = `http:\\u002F\\u002F${host}/`;");
    }

    #[test]
    fn test_comment_and_code_contexts() {
        let out = escape("/* </script> */ var ok = a </script/i.test(b);");
        assert_eq!(out, "/* <\\/script> */ var ok = a < /script/i.test(b);");
    }

    #[test]
    fn test_object_key_with_colon_then_comment_is_code() {
        let code = "var o = { a://note\n1 };";
        assert_eq!(escape(code), code);
    }

    #[test]
    fn test_match_crossing_a_regex_end_is_left_alone() {
        // `/a:/` ends inside the match and `//c` is a comment
        let code = "var r = /a:///c\n;";
        assert_eq!(escape(code), code);
    }

    #[test]
    fn test_unparseable_text_only_neutralizes_script_close() {
        let out = escape("var s = '</script>' +;\nvar u = 'https://x';");
        assert_eq!(out, "var s = '<\\/script>' +;\nvar u = 'https://x';");
    }

    #[test]
    fn test_escape_is_idempotent() {
        let inputs = [
            "var a = '</script>https://x'; // </script>",
            "x = a </script/.source; y = `ftp://${h}`;",
            "nothing to do here",
        ];
        for input in inputs {
            let once = escape(input);
            assert_eq!(escape(&once), once);
            assert!(!once.to_ascii_lowercase().contains("</script"));
        }
    }

    #[test]
    fn test_escaped_string_keeps_runtime_value() {
        // The rewrites are exactly the JS escapes for '/' so the value is unchanged
        let out = escape("var u = 'a://b</script>';");
        assert_eq!(out, "var u = 'a:\\u002F\\u002Fb<\\/script>';");
    }
}
