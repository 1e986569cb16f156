/// Helpers shared by the bundler and the script passes: span-based source
/// editing, JavaScript string quoting and parse diagnostics.
use oxc_allocator::Allocator;
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::path::Path;

/// Comment line the bundler writes in front of the host entry's code. Only
/// the text after it carries module syntax.
pub const HOST_ENTRY_MARKER: &str = "//# hostpack-entry ";

/// A parse failure reduced to owned data
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub message: String,
    pub offset: Option<u32>,
}

impl ParseFailure {
    pub fn from_diagnostics(errors: &[OxcDiagnostic]) -> Self {
        let message = errors
            .iter()
            .take(3)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let offset = errors
            .first()
            .and_then(|e| e.labels.as_ref())
            .and_then(|labels| labels.first())
            .map(|label| label.offset() as u32);

        Self { message, offset }
    }
}

/// Parse `code` and report the first errors, if any
pub fn check_syntax(code: &str, source_type: SourceType) -> std::result::Result<(), ParseFailure> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let mut failure = ParseFailure::from_diagnostics(&ret.errors);
        if failure.message.is_empty() {
            failure.message = "parser gave up".to_string();
        }
        return Err(failure);
    }

    Ok(())
}

/// Check if a module path is from node_modules
pub fn is_node_modules_path(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "node_modules")
}

/// Render `value` as a double-quoted JavaScript string literal
pub fn quote_js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a cooked string value from the parser. When `lone_surrogates` is
/// set, each lone surrogate arrives as U+FFFD followed by four hex digits
/// (`fffd` for a real U+FFFD) and is written back as a `\uXXXX` escape.
pub fn quote_cooked_js_string(value: &str, lone_surrogates: bool) -> String {
    if !lone_surrogates {
        return quote_js_string(value);
    }

    let mut out = String::from("\"");
    let mut rest = value;
    while let Some(at) = rest.find('\u{FFFD}') {
        let plain = quote_js_string(&rest[..at]);
        out.push_str(&plain[1..plain.len() - 1]);

        let after = &rest[at + '\u{FFFD}'.len_utf8()..];
        let unit = after.get(..4).unwrap_or_default();
        if unit.eq_ignore_ascii_case("fffd") {
            out.push('\u{FFFD}');
        } else {
            out.push_str("\\u");
            out.push_str(unit);
        }
        rest = after.get(4..).unwrap_or_default();
    }
    let tail = quote_js_string(rest);
    out.push_str(&tail[1..]);
    out
}

/// Whether `name` can be written as a bare identifier
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

/// `object.name`, or `object["name"]` when `name` is not an identifier
pub fn member_access(object: &str, name: &str) -> String {
    if is_identifier_name(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, quote_js_string(name))
    }
}

#[derive(Debug)]
struct Edit {
    start: u32,
    end: u32,
    text: String,
}

/// Collects non-overlapping replacements against a source text and applies
/// them in one pass. Insertions at the same offset keep their call order.
pub struct SourceEditor<'s> {
    source: &'s str,
    edits: Vec<Edit>,
}

impl<'s> SourceEditor<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    pub fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn remove(&mut self, start: u32, end: u32) {
        self.replace(start, end, String::new());
    }

    pub fn insert(&mut self, at: u32, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply every edit. Fails if two edits overlap or an edit is out of bounds.
    pub fn finish(mut self) -> std::result::Result<String, String> {
        // Stable: equal keys keep insertion order
        self.edits.sort_by_key(|e| (e.start, e.end));

        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0usize;

        for edit in &self.edits {
            let (start, end) = (edit.start as usize, edit.end as usize);
            if start < cursor || end < start || end > self.source.len() {
                return Err(format!(
                    "conflicting source edit at {}..{} (cursor {})",
                    start, end, cursor
                ));
            }
            let (Some(kept), true) = (self.source.get(cursor..start), self.source.is_char_boundary(end)) else {
                return Err(format!("source edit at {}..{} splits a character", start, end));
            };
            out.push_str(kept);
            out.push_str(&edit.text);
            cursor = end;
        }

        out.push_str(&self.source[cursor..]);
        Ok(out)
    }
}
