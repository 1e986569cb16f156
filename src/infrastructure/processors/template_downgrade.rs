use super::common::{check_syntax, quote_cooked_js_string, quote_js_string, ParseFailure};
use crate::core::interfaces::ScriptPass;
use crate::utils::{HostpackError, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

const PASS: &str = "syntax-downgrade";

struct Chunk {
    cooked: Option<String>,
    raw: String,
    /// `cooked` carries lone surrogates in the parser's escaped form
    lone_surrogates: bool,
}

impl Chunk {
    fn quoted_cooked(&self) -> Option<String> {
        self.cooked
            .as_deref()
            .map(|cooked| quote_cooked_js_string(cooked, self.lone_surrogates))
    }
}

struct Substitution {
    span: Span,
    /// Sequence expressions would split the surrounding argument list
    needs_parens: bool,
}

struct Site {
    span: Span,
    tag: Option<Span>,
    chunks: Vec<Chunk>,
    substitutions: Vec<Substitution>,
    /// A bare string at statement start would read as a directive
    statement_start: bool,
    /// Tagged template used as the callee of `new`
    new_callee: bool,
}

#[derive(Default)]
struct SiteCollector {
    sites: Vec<Site>,
    statement_templates: HashSet<u32>,
    new_callees: HashSet<u32>,
}

impl SiteCollector {
    fn push(&mut self, span: Span, tag: Option<Span>, literal: &TemplateLiteral<'_>) {
        let chunks = literal
            .quasis
            .iter()
            .map(|q| Chunk {
                cooked: q.value.cooked.as_ref().map(|c| c.to_string()),
                raw: q.value.raw.to_string(),
                lone_surrogates: q.lone_surrogates,
            })
            .collect();

        let substitutions = literal
            .expressions
            .iter()
            .map(|e| Substitution {
                span: e.span(),
                needs_parens: matches!(e, Expression::SequenceExpression(_)),
            })
            .collect();

        self.sites.push(Site {
            span,
            tag,
            chunks,
            substitutions,
            statement_start: tag.is_none() && self.statement_templates.contains(&span.start),
            new_callee: tag.is_some() && self.new_callees.contains(&span.start),
        });
    }
}

impl<'a> Visit<'a> for SiteCollector {
    fn visit_expression_statement(&mut self, stmt: &ExpressionStatement<'a>) {
        if let Expression::TemplateLiteral(tpl) = &stmt.expression {
            self.statement_templates.insert(tpl.span.start);
        }
        walk::walk_expression_statement(self, stmt);
    }

    fn visit_new_expression(&mut self, expr: &NewExpression<'a>) {
        if let Expression::TaggedTemplateExpression(tagged) = &expr.callee {
            self.new_callees.insert(tagged.span.start);
        }
        walk::walk_new_expression(self, expr);
    }

    fn visit_template_literal(&mut self, literal: &TemplateLiteral<'a>) {
        self.push(literal.span, None, literal);
        walk::walk_template_literal(self, literal);
    }

    fn visit_tagged_template_expression(&mut self, expr: &TaggedTemplateExpression<'a>) {
        self.push(expr.span, Some(expr.tag.span()), &expr.quasi);
        // The quasi is rendered as part of this site; only descend into its parts
        self.visit_expression(&expr.tag);
        for e in &expr.quasi.expressions {
            self.visit_expression(e);
        }
    }
}

/// Rewrites template literals into plain string concatenation.
///
/// `` `a${x}b` `` becomes `"a".concat(x, "b")`: `String.prototype.concat`
/// converts each value with ToString in the same order a template does.
/// Tagged templates call the tag with a cached, frozen strings array that
/// carries a frozen `raw` property, so each call site keeps one identity.
pub struct TemplateDowngradePass;

impl TemplateDowngradePass {
    pub fn new() -> Self {
        Self
    }

    pub fn downgrade(&self, code: &str, origin: &Path) -> Result<String> {
        if !code.contains('`') {
            return Ok(code.to_string());
        }

        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::cjs()).parse();
        if ret.panicked || !ret.errors.is_empty() {
            return Err(Self::parse_error(code, origin, ParseFailure::from_diagnostics(&ret.errors)));
        }

        let mut collector = SiteCollector::default();
        collector.visit_program(&ret.program);
        if collector.sites.is_empty() {
            return Ok(code.to_string());
        }

        let mut sites = collector.sites;
        sites.sort_by(|a, b| a.span.start.cmp(&b.span.start).then(b.span.end.cmp(&a.span.end)));

        let prologue_end = ret
            .program
            .directives
            .iter()
            .map(|d| d.span.end)
            .chain(ret.program.hashbang.as_ref().map(|h| h.span.end))
            .max()
            .unwrap_or(0);

        let mut renderer = Renderer {
            code,
            sites: &sites,
            next: 0,
            cache_vars: Vec::new(),
        };
        let body = renderer.render_range(prologue_end, code.len() as u32);

        let mut output = String::with_capacity(body.len() + 64);
        output.push_str(&code[..prologue_end as usize]);
        if !renderer.cache_vars.is_empty() {
            if prologue_end > 0 {
                output.push('\n');
            }
            let _ = writeln!(output, "var {};", renderer.cache_vars.join(", "));
        }
        output.push_str(&body);

        check_syntax(&output, SourceType::cjs()).map_err(|failure| {
            HostpackError::transform(
                PASS,
                origin,
                format!("downgraded output does not parse: {}", failure.message),
            )
        })?;

        Ok(output)
    }

    fn parse_error(code: &str, origin: &Path, failure: ParseFailure) -> HostpackError {
        let message = format!("cannot parse bundle: {}", failure.message);
        match failure.offset {
            Some(offset) => HostpackError::transform_at(PASS, origin, code, offset, message),
            None => HostpackError::transform(PASS, origin, message),
        }
    }
}

impl Default for TemplateDowngradePass {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptPass for TemplateDowngradePass {
    fn name(&self) -> &'static str {
        PASS
    }

    fn apply(&self, code: &str, origin: &Path) -> Result<String> {
        self.downgrade(code, origin)
    }
}

struct Renderer<'c> {
    code: &'c str,
    sites: &'c [Site],
    next: usize,
    cache_vars: Vec<String>,
}

impl Renderer<'_> {
    /// Copy `start..end`, replacing every template site inside it. Sites are
    /// ordered by start, outermost first, so nested sites are consumed by
    /// their parent's substitutions before the cursor moves past them.
    fn render_range(&mut self, start: u32, end: u32) -> String {
        let sites = self.sites;
        let mut out = String::new();
        let mut pos = start;

        while let Some(site) = sites.get(self.next) {
            if site.span.start >= end {
                break;
            }
            self.next += 1;
            if site.span.start < pos || site.span.end > end {
                continue;
            }
            out.push_str(&self.code[pos as usize..site.span.start as usize]);
            let rendered = self.render_site(site);
            out.push_str(&rendered);
            pos = site.span.end;
        }

        out.push_str(&self.code[pos as usize..end as usize]);
        out
    }

    fn render_site(&mut self, site: &Site) -> String {
        // The tag precedes the substitutions in source order
        let tag_text = site.tag.map(|tag| self.render_range(tag.start, tag.end));

        let values: Vec<String> = site
            .substitutions
            .iter()
            .map(|sub| {
                let text = self.render_range(sub.span.start, sub.span.end);
                if sub.needs_parens {
                    format!("({})", text)
                } else {
                    text
                }
            })
            .collect();

        match tag_text {
            None => Self::render_concat(site, &values),
            Some(tag) => self.render_tagged(site, &tag, &values),
        }
    }

    fn render_concat(site: &Site, values: &[String]) -> String {
        let cooked = |i: usize| site.chunks[i].quoted_cooked().unwrap_or_else(|| "\"\"".to_string());

        if values.is_empty() {
            let literal = cooked(0);
            return if site.statement_start {
                format!("({})", literal)
            } else {
                literal
            };
        }

        let mut out = cooked(0);
        for (i, value) in values.iter().enumerate() {
            let _ = write!(out, ".concat({}, {})", value, cooked(i + 1));
        }
        out
    }

    fn render_tagged(&mut self, site: &Site, tag: &str, values: &[String]) -> String {
        let cooked: Vec<String> = site
            .chunks
            .iter()
            .map(|c| c.quoted_cooked().unwrap_or_else(|| "void 0".to_string()))
            .collect();
        let raw: Vec<String> = site
            .chunks
            .iter()
            .map(|c| quote_js_string(&c.raw.replace("\r\n", "\n").replace('\r', "\n")))
            .collect();

        let cache = format!("__hostpack_tpl{}", self.cache_vars.len());
        self.cache_vars.push(cache.clone());

        let strings = format!(
            "{cache} || ({cache} = Object.freeze(Object.defineProperty([{}], \"raw\", {{ value: Object.freeze([{}]) }})))",
            cooked.join(", "),
            raw.join(", "),
            cache = cache
        );

        let mut args = vec![strings];
        args.extend(values.iter().cloned());
        let call = format!("{}({})", tag, args.join(", "));

        if site.new_callee {
            format!("({})", call)
        } else {
            call
        }
    }
}
