use super::common::ParseFailure;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{ParseOptions, Parser};
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::{HashMap, HashSet};

/// One name bound by an import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    Default(String),
    Namespace(String),
    Named { imported: String, local: String },
}

impl ImportBinding {
    pub fn local(&self) -> &str {
        match self {
            ImportBinding::Default(local) | ImportBinding::Namespace(local) => local,
            ImportBinding::Named { local, .. } => local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub span: Span,
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

/// Top-level export statements, classified by how they must be rewritten
#[derive(Debug, Clone)]
pub enum ExportDecl {
    /// `export const a = 1` / `export function f() {}`; `decl_start` is where
    /// the declaration begins after the keyword
    Declaration {
        span: Span,
        decl_start: u32,
        names: Vec<String>,
    },
    /// `export default function f() {}` / `export default class C {}`
    DefaultDeclaration { span: Span, decl_start: u32, name: String },
    /// `export default <expr>` and anonymous default functions or classes
    DefaultExpression { span: Span, expr: Span },
    /// `export { a, b as c }`: (local, exported) pairs
    Named { span: Span, specifiers: Vec<(String, String)> },
    /// `export { a as b } from "x"` and `export * as ns from "x"`: (imported, exported)
    /// pairs, with `*` standing for the namespace
    From {
        span: Span,
        specifier: String,
        specifiers: Vec<(String, String)>,
    },
    /// `export * from "x"`
    All { span: Span, specifier: String },
    /// Type-only exports that carry no runtime value
    TypeOnly { span: Span },
    /// `export =` and `export as namespace`
    Unsupported { span: Span, what: &'static str },
}

impl ExportDecl {
    pub fn span(&self) -> Span {
        match self {
            ExportDecl::Declaration { span, .. }
            | ExportDecl::DefaultDeclaration { span, .. }
            | ExportDecl::DefaultExpression { span, .. }
            | ExportDecl::Named { span, .. }
            | ExportDecl::From { span, .. }
            | ExportDecl::All { span, .. }
            | ExportDecl::TypeOnly { span }
            | ExportDecl::Unsupported { span, .. } => *span,
        }
    }

    /// The module this export re-exports from, if any
    pub fn source(&self) -> Option<&str> {
        match self {
            ExportDecl::From { specifier, .. } | ExportDecl::All { specifier, .. } => Some(specifier),
            _ => None,
        }
    }
}

/// A `require("literal")` call
#[derive(Debug, Clone)]
pub struct RequireCall {
    pub span: Span,
    pub callee: Span,
    pub specifier: String,
}

/// Where a read of an imported binding sits, which decides how it can be
/// replaced by a property access on the imported module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePosition {
    Value,
    /// Callee of a call or tag of a tagged template; must not pass the module as `this`
    Callee,
    /// `{ name }` in an object literal or destructuring assignment; the key must stay
    Shorthand,
}

/// A use of a default or named import inside the module body
#[derive(Debug, Clone)]
pub struct ImportReference {
    pub span: Span,
    pub local: String,
    pub position: ReferencePosition,
}

/// An `import(...)` expression; `specifier` is `None` when the argument is not a literal
#[derive(Debug, Clone)]
pub struct DynamicImport {
    pub span: Span,
    pub specifier: Option<String>,
}

/// Module-level syntax of one parsed file. Owns no AST data, so it can be
/// held across awaits.
#[derive(Debug, Clone, Default)]
pub struct ModuleSyntax {
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    pub requires: Vec<RequireCall>,
    pub dynamic_imports: Vec<DynamicImport>,
    /// Uses of default and named imports, outside import and export statements
    pub import_references: Vec<ImportReference>,
    /// Whether the file uses import/export statements
    pub is_esm: bool,
}

impl ModuleSyntax {
    /// Every literal specifier the module depends on, in first-seen source order
    pub fn specifiers(&self) -> Vec<String> {
        let mut located: Vec<(u32, &str)> = Vec::new();
        located.extend(self.imports.iter().map(|i| (i.span.start, i.specifier.as_str())));
        located.extend(
            self.exports
                .iter()
                .filter_map(|e| e.source().map(|s| (e.span().start, s))),
        );
        located.extend(self.requires.iter().map(|r| (r.span.start, r.specifier.as_str())));
        located.extend(
            self.dynamic_imports
                .iter()
                .filter_map(|d| d.specifier.as_deref().map(|s| (d.span.start, s))),
        );
        located.sort_by_key(|(start, _)| *start);

        let mut seen = Vec::new();
        for (_, spec) in located {
            if !seen.iter().any(|s: &String| s == spec) {
                seen.push(spec.to_string());
            }
        }
        seen
    }
}

/// Parse `source` as an ES module, falling back to a classic script, and
/// collect its module syntax. When both parses fail the module error is returned.
pub fn analyze(source: &str) -> std::result::Result<ModuleSyntax, ParseFailure> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();

    if !ret.panicked && ret.errors.is_empty() {
        let mut syntax = collect(&ret.program);
        if !syntax.imports.is_empty() {
            syntax.import_references = import_references(&ret.program);
        }
        return Ok(syntax);
    }
    let module_failure = ParseFailure::from_diagnostics(&ret.errors);

    let script_allocator = Allocator::default();
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let script = Parser::new(&script_allocator, source, SourceType::cjs())
        .with_options(options)
        .parse();

    if !script.panicked && script.errors.is_empty() {
        return Ok(collect(&script.program));
    }

    Err(module_failure)
}

fn collect(program: &Program<'_>) -> ModuleSyntax {
    let mut syntax = ModuleSyntax::default();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                syntax.is_esm = true;
                if decl.import_kind.is_type() {
                    continue;
                }
                syntax.imports.push(import_decl(decl));
            }
            Statement::ExportNamedDeclaration(decl) => {
                syntax.is_esm = true;
                syntax.exports.push(named_export(decl));
            }
            Statement::ExportDefaultDeclaration(decl) => {
                syntax.is_esm = true;
                syntax.exports.push(default_export(decl));
            }
            Statement::ExportAllDeclaration(decl) => {
                syntax.is_esm = true;
                let specifier = decl.source.value.to_string();
                syntax.exports.push(match &decl.exported {
                    Some(name) => ExportDecl::From {
                        span: decl.span,
                        specifier,
                        specifiers: vec![("*".to_string(), name.name().to_string())],
                    },
                    None => ExportDecl::All {
                        span: decl.span,
                        specifier,
                    },
                });
            }
            Statement::TSExportAssignment(decl) => {
                syntax.is_esm = true;
                syntax.exports.push(ExportDecl::Unsupported {
                    span: decl.span,
                    what: "export =",
                });
            }
            Statement::TSNamespaceExportDeclaration(decl) => {
                syntax.is_esm = true;
                syntax.exports.push(ExportDecl::Unsupported {
                    span: decl.span,
                    what: "export as namespace",
                });
            }
            _ => {}
        }
    }

    let mut deps = DependencyCollector::default();
    deps.visit_program(program);
    syntax.requires = deps.requires;
    syntax.dynamic_imports = deps.dynamic_imports;

    syntax
}

fn import_decl(decl: &ImportDeclaration<'_>) -> ImportDecl {
    let mut bindings = Vec::new();
    if let Some(specifiers) = &decl.specifiers {
        for spec in specifiers {
            match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    bindings.push(ImportBinding::Named {
                        imported: s.imported.name().to_string(),
                        local: s.local.name.to_string(),
                    });
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    bindings.push(ImportBinding::Default(s.local.name.to_string()));
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    bindings.push(ImportBinding::Namespace(s.local.name.to_string()));
                }
            }
        }
    }

    ImportDecl {
        span: decl.span,
        specifier: decl.source.value.to_string(),
        bindings,
    }
}

fn named_export(decl: &ExportNamedDeclaration<'_>) -> ExportDecl {
    if decl.export_kind.is_type() {
        return ExportDecl::TypeOnly { span: decl.span };
    }

    if let Some(declaration) = &decl.declaration {
        let names = declaration_names(declaration);
        if declaration.is_typescript_syntax() {
            return ExportDecl::TypeOnly { span: decl.span };
        }
        return ExportDecl::Declaration {
            span: decl.span,
            decl_start: declaration.span().start,
            names,
        };
    }

    let specifiers: Vec<(String, String)> = decl
        .specifiers
        .iter()
        .filter(|s| !s.export_kind.is_type())
        .map(|s| (s.local.name().to_string(), s.exported.name().to_string()))
        .collect();

    match &decl.source {
        Some(source) => ExportDecl::From {
            span: decl.span,
            specifier: source.value.to_string(),
            specifiers,
        },
        None => ExportDecl::Named {
            span: decl.span,
            specifiers,
        },
    }
}

fn default_export(decl: &ExportDefaultDeclaration<'_>) -> ExportDecl {
    match &decl.declaration {
        ExportDefaultDeclarationKind::FunctionDeclaration(func) => match &func.id {
            Some(id) => ExportDecl::DefaultDeclaration {
                span: decl.span,
                decl_start: func.span.start,
                name: id.name.to_string(),
            },
            None => ExportDecl::DefaultExpression {
                span: decl.span,
                expr: func.span,
            },
        },
        ExportDefaultDeclarationKind::ClassDeclaration(class) => match &class.id {
            Some(id) => ExportDecl::DefaultDeclaration {
                span: decl.span,
                decl_start: class.span.start,
                name: id.name.to_string(),
            },
            None => ExportDecl::DefaultExpression {
                span: decl.span,
                expr: class.span,
            },
        },
        ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => ExportDecl::TypeOnly { span: decl.span },
        other => ExportDecl::DefaultExpression {
            span: decl.span,
            expr: other.span(),
        },
    }
}

/// Names bound by a declaration
pub fn declaration_names(declaration: &Declaration<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                pattern_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn pattern_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(obj) => {
            for prop in &obj.properties {
                pattern_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                pattern_names(element, names);
            }
            if let Some(rest) = &arr.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => pattern_names(&assign.left, names),
    }
}

/// Resolve every identifier that reads a default or named import. Scoping
/// decides the binding, so shadowed names are left alone.
fn import_references(program: &Program<'_>) -> Vec<ImportReference> {
    let scoping = SemanticBuilder::new().build(program).semantic.into_scoping();

    let mut locals = HashMap::new();
    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        if decl.import_kind.is_type() {
            continue;
        }
        for spec in decl.specifiers.iter().flatten() {
            let local = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) if !s.import_kind.is_type() => &s.local,
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                _ => continue,
            };
            if let Some(symbol_id) = local.symbol_id.get() {
                locals.insert(symbol_id, local.name.to_string());
            }
        }
    }

    let mut finder = ReferenceFinder {
        scoping: &scoping,
        locals,
        callees: HashSet::new(),
        shorthands: HashSet::new(),
        found: Vec::new(),
    };
    finder.visit_program(program);
    finder.found
}

struct ReferenceFinder<'s> {
    scoping: &'s Scoping,
    locals: HashMap<SymbolId, String>,
    callees: HashSet<u32>,
    shorthands: HashSet<u32>,
    found: Vec<ImportReference>,
}

impl<'a> Visit<'a> for ReferenceFinder<'_> {
    fn visit_import_declaration(&mut self, _decl: &ImportDeclaration<'a>) {}

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        // Specifier lists are rewritten together with their statement
        if let Some(declaration) = &decl.declaration {
            self.visit_declaration(declaration);
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &call.callee {
            self.callees.insert(ident.span.start);
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_tagged_template_expression(&mut self, expr: &TaggedTemplateExpression<'a>) {
        if let Expression::Identifier(ident) = &expr.tag {
            self.callees.insert(ident.span.start);
        }
        walk::walk_tagged_template_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                self.shorthands.insert(ident.span.start);
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_assignment_target_property_identifier(&mut self, prop: &AssignmentTargetPropertyIdentifier<'a>) {
        self.shorthands.insert(prop.binding.span.start);
        walk::walk_assignment_target_property_identifier(self, prop);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let Some(reference_id) = ident.reference_id.get() else {
            return;
        };
        let Some(symbol_id) = self.scoping.get_reference(reference_id).symbol_id() else {
            return;
        };
        let Some(local) = self.locals.get(&symbol_id) else {
            return;
        };

        let position = if self.shorthands.contains(&ident.span.start) {
            ReferencePosition::Shorthand
        } else if self.callees.contains(&ident.span.start) {
            ReferencePosition::Callee
        } else {
            ReferencePosition::Value
        };

        self.found.push(ImportReference {
            span: ident.span,
            local: local.clone(),
            position,
        });
    }
}

#[derive(Default)]
struct DependencyCollector {
    requires: Vec<RequireCall>,
    dynamic_imports: Vec<DynamicImport>,
}

impl<'a> Visit<'a> for DependencyCollector {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &call.callee {
            if ident.name == "require" && call.arguments.len() == 1 {
                if let Argument::StringLiteral(lit) = &call.arguments[0] {
                    self.requires.push(RequireCall {
                        span: call.span,
                        callee: ident.span,
                        specifier: lit.value.to_string(),
                    });
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        let specifier = match &expr.source {
            Expression::StringLiteral(lit) => Some(lit.value.to_string()),
            Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
                .quasis
                .first()
                .and_then(|q| q.value.cooked.as_ref())
                .map(|c| c.to_string()),
            _ => None,
        };

        self.dynamic_imports.push(DynamicImport {
            span: expr.span,
            specifier,
        });
        walk::walk_import_expression(self, expr);
    }
}
