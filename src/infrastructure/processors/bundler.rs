use super::common::{is_node_modules_path, member_access, quote_js_string, ParseFailure, SourceEditor, HOST_ENTRY_MARKER};
use super::js_transformer::OxcSourceTransformer;
use super::module_syntax::{analyze, ExportDecl, ImportBinding, ModuleSyntax, ReferencePosition};
use crate::core::interfaces::{BundlerService, FileSystemService};
use crate::core::models::{Bundle, ModuleType, SourceUnit, TargetMode};
use crate::infrastructure::NodeModuleResolver;
use crate::utils::{HostpackError, Logger, Result, Timer};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Module registry shared by both bundle formats. Modules are evaluated once
/// and cached before their factory runs, so import cycles terminate.
const RUNTIME: &str = r#"var __hostpack = (function () {
  var has = Object.prototype.hasOwnProperty;
  var factories = {};
  var dependencies = {};
  var cache = {};

  function define(id, factory, deps) {
    factories[id] = factory;
    dependencies[id] = deps;
  }

  function requireFrom(deps) {
    return function (specifier) {
      if (!has.call(deps, specifier)) {
        throw new Error("Cannot find module '" + specifier + "'");
      }
      return load(deps[specifier]);
    };
  }

  function load(id) {
    if (has.call(cache, id)) {
      return cache[id].exports;
    }
    var module = { exports: {} };
    cache[id] = module;
    factories[id].call(module.exports, module, module.exports, requireFrom(dependencies[id]));
    return module.exports;
  }

  function defineExports(exports, getters) {
    Object.defineProperty(exports, "__esModule", { value: true });
    for (var name in getters) {
      if (has.call(getters, name)) {
        Object.defineProperty(exports, name, { enumerable: true, get: getters[name] });
      }
    }
  }

  function exportStar(exports, source) {
    Object.keys(source).forEach(function (name) {
      if (name !== "default" && !has.call(exports, name)) {
        Object.defineProperty(exports, name, {
          enumerable: true,
          get: function () { return source[name]; }
        });
      }
    });
  }

  function importDefault(m) {
    return m && m.__esModule ? m["default"] : m;
  }

  function importNamespace(m) {
    if (m && m.__esModule) {
      return m;
    }
    var ns = { "default": m };
    if (m !== null && (typeof m === "object" || typeof m === "function")) {
      for (var name in m) {
        if (name !== "default" && has.call(m, name)) {
          ns[name] = m[name];
        }
      }
    }
    return ns;
  }

  return {
    define: define,
    load: load,
    requireFrom: requireFrom,
    defineExports: defineExports,
    exportStar: exportStar,
    importDefault: importDefault,
    importNamespace: importNamespace
  };
})();
"#;

const HOST_REQUIRE: &str = "__hostpack_require";

enum ModuleBody {
    Script(ModuleSyntax),
    Json,
    Empty,
}

/// How a default or named import is read at each use, so the importer sees
/// the exporter's current value rather than a copy taken at load time
#[derive(Debug, Clone)]
enum LiveBinding {
    /// `__hostpack_mN.name`
    Member(String),
    /// `__hostpack.importDefault(__hostpack_mN)`
    Default(String),
}

impl LiveBinding {
    fn render(&self, position: ReferencePosition, local: &str) -> String {
        let access = match (self, position) {
            (LiveBinding::Member(access), ReferencePosition::Callee) => format!("(0, {})", access),
            (LiveBinding::Member(access), _) => access.clone(),
            (LiveBinding::Default(module_var), _) => format!("(__hostpack.importDefault({}))", module_var),
        };
        match position {
            ReferencePosition::Shorthand => format!("{}: {}", local, access),
            _ => access,
        }
    }
}

type LiveBindings = HashMap<String, LiveBinding>;

struct LoadedModule {
    path: PathBuf,
    /// Executable JavaScript (after TypeScript/JSX compilation)
    code: String,
    body: ModuleBody,
    /// Specifier to registry id, in first-seen order
    deps: Vec<(String, usize)>,
}

/// Bundles a source unit by building its module graph with oxc and emitting
/// a self-contained registry.
pub struct OxcBundler {
    fs: Arc<dyn FileSystemService>,
    resolver: Arc<NodeModuleResolver>,
    transformer: OxcSourceTransformer,
    root: PathBuf,
    node_env: String,
}

impl OxcBundler {
    pub fn new(
        fs: Arc<dyn FileSystemService>,
        resolver: Arc<NodeModuleResolver>,
        root: impl Into<PathBuf>,
        node_env: impl Into<String>,
    ) -> Self {
        Self {
            fs,
            resolver,
            transformer: OxcSourceTransformer::new(),
            root: root.into(),
            node_env: node_env.into(),
        }
    }

    /// Discover every reachable module breadth-first. The entry gets id 0.
    async fn build_graph(&self, unit: &SourceUnit) -> Result<Vec<LoadedModule>> {
        if !self.fs.file_exists(&unit.entry) {
            return Err(HostpackError::bundle(&unit.entry, "entry module not found"));
        }
        let entry = tokio::fs::canonicalize(&unit.entry)
            .await
            .unwrap_or_else(|_| unit.entry.clone());

        let mut paths = vec![entry.clone()];
        let mut ids: HashMap<PathBuf, usize> = HashMap::from([(entry, 0)]);
        let mut modules: Vec<LoadedModule> = Vec::new();

        while modules.len() < paths.len() {
            let path = paths[modules.len()].clone();
            let source = self
                .fs
                .read_file(&path)
                .await
                .map_err(|e| HostpackError::bundle(&path, format!("cannot read module: {}", e)))?;

            let (code, body) = self.load(&path, &source)?;
            let mut deps = Vec::new();

            if let ModuleBody::Script(syntax) = &body {
                for specifier in syntax.specifiers() {
                    let resolved = self.resolver.resolve(&specifier, &path, unit.mode).await;
                    let Some(resolved) = resolved else {
                        if Self::is_optional_require(&path, syntax, &specifier) {
                            Logger::warn(&format!(
                                "Leaving require('{}') in {} unresolved; it throws if reached",
                                specifier,
                                path.display()
                            ));
                            continue;
                        }
                        return Err(Self::unresolved(&path, &source, &specifier));
                    };

                    let id = *ids.entry(resolved.clone()).or_insert_with(|| {
                        paths.push(resolved);
                        paths.len() - 1
                    });
                    deps.push((specifier, id));
                }
            }

            modules.push(LoadedModule { path, code, body, deps });
        }

        Ok(modules)
    }

    /// Read one module into executable JavaScript plus its module syntax
    fn load(&self, path: &Path, source: &str) -> Result<(String, ModuleBody)> {
        match ModuleType::from_path(path) {
            ModuleType::Json => {
                serde_json::from_str::<serde_json::Value>(source).map_err(|e| {
                    HostpackError::bundle(path, format!("invalid JSON at line {}, column {}: {}", e.line(), e.column(), e))
                })?;
                Ok((format!("module.exports = {};", source.trim()), ModuleBody::Json))
            }
            ModuleType::Css => Ok((String::new(), ModuleBody::Empty)),
            ModuleType::Unknown => Err(HostpackError::bundle(
                path,
                "unsupported module type; only scripts, JSON and stylesheets can be imported",
            )),
            module_type => {
                let code = if module_type.needs_transform() {
                    self.transformer.transform(source, path)?
                } else {
                    source.to_string()
                };

                let syntax = analyze(&code).map_err(|failure| Self::syntax_error(path, &code, failure))?;

                if let Some(dynamic) = syntax.dynamic_imports.iter().find(|d| d.specifier.is_none()) {
                    return Err(HostpackError::bundle_at(
                        path,
                        &code,
                        dynamic.span.start,
                        "dynamic import() needs a string literal specifier to be bundled",
                    ));
                }

                Ok((code, ModuleBody::Script(syntax)))
            }
        }
    }

    /// Packages often guard optional dependencies behind `require` calls;
    /// those may stay unresolved. Imports and application code may not.
    fn is_optional_require(path: &Path, syntax: &ModuleSyntax, specifier: &str) -> bool {
        is_node_modules_path(path)
            && !syntax.imports.iter().any(|i| i.specifier == specifier)
            && !syntax.exports.iter().any(|e| e.source() == Some(specifier))
            && !syntax
                .dynamic_imports
                .iter()
                .any(|d| d.specifier.as_deref() == Some(specifier))
    }

    fn unresolved(path: &Path, source: &str, specifier: &str) -> HostpackError {
        let message = if NodeModuleResolver::is_builtin(specifier) {
            format!("cannot bundle Node.js builtin '{}'; it does not exist in the target runtime", specifier)
        } else {
            format!("cannot resolve import '{}'", specifier)
        };

        // Point at the specifier in the file as written
        let located = ['"', '\'', '`']
            .iter()
            .filter_map(|q| source.find(&format!("{}{}{}", q, specifier, q)))
            .min();

        match located {
            Some(offset) => HostpackError::bundle_at(path, source, offset as u32, message),
            None => HostpackError::bundle(path, message),
        }
    }

    fn syntax_error(path: &Path, code: &str, failure: ParseFailure) -> HostpackError {
        match failure.offset {
            Some(offset) => HostpackError::bundle_at(path, code, offset, failure.message),
            None => HostpackError::bundle(path, failure.message),
        }
    }

    fn display_path(&self, path: &Path) -> String {
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        path.strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn dependency_map(module: &LoadedModule) -> String {
        let entries: Vec<String> = module
            .deps
            .iter()
            .map(|(spec, id)| format!("{}: {}", quote_js_string(spec), id))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    /// Emit `module` as a registry factory
    fn emit_define(&self, out: &mut String, id: usize, module: &LoadedModule) -> Result<()> {
        let body = match &module.body {
            ModuleBody::Script(syntax) => self.factory_body(module, syntax)?,
            ModuleBody::Json => module.code.clone(),
            ModuleBody::Empty => String::new(),
        };

        let _ = writeln!(out, "// {}", self.display_path(&module.path));
        let _ = writeln!(out, "__hostpack.define({}, function (module, exports, require) {{", id);
        out.push_str(&body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
        let _ = writeln!(out, "}}, {});", Self::dependency_map(module));
        Ok(())
    }

    /// Rewrite an ES module into a CommonJS-style factory body: imports are
    /// hoisted into requires and exports become getters on `exports`.
    fn factory_body(&self, module: &LoadedModule, syntax: &ModuleSyntax) -> Result<String> {
        let mut editor = SourceEditor::new(&module.code);
        Self::rewrite_dynamic_imports(&mut editor, syntax, "require");

        if !syntax.is_esm {
            return self.finish_edits(module, editor);
        }

        let mut prologue = String::from("\"use strict\";\n");
        let mut getters: Vec<(String, String)> = Vec::new();
        let mut hoisted = String::new();
        let mut counter = 0usize;
        let mut live = LiveBindings::new();

        for import in &syntax.imports {
            let var = Self::hoist_require(&mut hoisted, &mut counter, "require", &import.specifier);
            Self::bind_imports(&mut hoisted, &mut live, &var, &import.bindings);
            editor.remove(import.span.start, import.span.end);
        }
        Self::rewrite_import_references(&mut editor, syntax, &live);

        for export in &syntax.exports {
            match export {
                ExportDecl::Declaration { span, decl_start, names } => {
                    getters.extend(names.iter().map(|n| (n.clone(), n.clone())));
                    editor.remove(span.start, *decl_start);
                }
                ExportDecl::DefaultDeclaration { span, decl_start, name } => {
                    getters.push(("default".to_string(), name.clone()));
                    editor.remove(span.start, *decl_start);
                }
                ExportDecl::DefaultExpression { span, expr } => {
                    getters.push(("default".to_string(), "__hostpack_default".to_string()));
                    editor.replace(span.start, expr.start, "var __hostpack_default = ");
                    if span.end == expr.end {
                        editor.insert(span.end, ";");
                    }
                }
                ExportDecl::Named { span, specifiers } => {
                    getters.extend(specifiers.iter().map(|(local, exported)| {
                        let value = match live.get(local) {
                            Some(binding) => binding.render(ReferencePosition::Value, local),
                            None => local.clone(),
                        };
                        (exported.clone(), value)
                    }));
                    editor.remove(span.start, span.end);
                }
                ExportDecl::From { span, specifier, specifiers } => {
                    let var = Self::hoist_require(&mut hoisted, &mut counter, "require", specifier);
                    for (imported, exported) in specifiers {
                        getters.push((exported.clone(), Self::imported_value(&var, imported)));
                    }
                    editor.remove(span.start, span.end);
                }
                ExportDecl::All { span, specifier } => {
                    let var = Self::hoist_require(&mut hoisted, &mut counter, "require", specifier);
                    let _ = writeln!(hoisted, "__hostpack.exportStar(exports, {});", var);
                    editor.remove(span.start, span.end);
                }
                ExportDecl::TypeOnly { span } => editor.remove(span.start, span.end),
                ExportDecl::Unsupported { span, what } => {
                    return Err(HostpackError::bundle_at(
                        &module.path,
                        &module.code,
                        span.start,
                        format!("'{}' has no JavaScript module equivalent", what),
                    ));
                }
            }
        }

        if !getters.is_empty() || syntax.exports.iter().any(|e| matches!(e, ExportDecl::All { .. })) {
            let entries: Vec<String> = getters
                .iter()
                .map(|(name, value)| format!("  {}: function () {{ return {}; }}", quote_js_string(name), value))
                .collect();
            let _ = writeln!(prologue, "__hostpack.defineExports(exports, {{\n{}\n}});", entries.join(",\n"));
        }
        prologue.push_str(&hoisted);

        editor.insert(0, prologue);
        self.finish_edits(module, editor)
    }

    /// Rewrite the host entry for global scope: imports become hoisted
    /// `__hostpack_require` calls, exports stay for the module-marker stripper.
    fn host_entry_body(&self, module: &LoadedModule, syntax: &ModuleSyntax) -> Result<String> {
        let mut editor = SourceEditor::new(&module.code);
        Self::rewrite_dynamic_imports(&mut editor, syntax, HOST_REQUIRE);
        for call in &syntax.requires {
            editor.replace(call.callee.start, call.callee.end, HOST_REQUIRE);
        }

        let mut hoisted = String::new();
        let mut counter = 0usize;
        let mut live = LiveBindings::new();

        for import in &syntax.imports {
            let var = Self::hoist_require(&mut hoisted, &mut counter, HOST_REQUIRE, &import.specifier);
            Self::bind_imports(&mut hoisted, &mut live, &var, &import.bindings);
            editor.remove(import.span.start, import.span.end);
        }
        Self::rewrite_import_references(&mut editor, syntax, &live);

        for export in &syntax.exports {
            match export {
                // Re-exported imports have no top-level declaration to strip
                // down to, so they get one
                ExportDecl::Named { span, specifiers } if specifiers.iter().any(|(local, _)| live.contains_key(local)) => {
                    let (imported, own): (Vec<_>, Vec<_>) =
                        specifiers.iter().partition(|(local, _)| live.contains_key(local));
                    let mut replacement = String::new();
                    if !own.is_empty() {
                        let list: Vec<String> = own
                            .iter()
                            .map(|(local, exported)| {
                                if local == exported {
                                    local.clone()
                                } else {
                                    format!("{} as {}", local, exported)
                                }
                            })
                            .collect();
                        let _ = write!(replacement, "export {{ {} }};", list.join(", "));
                    }
                    for (local, exported) in imported {
                        if let Some(binding) = live.get(local) {
                            let _ = write!(
                                replacement,
                                "export var {} = {};",
                                exported,
                                binding.render(ReferencePosition::Value, local)
                            );
                        }
                    }
                    editor.replace(span.start, span.end, replacement);
                }
                ExportDecl::From { span, specifier, specifiers } => {
                    let var = Self::hoist_require(&mut hoisted, &mut counter, HOST_REQUIRE, specifier);
                    let mut replacement = String::new();
                    for (imported, exported) in specifiers {
                        let _ = write!(replacement, "export var {} = {};", exported, Self::imported_value(&var, imported));
                    }
                    editor.replace(span.start, span.end, replacement);
                }
                ExportDecl::All { span, specifier } => {
                    return Err(HostpackError::bundle_at(
                        &module.path,
                        &module.code,
                        span.start,
                        format!(
                            "'export * from \"{}\"' cannot become host globals; export the names explicitly",
                            specifier
                        ),
                    ));
                }
                _ => {}
            }
        }

        if !hoisted.is_empty() {
            editor.insert(0, hoisted);
        }
        self.finish_edits(module, editor)
    }

    fn rewrite_dynamic_imports(editor: &mut SourceEditor<'_>, syntax: &ModuleSyntax, require: &str) {
        for dynamic in &syntax.dynamic_imports {
            if let Some(specifier) = &dynamic.specifier {
                editor.replace(
                    dynamic.span.start,
                    dynamic.span.end,
                    format!(
                        "Promise.resolve().then(function () {{ return __hostpack.importNamespace({}({})); }})",
                        require,
                        quote_js_string(specifier)
                    ),
                );
            }
        }
    }

    fn hoist_require(out: &mut String, counter: &mut usize, require: &str, specifier: &str) -> String {
        let var = format!("__hostpack_m{}", counter);
        *counter += 1;
        let _ = writeln!(out, "var {} = {}({});", var, require, quote_js_string(specifier));
        var
    }

    /// Default and named imports become live accesses on the module object.
    /// A namespace import is bound once: for an ES module it is the exports
    /// object itself, whose getters are already live.
    fn bind_imports(out: &mut String, live: &mut LiveBindings, module_var: &str, bindings: &[ImportBinding]) {
        for binding in bindings {
            match binding {
                ImportBinding::Namespace(local) => {
                    let _ = writeln!(out, "var {} = __hostpack.importNamespace({});", local, module_var);
                }
                ImportBinding::Default(local) => {
                    live.insert(local.clone(), LiveBinding::Default(module_var.to_string()));
                }
                ImportBinding::Named { imported, local } => {
                    let binding = match imported.as_str() {
                        "default" => LiveBinding::Default(module_var.to_string()),
                        name => LiveBinding::Member(member_access(module_var, name)),
                    };
                    live.insert(local.clone(), binding);
                }
            }
        }
    }

    fn rewrite_import_references(editor: &mut SourceEditor<'_>, syntax: &ModuleSyntax, live: &LiveBindings) {
        for reference in &syntax.import_references {
            if let Some(binding) = live.get(&reference.local) {
                editor.replace(
                    reference.span.start,
                    reference.span.end,
                    binding.render(reference.position, &reference.local),
                );
            }
        }
    }

    fn imported_value(module_var: &str, imported: &str) -> String {
        match imported {
            "*" => format!("__hostpack.importNamespace({})", module_var),
            "default" => format!("__hostpack.importDefault({})", module_var),
            name => member_access(module_var, name),
        }
    }

    fn finish_edits(&self, module: &LoadedModule, editor: SourceEditor<'_>) -> Result<String> {
        editor
            .finish()
            .map_err(|message| HostpackError::bundle(&module.path, message))
    }

    fn emit_browser(&self, modules: &[LoadedModule]) -> Result<String> {
        let mut out = String::from("(function () {\n");
        let _ = writeln!(
            out,
            "var process = {{ env: {{ NODE_ENV: {} }}, browser: true }};",
            quote_js_string(&self.node_env)
        );
        out.push_str(RUNTIME);

        for (id, module) in modules.iter().enumerate() {
            self.emit_define(&mut out, id, module)?;
        }

        out.push_str("__hostpack.load(0);\n})();\n");
        Ok(out)
    }

    fn emit_host(&self, modules: &[LoadedModule]) -> Result<String> {
        let (entry, rest) = modules
            .split_first()
            .ok_or_else(|| HostpackError::bundle(&self.root, "module graph is empty"))?;

        // The entry lives at global scope and has no registry factory
        if let Some(cyclic) = rest.iter().find(|m| m.deps.iter().any(|(_, id)| *id == 0)) {
            return Err(HostpackError::bundle(
                &cyclic.path,
                format!(
                    "imports the host-script entry {}; the entry cannot be part of an import cycle",
                    self.display_path(&entry.path)
                ),
            ));
        }

        let mut out = String::new();
        if !rest.is_empty() {
            out.push_str(RUNTIME);
            for (offset, module) in rest.iter().enumerate() {
                self.emit_define(&mut out, offset + 1, module)?;
            }
        }

        let entry_code = match &entry.body {
            ModuleBody::Script(syntax) => {
                if !entry.deps.is_empty() || !syntax.dynamic_imports.is_empty() {
                    let _ = writeln!(out, "var {} = __hostpack.requireFrom({});", HOST_REQUIRE, Self::dependency_map(entry));
                }
                self.host_entry_body(entry, syntax)?
            }
            _ => {
                return Err(HostpackError::bundle(
                    &entry.path,
                    "the host-script entry must be a JavaScript or TypeScript module",
                ))
            }
        };

        let _ = writeln!(out, "{}{}", HOST_ENTRY_MARKER, self.display_path(&entry.path));
        out.push_str(&entry_code);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl BundlerService for OxcBundler {
    async fn bundle(&self, unit: &SourceUnit) -> Result<Bundle> {
        let _timer = Timer::start(&format!("bundle {}", unit.mode));
        Logger::bundling(&unit.entry, unit.mode);

        let modules = self.build_graph(unit).await?;

        let code = match unit.mode {
            TargetMode::Browser => self.emit_browser(&modules)?,
            TargetMode::HostScript => self.emit_host(&modules)?,
        };

        Logger::bundle_complete(&unit.entry, modules.len(), code.len());

        Ok(Bundle {
            entry: unit.entry.clone(),
            mode: unit.mode,
            code,
            modules: modules.into_iter().map(|m| m.path).collect(),
        })
    }
}
