use super::common::{check_syntax, is_identifier_name, SourceEditor, HOST_ENTRY_MARKER};
use super::module_syntax::{analyze, ExportDecl};
use crate::core::interfaces::ScriptPass;
use crate::utils::{HostpackError, Logger, Result};
use oxc_span::SourceType;
use std::fmt::Write as _;
use std::path::Path;

const PASS: &str = "module-strip";

/// Binding that receives an anonymous default export
pub const DEFAULT_EXPORT_BINDING: &str = "_default";

/// Removes import/export syntax from the host script so every exported
/// binding becomes a plain top-level declaration, i.e. a host global.
pub struct ModuleMarkerStripper;

impl ModuleMarkerStripper {
    pub fn new() -> Self {
        Self
    }

    /// Offset of the host entry's code. Everything before the bundler's
    /// entry marker is registry code, which may be sloppy-mode script.
    fn entry_start(code: &str) -> usize {
        if code.starts_with(HOST_ENTRY_MARKER) {
            return 0;
        }
        code.rfind(&format!("\n{}", HOST_ENTRY_MARKER))
            .map_or(0, |at| at + 1)
    }

    pub fn strip(&self, code: &str, origin: &Path) -> Result<String> {
        let start = Self::entry_start(code);
        let base = start as u32;
        let syntax = analyze(&code[start..]).map_err(|failure| {
            let message = format!("host script is not a parseable module: {}", failure.message);
            match failure.offset {
                Some(offset) => HostpackError::transform_at(PASS, origin, code, base + offset, message),
                None => HostpackError::transform(PASS, origin, message),
            }
        })?;

        if !syntax.is_esm {
            return Ok(code.to_string());
        }

        let mut editor = SourceEditor::new(code);
        let mut aliases = String::new();

        for import in &syntax.imports {
            let names: Vec<&str> = import.bindings.iter().map(|b| b.local()).collect();
            if names.is_empty() {
                Logger::warn(&format!("Dropping side-effect import '{}' from the host script", import.specifier));
            } else {
                Logger::warn(&format!(
                    "Dropping import of '{}'; {} must be provided by the host as globals",
                    import.specifier,
                    names.join(", ")
                ));
            }
            editor.remove(base + import.span.start, base + import.span.end);
        }

        for export in &syntax.exports {
            match export {
                ExportDecl::Declaration { span, decl_start, .. }
                | ExportDecl::DefaultDeclaration { span, decl_start, .. } => {
                    editor.remove(base + span.start, base + *decl_start);
                }
                ExportDecl::DefaultExpression { span, expr } => {
                    editor.replace(base + span.start, base + expr.start, format!("var {} = ", DEFAULT_EXPORT_BINDING));
                    if span.end == expr.end {
                        editor.insert(base + span.end, ";");
                    }
                }
                ExportDecl::Named { span, specifiers } => {
                    for (local, exported) in specifiers {
                        let global = if exported == "default" {
                            DEFAULT_EXPORT_BINDING
                        } else {
                            exported.as_str()
                        };
                        if global == local {
                            continue;
                        }
                        if !is_identifier_name(global) {
                            return Err(HostpackError::transform_at(
                                PASS,
                                origin,
                                code,
                                base + span.start,
                                format!("export name '{}' cannot become a global identifier", exported),
                            ));
                        }
                        let _ = writeln!(aliases, "var {} = {};", global, local);
                    }
                    editor.remove(base + span.start, base + span.end);
                }
                ExportDecl::TypeOnly { span } => editor.remove(base + span.start, base + span.end),
                ExportDecl::From { span, specifier, .. } | ExportDecl::All { span, specifier } => {
                    return Err(HostpackError::transform_at(
                        PASS,
                        origin,
                        code,
                        base + span.start,
                        format!("re-export from '{}' survived bundling; the host has no module to read it from", specifier),
                    ));
                }
                ExportDecl::Unsupported { span, what } => {
                    return Err(HostpackError::transform_at(
                        PASS,
                        origin,
                        code,
                        base + span.start,
                        format!("'{}' cannot be expressed as host globals", what),
                    ));
                }
            }
        }

        // Aliases go last so every aliased declaration has run
        if !aliases.is_empty() {
            let separator = if code.ends_with('\n') { "" } else { "\n" };
            editor.insert(code.len() as u32, format!("{}{}", separator, aliases));
        }

        let stripped = editor
            .finish()
            .map_err(|message| HostpackError::transform(PASS, origin, message))?;

        check_syntax(&stripped, SourceType::cjs()).map_err(|failure| {
            let message = format!("stripped host script is not a classic script: {}", failure.message);
            match failure.offset {
                Some(offset) => HostpackError::transform_at(PASS, origin, &stripped, offset, message),
                None => HostpackError::transform(PASS, origin, message),
            }
        })?;

        Ok(stripped)
    }
}

impl Default for ModuleMarkerStripper {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptPass for ModuleMarkerStripper {
    fn name(&self) -> &'static str {
        PASS
    }

    fn apply(&self, code: &str, origin: &Path) -> Result<String> {
        self.strip(code, origin)
    }
}
