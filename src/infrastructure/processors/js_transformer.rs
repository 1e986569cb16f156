use super::common::ParseFailure;
use crate::utils::{HostpackError, Result};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::Path;

/// Compiles TypeScript and JSX modules down to plain JavaScript so the
/// bundler only ever analyzes standard module syntax.
pub struct OxcSourceTransformer {
    options: TransformOptions,
}

impl OxcSourceTransformer {
    pub fn new() -> Self {
        Self {
            options: TransformOptions::default(),
        }
    }

    pub fn transform(&self, source: &str, path: &Path) -> Result<String> {
        let source_type = SourceType::from_path(path)
            .map_err(|e| HostpackError::bundle(path, format!("unsupported source type: {}", e)))?;

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type).parse();

        if parsed.panicked || !parsed.errors.is_empty() {
            let failure = ParseFailure::from_diagnostics(&parsed.errors);
            return Err(Self::syntax_error(path, source, failure));
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

        let transformed = Transformer::new(&allocator, path, &self.options)
            .build_with_scoping(scoping, &mut program);

        if !transformed.errors.is_empty() {
            let failure = ParseFailure::from_diagnostics(&transformed.errors);
            return Err(Self::syntax_error(path, source, failure));
        }

        Ok(Codegen::new().build(&program).code)
    }

    fn syntax_error(path: &Path, source: &str, failure: ParseFailure) -> HostpackError {
        match failure.offset {
            Some(offset) => HostpackError::bundle_at(path, source, offset, failure.message),
            None => HostpackError::bundle(path, failure.message),
        }
    }
}

impl Default for OxcSourceTransformer {
    fn default() -> Self {
        Self::new()
    }
}
