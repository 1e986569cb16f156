use super::common::ParseFailure;
use crate::core::interfaces::ScriptPass;
use crate::utils::{HostpackError, Result};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::path::Path;

const PASS: &str = "minify";

/// Minification of the browser bundle using oxc. Runs before the syntax
/// downgrade so any template literal the compressor introduces is lowered too.
pub struct OxcMinifier {
    mangle: bool,
    compress: bool,
}

impl OxcMinifier {
    pub fn new() -> Self {
        Self {
            mangle: true,
            compress: true,
        }
    }

    pub fn with_options(mangle: bool, compress: bool) -> Self {
        Self { mangle, compress }
    }

    pub fn minify(&self, code: &str, origin: &Path) -> Result<String> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, code, SourceType::cjs()).parse();

        if parsed.panicked || !parsed.errors.is_empty() {
            let failure = ParseFailure::from_diagnostics(&parsed.errors);
            let message = format!("bundle does not parse: {}", failure.message);
            return Err(match failure.offset {
                Some(offset) => HostpackError::transform_at(PASS, origin, code, offset, message),
                None => HostpackError::transform(PASS, origin, message),
            });
        }

        let mut program = parsed.program;
        let options = MinifierOptions {
            mangle: self.mangle.then(MangleOptions::default),
            compress: self.compress.then(CompressOptions::default),
        };
        let minified = Minifier::new(options).minify(&allocator, &mut program);

        Ok(Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program)
            .code)
    }

    /// Percentage of bytes saved
    pub fn reduction(original: &str, minified: &str) -> f64 {
        if original.is_empty() {
            return 0.0;
        }
        let original_size = original.len() as f64;
        ((original_size - minified.len() as f64) / original_size) * 100.0
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptPass for OxcMinifier {
    fn name(&self) -> &'static str {
        PASS
    }

    fn apply(&self, code: &str, origin: &Path) -> Result<String> {
        let minified = self.minify(code, origin)?;
        tracing::debug!(
            "Minified {} ({:.1}% smaller)",
            origin.display(),
            Self::reduction(code, &minified)
        );
        Ok(minified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_minification() {
        let minifier = OxcMinifier::new();
        let source = r#"
            (function () {
                function greet(name) {
                    const message = "Hello, " + name;
                    console.log(message);
                    return message;
                }
                window.greet = greet;
            })();
        "#;

        let minified = minifier.minify(source, Path::new("src/ui/main.ts")).unwrap();
        assert!(minified.len() < source.len());
        assert!(minified.contains("window.greet"));
    }

    #[test]
    fn test_parse_error_is_transform_error() {
        let err = OxcMinifier::new()
            .apply("function (", Path::new("src/ui/main.ts"))
            .unwrap_err();
        assert_eq!(err.kind(), "TransformError");
        assert!(err.to_string().contains("minify"));
    }

    #[test]
    fn test_reduction_calculation() {
        let original = "function hello() { return 'world'; }";
        let minified = "function hello(){return'world'}";
        assert!(OxcMinifier::reduction(original, minified) > 0.0);
        assert_eq!(OxcMinifier::reduction("", ""), 0.0);
    }
}
