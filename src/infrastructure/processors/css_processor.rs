use super::class_scanner::ClassScanner;
use super::utilities::UtilityGenerator;
use crate::core::interfaces::{FileSystemService, StyleExtractor};
use crate::core::models::StylesheetArtifact;
use crate::utils::{HostpackError, Logger, Result, Timer};
use futures::future::try_join_all;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Class selectors written in a stylesheet
static CLASS_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(-?[_a-zA-Z][_a-zA-Z0-9-]*)").unwrap());

/// Builds the UI stylesheet with lightningcss: utility directives are
/// expanded for the classes the UI references, hand-written class rules the
/// UI never references are purged, and the result is minified.
pub struct LightningCssProcessor {
    fs: Arc<dyn FileSystemService>,
    scanner: ClassScanner,
    utilities: UtilityGenerator,
}

impl LightningCssProcessor {
    pub fn new(fs: Arc<dyn FileSystemService>) -> Self {
        Self {
            fs,
            scanner: ClassScanner::new(),
            utilities: UtilityGenerator::new(),
        }
    }

    pub fn is_scss_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("scss") | Some("sass")
        )
    }

    fn compile_scss(content: &str, path: &Path) -> Result<String> {
        let syntax = if path.extension().and_then(|s| s.to_str()) == Some("sass") {
            grass::InputSyntax::Sass
        } else {
            grass::InputSyntax::Scss
        };

        let mut options = grass::Options::default().input_syntax(syntax);
        if let Some(dir) = path.parent() {
            options = options.load_path(dir);
        }

        grass::from_string(content.to_string(), &options)
            .map_err(|e| HostpackError::style(path, format!("SCSS compilation failed: {}", e)))
    }

    /// Class names the stylesheet declares rules for
    pub fn declared_classes(css: &str) -> BTreeSet<String> {
        CLASS_SELECTOR
            .captures_iter(css)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Expand, purge and minify `css` against `candidates`
    pub fn build(&self, css: &str, path: &Path, candidates: &BTreeSet<String>) -> Result<StylesheetArtifact> {
        let unused_symbols: HashSet<String> = Self::declared_classes(css)
            .into_iter()
            .filter(|class| !candidates.contains(class))
            .collect();

        let expanded = self.utilities.expand(css, candidates);

        let options = ParserOptions {
            filename: path.display().to_string(),
            ..ParserOptions::default()
        };
        let mut sheet = StyleSheet::parse(&expanded.css, options)
            .map_err(|e| HostpackError::style(path, format!("malformed stylesheet: {}", e)))?;

        Logger::debug(&format!("Purging {} unused class selectors", unused_symbols.len()));
        sheet
            .minify(MinifyOptions {
                unused_symbols,
                ..MinifyOptions::default()
            })
            .map_err(|e| HostpackError::style(path, format!("minification failed: {}", e)))?;

        let printed = sheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| HostpackError::style(path, format!("printing failed: {}", e)))?;

        Ok(StylesheetArtifact {
            css: printed.code,
            candidate_tokens: candidates.len(),
            generated_rules: expanded.generated.len(),
        })
    }
}

#[async_trait::async_trait]
impl StyleExtractor for LightningCssProcessor {
    async fn extract(&self, stylesheet: &Path, ui_files: &[PathBuf]) -> Result<StylesheetArtifact> {
        let _timer = Timer::start("Extracting styles");

        let source = self
            .fs
            .read_file(stylesheet)
            .await
            .map_err(|e| HostpackError::style(stylesheet, format!("cannot read stylesheet: {}", e)))?;

        let css = if Self::is_scss_file(stylesheet) {
            Self::compile_scss(&source, stylesheet)?
        } else {
            source
        };

        let contents = try_join_all(ui_files.iter().map(|file| async move {
            self.fs
                .read_file(file)
                .await
                .map_err(|e| HostpackError::style(file, format!("cannot scan UI file: {}", e)))
        }))
        .await?;
        let candidates = self.scanner.scan(&contents);

        let artifact = self.build(&css, stylesheet, &candidates)?;
        Logger::styles_extracted(artifact.candidate_tokens, artifact.generated_rules, artifact.css.len());
        Ok(artifact)
    }
}
