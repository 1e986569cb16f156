use crate::core::models::PipelineStage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Location details attached to bundle and transform errors
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
    pub snippet_first_line: usize,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            file_path: None,
            line: None,
            column: None,
            code_snippet: None,
            snippet_first_line: 1,
        }
    }

    /// Build a context pointing at a byte offset of `source`, with one line of
    /// surrounding code on each side.
    pub fn at_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;

        let first_line = line.saturating_sub(1).max(1);
        let snippet = source
            .lines()
            .skip(first_line - 1)
            .take(line - first_line + 2)
            .map(|l| l.chars().take(160).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            file_path: None,
            line: Some(line),
            column: Some(column),
            code_snippet: Some(snippet),
            snippet_first_line: first_line,
        }
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }
}

#[derive(Error, Debug)]
pub enum HostpackError {
    #[error("Bundle error in {}: {message}", .file.display())]
    Bundle {
        file: PathBuf,
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Style build error in {}: {message}", .file.display())]
    StyleBuild { file: PathBuf, message: String },

    #[error("Transform error in {pass} pass ({}): {message}", .origin.display())]
    Transform {
        pass: &'static str,
        origin: PathBuf,
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Write error at {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<HostpackError>,
    },
}

impl HostpackError {
    pub fn bundle(file: &Path, message: impl Into<String>) -> Self {
        Self::Bundle {
            file: file.to_path_buf(),
            message: message.into(),
            context: None,
        }
    }

    /// Bundle error pointing at a byte offset inside the module's code
    pub fn bundle_at(file: &Path, source: &str, offset: u32, message: impl Into<String>) -> Self {
        Self::Bundle {
            file: file.to_path_buf(),
            message: message.into(),
            context: Some(ErrorContext::at_offset(source, offset as usize).with_file(file.to_path_buf())),
        }
    }

    pub fn style(file: &Path, message: impl Into<String>) -> Self {
        Self::StyleBuild {
            file: file.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn transform(pass: &'static str, origin: &Path, message: impl Into<String>) -> Self {
        Self::Transform {
            pass,
            origin: origin.to_path_buf(),
            message: message.into(),
            context: None,
        }
    }

    pub fn transform_at(
        pass: &'static str,
        origin: &Path,
        source: &str,
        offset: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Transform {
            pass,
            origin: origin.to_path_buf(),
            message: message.into(),
            context: Some(ErrorContext::at_offset(source, offset as usize)),
        }
    }

    pub fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Attribute this error to the pipeline stage it was raised in
    pub fn in_stage(self, stage: PipelineStage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was attributed to, if any
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error with any stage attribution removed
    pub fn root(&self) -> &HostpackError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short taxonomy name used in reports
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Self::Bundle { .. } => "BundleError",
            Self::StyleBuild { .. } => "StyleBuildError",
            Self::Transform { .. } => "TransformError",
            Self::Write { .. } => "WriteError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Stage { .. } => unreachable!("root() never returns a stage wrapper"),
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        let mut output = match self.stage() {
            Some(stage) => format!("❌ {} stage failed", stage),
            None => "❌ hostpack failed".to_string(),
        };

        let root = self.root();
        match root {
            Self::Bundle { file, message, context } => {
                output.push_str(&format!("\n{}: {}", self.kind(), message));
                output.push_str(&format!("\n📁 File: {}", file.display()));
                Self::append_context(&mut output, context);
            }
            Self::Transform { pass, origin, message, context } => {
                output.push_str(&format!("\n{} ({} pass): {}", self.kind(), pass, message));
                output.push_str(&format!("\n📦 Bundle: {}", origin.display()));
                Self::append_context(&mut output, context);
            }
            Self::StyleBuild { file, message } => {
                output.push_str(&format!("\n{}: {}", self.kind(), message));
                output.push_str(&format!("\n📁 File: {}", file.display()));
            }
            Self::Write { path, source } => {
                output.push_str(&format!("\n{}: {}", self.kind(), source));
                output.push_str(&format!("\n📁 Path: {}", path.display()));
            }
            other => {
                output.push_str(&format!("\n{}: {}", self.kind(), other));
            }
        }

        output
    }

    fn append_context(output: &mut String, context: &Option<ErrorContext>) {
        let Some(ctx) = context else {
            return;
        };

        if let (Some(line), Some(column)) = (ctx.line, ctx.column) {
            output.push_str(&format!("\n📍 Location: line {}, column {}", line, column));
        }

        if let Some(ref snippet) = ctx.code_snippet {
            output.push_str(&format!(
                "\n📝 Code:\n{}",
                Self::format_code_snippet(snippet, ctx.snippet_first_line, ctx.line)
            ));
        }
    }

    fn format_code_snippet(snippet: &str, first_line: usize, error_line: Option<usize>) -> String {
        let mut output = String::new();

        for (i, line) in snippet.lines().enumerate() {
            let line_num = first_line + i;
            if error_line == Some(line_num) {
                output.push_str(&format!("→ {:4} │ {}\n", line_num, line));
            } else {
                output.push_str(&format!("  {:4} │ {}\n", line_num, line));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, HostpackError>;
