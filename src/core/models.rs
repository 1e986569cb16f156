use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fully resolved settings for one pipeline run. Every path is absolute or
/// relative to the process working directory (already joined with `root`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub ui_entry: PathBuf,
    pub ui_root: PathBuf,
    pub stylesheet: PathBuf,
    pub shell: Option<PathBuf>,
    pub server_entry: PathBuf,
    pub manifest: PathBuf,
    pub outdir: PathBuf,
    pub minify: bool,
    pub node_env: String,
    pub output_names: OutputNames,
}

impl PipelineConfig {
    /// Conventional project layout rooted at `root`
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            ui_entry: root.join("src/ui/main.tsx"),
            ui_root: root.join("src/ui"),
            stylesheet: root.join("src/ui/styles.css"),
            shell: None,
            server_entry: root.join("src/server/main.ts"),
            manifest: root.join("appsscript.json"),
            outdir: root.join("dist"),
            minify: false,
            node_env: "production".to_string(),
            output_names: OutputNames::default(),
            root,
        }
    }

    pub fn browser_unit(&self) -> SourceUnit {
        SourceUnit::new(self.ui_entry.clone(), TargetMode::Browser)
    }

    pub fn host_unit(&self) -> SourceUnit {
        SourceUnit::new(self.server_entry.clone(), TargetMode::HostScript)
    }
}

/// File names of the four artifacts in the output set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputNames {
    pub shell: String,
    pub script_wrapper: String,
    pub host_script: String,
    pub manifest: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            shell: "index.html".to_string(),
            script_wrapper: "javascript.html".to_string(),
            host_script: "code.js".to_string(),
            manifest: "appsscript.json".to_string(),
        }
    }
}

impl OutputNames {
    pub fn all(&self) -> [&str; 4] {
        [&self.shell, &self.script_wrapper, &self.host_script, &self.manifest]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all().contains(&name)
    }

    /// Name the host's include mechanism uses for the script wrapper
    pub fn script_include_name(&self) -> &str {
        self.script_wrapper
            .strip_suffix(".html")
            .unwrap_or(&self.script_wrapper)
    }
}

/// Runtime a source unit is bundled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// Self-executing unit loaded by the HTML shell
    Browser,
    /// Flat global-scope script executed by the host
    HostScript,
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMode::Browser => write!(f, "browser"),
            TargetMode::HostScript => write!(f, "host-script"),
        }
    }
}

/// An entry file plus its transitive import graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub entry: PathBuf,
    pub mode: TargetMode,
}

impl SourceUnit {
    pub fn new(entry: impl Into<PathBuf>, mode: TargetMode) -> Self {
        Self {
            entry: entry.into(),
            mode,
        }
    }
}

/// A source unit collapsed into a single executable text blob
#[derive(Debug, Clone)]
pub struct Bundle {
    pub entry: PathBuf,
    pub mode: TargetMode,
    pub code: String,
    /// Every module inlined into the bundle, entry first
    pub modules: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    JavaScript,
    TypeScript,
    Jsx,
    Css,
    Json,
    Unknown,
}

impl ModuleType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleType::JavaScript,
            "ts" | "mts" | "cts" | "tsx" => ModuleType::TypeScript,
            "jsx" => ModuleType::Jsx,
            "css" | "scss" | "sass" => ModuleType::Css,
            "json" => ModuleType::Json,
            _ => ModuleType::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|s| s.to_str()).unwrap_or(""))
    }

    /// TypeScript and JSX sources are compiled to plain JavaScript before bundling
    pub fn needs_transform(&self) -> bool {
        matches!(self, ModuleType::TypeScript | ModuleType::Jsx)
    }
}

/// Minified CSS scoped to the classes the UI actually uses
#[derive(Debug, Clone, Default)]
pub struct StylesheetArtifact {
    pub css: String,
    pub candidate_tokens: usize,
    pub generated_rules: usize,
}

/// A bundle after every rewrite pass for its target has been applied
#[derive(Debug, Clone)]
pub struct ProcessedScript {
    pub origin: PathBuf,
    pub mode: TargetMode,
    pub code: String,
}

/// Everything the assembler needs to write the output set
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub browser_script: String,
    pub stylesheet: String,
    pub host_script: String,
    pub manifest: String,
    pub shell_template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub name: String,
    pub path: PathBuf,
    pub size: usize,
    /// Short blake3 digest of the written bytes
    pub digest: String,
}

/// The four artifacts written by a successful run
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    pub directory: PathBuf,
    pub files: Vec<OutputFile>,
}

impl OutputSet {
    pub fn file(&self, name: &str) -> Option<&OutputFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// Orchestrator state. `Failed` is reachable from every state except `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Idle,
    Bundling,
    Transforming,
    Assembling,
    Done,
    Failed,
}

impl PipelineStage {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Idle, Bundling)
                | (Bundling, Transforming)
                | (Transforming, Assembling)
                | (Assembling, Done)
                | (Bundling, Failed)
                | (Transforming, Failed)
                | (Assembling, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Bundling => "bundling",
            PipelineStage::Transforming => "transforming",
            PipelineStage::Assembling => "assembling",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: OutputSet,
    pub browser_modules: usize,
    pub host_modules: usize,
    pub stylesheet_bytes: usize,
    pub build_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        use PipelineStage::*;
        assert!(Idle.can_advance_to(Bundling));
        assert!(Bundling.can_advance_to(Transforming));
        assert!(Assembling.can_advance_to(Done));
        assert!(Transforming.can_advance_to(Failed));

        assert!(!Idle.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Assembling));
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Bundling));
    }

    #[test]
    fn test_script_include_name_drops_html_extension() {
        let names = OutputNames::default();
        assert_eq!(names.script_include_name(), "javascript");
        assert!(names.contains("code.js"));
        assert!(!names.contains("other.txt"));
    }

    #[test]
    fn test_module_type_from_extension() {
        assert_eq!(ModuleType::from_extension("TSX"), ModuleType::TypeScript);
        assert_eq!(ModuleType::from_extension("mjs"), ModuleType::JavaScript);
        assert!(ModuleType::Jsx.needs_transform());
        assert!(!ModuleType::JavaScript.needs_transform());
        assert_eq!(ModuleType::from_extension("png"), ModuleType::Unknown);
    }
}
