use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;
    /// Write `content`, creating parent directories. Failures are `WriteError`s.
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
    /// Every file below `root` whose extension is in `extensions`, sorted.
    /// Hidden directories and `node_modules` are skipped.
    async fn scan_tree(&self, root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// Collapses a source unit's import graph into one bundle
#[async_trait]
pub trait BundlerService: Send + Sync {
    async fn bundle(&self, unit: &SourceUnit) -> Result<Bundle>;
}

/// Produces the stylesheet artifact for the UI
#[async_trait]
pub trait StyleExtractor: Send + Sync {
    async fn extract(&self, stylesheet: &Path, ui_files: &[PathBuf]) -> Result<StylesheetArtifact>;
}

/// A text-to-text rewrite applied to a bundle
pub trait ScriptPass: Send + Sync {
    fn name(&self) -> &'static str;
    /// `origin` names the bundle's entry for error reports
    fn apply(&self, code: &str, origin: &Path) -> Result<String>;
}

/// Writes the output set all-or-nothing
#[async_trait]
pub trait ArtifactAssembler: Send + Sync {
    async fn assemble(
        &self,
        input: &AssemblyInput,
        outdir: &Path,
        names: &OutputNames,
    ) -> Result<OutputSet>;
}
