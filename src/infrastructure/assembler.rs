use crate::core::interfaces::{ArtifactAssembler, FileSystemService};
use crate::core::models::{AssemblyInput, OutputFile, OutputNames, OutputSet};
use crate::utils::{HostpackError, Logger, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

pub const STYLES_PLACEHOLDER: &str = "<!-- hostpack:styles -->";
pub const SCRIPT_PLACEHOLDER: &str = "<!-- hostpack:script -->";

const STAGING_PREFIX: &str = ".hostpack-staging-";
const BACKUP_PREFIX: &str = ".hostpack-previous-";
const DIGEST_LEN: usize = 12;

pub const DEFAULT_SHELL: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <base target="_top">
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <!-- hostpack:styles -->
  </head>
  <body>
    <div id="root"></div>
    <!-- hostpack:script -->
  </body>
</html>
"#;

/// Dev-server entry tags; the host cannot load modules
static MODULE_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)[ \t]*<script\b[^>]*\btype\s*=\s*["']module["'][^>]*>.*?</script\s*>[ \t]*\r?\n?"#).unwrap()
});
static HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").unwrap());
static BODY_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body\s*>").unwrap());
static STYLE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(style)").unwrap());
static SCRIPT_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</script").unwrap());

/// Writes the output set through a staging directory that is renamed over
/// the output directory, so readers see the previous set or the new one.
pub struct AtomicArtifactAssembler {
    fs: Arc<dyn FileSystemService>,
}

impl AtomicArtifactAssembler {
    pub fn new(fs: Arc<dyn FileSystemService>) -> Self {
        Self { fs }
    }

    /// The shell document: `template` (or the built-in shell) with the
    /// stylesheet inlined and the host include pointing at the script wrapper.
    pub fn compose_shell(template: Option<&str>, css: &str, include_name: &str) -> String {
        let template = template.unwrap_or(DEFAULT_SHELL);
        let mut shell = MODULE_SCRIPT.replace_all(template, "").into_owned();

        let style_block = format!("<style>\n{}\n</style>", STYLE_CLOSE.replace_all(css, "<\\/$1"));
        let include = format!("<?!= include('{}'); ?>", include_name);

        shell = place(shell, STYLES_PLACEHOLDER, &HEAD_CLOSE, &style_block, Placement::Start);
        place(shell, SCRIPT_PLACEHOLDER, &BODY_CLOSE, &include, Placement::End)
    }

    /// The script-wrapper document around the processed browser script
    pub fn compose_wrapper(code: &str, name: &str) -> Result<String> {
        if let Some(found) = SCRIPT_CLOSE.find(code) {
            return Err(HostpackError::transform_at(
                "escape",
                Path::new(name),
                code,
                found.start() as u32,
                "browser script still contains a script-close sequence",
            ));
        }
        Ok(format!("<script>\n{}\n</script>\n", code))
    }

    fn describe(name: &str, path: PathBuf, content: &str) -> OutputFile {
        let digest = blake3::hash(content.as_bytes()).to_hex();
        OutputFile {
            name: name.to_string(),
            path,
            size: content.len(),
            digest: digest.as_str()[..DIGEST_LEN].to_string(),
        }
    }

    /// Top-level files of a previous output directory that are not part of
    /// the output set. Subdirectories cannot be carried over and are refused.
    async fn foreign_files(outdir: &Path, names: &OutputNames) -> Result<Vec<PathBuf>> {
        let mut foreign = Vec::new();
        let mut entries = match fs::read_dir(outdir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(foreign),
            Err(e) => return Err(HostpackError::write(outdir, e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| HostpackError::write(outdir, e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| HostpackError::write(&path, e))?;
            if file_type.is_dir() {
                return Err(HostpackError::config(format!(
                    "output directory {} contains subdirectory {}; refusing to replace it",
                    outdir.display(),
                    entry.file_name().to_string_lossy()
                )));
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !names.contains(&name) {
                foreign.push(path);
            }
        }

        foreign.sort();
        Ok(foreign)
    }

    /// Where `swap_in` parks the previous output while the new one lands
    fn backup_path(outdir: &Path) -> PathBuf {
        let name = outdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        output_parent(outdir).join(format!("{}{}", BACKUP_PREFIX, name))
    }

    /// A run killed between the two renames of `swap_in` leaves the previous
    /// output under its backup name. Put it back, or drop it when a newer
    /// output directory already landed.
    async fn recover_backup(outdir: &Path) -> Result<()> {
        let backup = Self::backup_path(outdir);
        if !backup.is_dir() {
            return Ok(());
        }

        if outdir.exists() {
            Logger::warn(&format!("Removing stale backup {}", backup.display()));
            fs::remove_dir_all(&backup)
                .await
                .map_err(|e| HostpackError::write(&backup, e))
        } else {
            Logger::warn(&format!(
                "Restoring previous output from interrupted run at {}",
                backup.display()
            ));
            fs::rename(&backup, outdir)
                .await
                .map_err(|e| HostpackError::write(outdir, e))
        }
    }

    /// Move `staging` into place, keeping the previous directory until the
    /// new one has landed.
    async fn swap_in(staging: &Path, outdir: &Path) -> Result<()> {
        if !outdir.exists() {
            return fs::rename(staging, outdir)
                .await
                .map_err(|e| HostpackError::write(outdir, e));
        }

        let backup = Self::backup_path(outdir);

        fs::rename(outdir, &backup)
            .await
            .map_err(|e| HostpackError::write(outdir, e))?;

        if let Err(e) = fs::rename(staging, outdir).await {
            if let Err(restore) = fs::rename(&backup, outdir).await {
                Logger::error(&format!(
                    "Could not restore previous output from {}: {}",
                    backup.display(),
                    restore
                ));
            }
            return Err(HostpackError::write(outdir, e));
        }

        if let Err(e) = fs::remove_dir_all(&backup).await {
            Logger::warn(&format!("Could not remove {}: {}", backup.display(), e));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactAssembler for AtomicArtifactAssembler {
    async fn assemble(&self, input: &AssemblyInput, outdir: &Path, names: &OutputNames) -> Result<OutputSet> {
        Self::recover_backup(outdir).await?;

        serde_json::from_str::<serde_json::Value>(&input.manifest)
            .map_err(|e| HostpackError::config(format!("manifest is not valid JSON: {}", e)))?;

        if outdir.exists() && !outdir.is_dir() {
            return Err(HostpackError::config(format!(
                "output path {} exists and is not a directory",
                outdir.display()
            )));
        }

        let shell = Self::compose_shell(
            input.shell_template.as_deref(),
            &input.stylesheet,
            names.script_include_name(),
        );
        let wrapper = Self::compose_wrapper(&input.browser_script, &names.script_wrapper)?;
        let foreign = Self::foreign_files(outdir, names).await?;

        let parent = output_parent(outdir);
        self.fs.create_directory(&parent).await?;

        // Dropping the guard removes the staging directory on every early
        // return; after a successful swap the path no longer exists.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| HostpackError::write(&parent, e))?;

        let artifacts = [
            (names.shell.as_str(), shell.as_str()),
            (names.script_wrapper.as_str(), wrapper.as_str()),
            (names.host_script.as_str(), input.host_script.as_str()),
            (names.manifest.as_str(), input.manifest.as_str()),
        ];

        let mut files = Vec::with_capacity(artifacts.len());
        for (name, content) in artifacts {
            self.fs.write_file(&staging.path().join(name), content).await?;
            files.push(Self::describe(name, outdir.join(name), content));
        }

        for path in &foreign {
            if let Some(name) = path.file_name() {
                let target = staging.path().join(name);
                fs::copy(path, &target)
                    .await
                    .map_err(|e| HostpackError::write(&target, e))?;
            }
        }
        if !foreign.is_empty() {
            Logger::debug(&format!("Carried over {} foreign files", foreign.len()));
        }

        Self::swap_in(staging.path(), outdir).await?;

        for file in &files {
            Logger::artifact_written(&file.name, file.size);
        }

        Ok(OutputSet {
            directory: outdir.to_path_buf(),
            files,
        })
    }
}

#[derive(Clone, Copy)]
enum Placement {
    /// Before the first match of the fallback pattern
    Start,
    /// Before the last match of the fallback pattern
    End,
}

/// Replace `placeholder` with `content`, or insert it before the closing tag
/// matched by `fallback`, or append it.
fn output_parent(outdir: &Path) -> PathBuf {
    match outdir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn place(document: String, placeholder: &str, fallback: &Regex, content: &str, placement: Placement) -> String {
    if document.contains(placeholder) {
        return document.replacen(placeholder, content, 1);
    }

    let anchor = match placement {
        Placement::Start => fallback.find(&document),
        Placement::End => fallback.find_iter(&document).last(),
    };

    match anchor {
        Some(found) => {
            let at = found.start();
            format!("{}{}\n{}", &document[..at], content, &document[at..])
        }
        None => format!("{}\n{}\n", document.trim_end_matches('\n'), content),
    }
}
