use crate::core::models::{PipelineStage, TargetMode};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` overrides the default filter.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("hostpack=info"));

        // A second init (tests, embedding) keeps the first subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn pipeline_start(root: &Path, outdir: &Path) {
        info!("📦 hostpack build");
        info!("📁 Root: {}", root.display());
        info!("📤 Output: {}", outdir.display());
    }

    pub fn stage(stage: PipelineStage) {
        info!("▶ {}", stage);
    }

    pub fn bundling(entry: &Path, mode: TargetMode) {
        info!("🔗 Bundling {} ({})", entry.display(), mode);
    }

    pub fn module_resolved(specifier: &str, from: &Path, resolved: &Path) {
        debug!("Resolved '{}' from {} to {}", specifier, from.display(), resolved.display());
    }

    pub fn bundle_complete(entry: &Path, modules: usize, bytes: usize) {
        info!("✅ {}: {} modules, {} bytes", entry.display(), modules, bytes);
    }

    pub fn styles_extracted(candidates: usize, generated: usize, bytes: usize) {
        info!(
            "🎨 Styles: {} candidate tokens, {} generated utility rules, {} bytes",
            candidates, generated, bytes
        );
    }

    pub fn pass_applied(pass: &str, origin: &Path, before: usize, after: usize) {
        debug!("✏️  {} on {}: {} → {} bytes", pass, origin.display(), before, after);
    }

    pub fn artifact_written(name: &str, size: usize) {
        debug!("💾 Wrote {} ({} bytes)", name, size);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
