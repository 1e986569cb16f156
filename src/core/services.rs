use crate::core::{interfaces::*, models::*};
use crate::infrastructure::processors::class_scanner::CANDIDATE_EXTENSIONS;
use crate::infrastructure::{
    AtomicArtifactAssembler, LightningCssProcessor, ModuleMarkerStripper, NodeModuleResolver, OxcBundler,
    OxcMinifier, ScriptEscaper, TemplateDowngradePass, TokioFileSystemService,
};
use crate::utils::{HostpackError, Logger, Result, Timer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Runs the build: both bundles and the stylesheet concurrently, then the
/// rewrite passes, then the all-or-nothing write of the output set.
pub struct PipelineService {
    config: PipelineConfig,
    fs_service: Arc<dyn FileSystemService>,
    bundler: Arc<dyn BundlerService>,
    styles: Arc<dyn StyleExtractor>,
    assembler: Arc<dyn ArtifactAssembler>,
    browser_passes: Vec<Arc<dyn ScriptPass>>,
    host_passes: Vec<Arc<dyn ScriptPass>>,
    stage: PipelineStage,
}

impl PipelineService {
    pub fn new(
        config: PipelineConfig,
        fs_service: Arc<dyn FileSystemService>,
        bundler: Arc<dyn BundlerService>,
        styles: Arc<dyn StyleExtractor>,
        assembler: Arc<dyn ArtifactAssembler>,
    ) -> Self {
        Self {
            config,
            fs_service,
            bundler,
            styles,
            assembler,
            browser_passes: Vec::new(),
            host_passes: Vec::new(),
            stage: PipelineStage::Idle,
        }
    }

    /// The standard pipeline: oxc bundler, lightningcss styles, atomic
    /// assembler, and the browser passes `[minify], downgrade, escape` and
    /// host pass `strip`.
    pub fn from_config(config: PipelineConfig) -> Self {
        let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
        let bundler = Arc::new(OxcBundler::new(
            fs_service.clone(),
            Arc::new(NodeModuleResolver::new()),
            config.root.clone(),
            config.node_env.clone(),
        ));
        let styles = Arc::new(LightningCssProcessor::new(fs_service.clone()));
        let assembler = Arc::new(AtomicArtifactAssembler::new(fs_service.clone()));
        let minify = config.minify;

        let mut service = Self::new(config, fs_service, bundler, styles, assembler);
        if minify {
            service = service.with_browser_pass(Arc::new(OxcMinifier::new()));
        }
        service
            .with_browser_pass(Arc::new(TemplateDowngradePass::new()))
            .with_browser_pass(Arc::new(ScriptEscaper::new()))
            .with_host_pass(Arc::new(ModuleMarkerStripper::new()))
    }

    pub fn with_browser_pass(mut self, pass: Arc<dyn ScriptPass>) -> Self {
        self.browser_passes.push(pass);
        self
    }

    pub fn with_host_pass(mut self, pass: Arc<dyn ScriptPass>) -> Self {
        self.host_passes.push(pass);
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the browser passes, in application order
    pub fn browser_pass_names(&self) -> Vec<&'static str> {
        self.browser_passes.iter().map(|p| p.name()).collect()
    }

    /// Run the pipeline once. On failure the error carries the stage it was
    /// raised in and the output directory is left as it was.
    pub async fn run(&mut self) -> Result<BuildReport> {
        if self.stage != PipelineStage::Idle {
            return Err(HostpackError::config(format!(
                "pipeline already ran (state: {})",
                self.stage
            )));
        }

        Logger::pipeline_start(&self.config.root, &self.config.outdir);
        let started = Instant::now();

        match self.execute(started).await {
            Ok(report) => {
                self.advance(PipelineStage::Done)?;
                Ok(report)
            }
            Err(e) => {
                let failed_in = self.stage;
                self.stage = PipelineStage::Failed;
                Logger::error(&format!("{} stage failed: {}", failed_in, e));
                Err(e.in_stage(failed_in))
            }
        }
    }

    async fn execute(&mut self, started: Instant) -> Result<BuildReport> {
        self.advance(PipelineStage::Bundling)?;
        let (browser, host, stylesheet) = self.bundle_all().await?;

        self.advance(PipelineStage::Transforming)?;
        let browser_script = {
            let _timer = Timer::start("Browser passes");
            Self::apply_passes(&self.browser_passes, &browser)?
        };
        let host_script = {
            let _timer = Timer::start("Host passes");
            Self::apply_passes(&self.host_passes, &host)?
        };

        self.advance(PipelineStage::Assembling)?;
        let _timer = Timer::start("Assembling");
        let manifest = self.fs_service.read_file(&self.config.manifest).await.map_err(|e| {
            HostpackError::config(format!("cannot read manifest {}: {}", self.config.manifest.display(), e))
        })?;
        let shell_template = match &self.config.shell {
            Some(shell) => Some(self.fs_service.read_file(shell).await.map_err(|e| {
                HostpackError::config(format!("cannot read HTML shell {}: {}", shell.display(), e))
            })?),
            None => None,
        };

        let input = AssemblyInput {
            browser_script: browser_script.code,
            stylesheet: stylesheet.css,
            host_script: host_script.code,
            manifest,
            shell_template,
        };
        let output = self
            .assembler
            .assemble(&input, &self.config.outdir, &self.config.output_names)
            .await?;

        Ok(BuildReport {
            output,
            browser_modules: browser.modules.len(),
            host_modules: host.modules.len(),
            stylesheet_bytes: input.stylesheet.len(),
            build_time: started.elapsed(),
        })
    }

    /// Browser bundle, host bundle and stylesheet as three concurrent tasks
    async fn bundle_all(&self) -> Result<(Bundle, Bundle, StylesheetArtifact)> {
        let _timer = Timer::start("Bundling");

        let browser_unit = self.config.browser_unit();
        let host_unit = self.config.host_unit();
        let browser_entry = browser_unit.entry.clone();
        let host_entry = host_unit.entry.clone();

        let browser = Self::spawn_bundle(self.bundler.clone(), browser_unit);
        let host = Self::spawn_bundle(self.bundler.clone(), host_unit);

        let fs_service = self.fs_service.clone();
        let styles = self.styles.clone();
        let ui_root = self.config.ui_root.clone();
        let stylesheet = self.config.stylesheet.clone();
        let stylesheet_path = stylesheet.clone();
        let extraction: JoinHandle<Result<StylesheetArtifact>> = tokio::spawn(async move {
            let ui_files = fs_service.scan_tree(&ui_root, CANDIDATE_EXTENSIONS).await?;
            Logger::debug(&format!("Scanning {} UI files for class names", ui_files.len()));
            styles.extract(&stylesheet, &ui_files).await
        });

        tokio::try_join!(
            Self::joined(browser, browser_entry),
            Self::joined(host, host_entry),
            Self::joined(extraction, stylesheet_path),
        )
    }

    fn spawn_bundle(bundler: Arc<dyn BundlerService>, unit: SourceUnit) -> JoinHandle<Result<Bundle>> {
        tokio::spawn(async move { bundler.bundle(&unit).await })
    }

    async fn joined<T>(handle: JoinHandle<Result<T>>, origin: PathBuf) -> Result<T> {
        handle
            .await
            .map_err(|e| HostpackError::bundle(&origin, format!("bundling task failed: {}", e)))?
    }

    fn apply_passes(passes: &[Arc<dyn ScriptPass>], bundle: &Bundle) -> Result<ProcessedScript> {
        let mut code = bundle.code.clone();
        for pass in passes {
            let before = code.len();
            code = pass.apply(&code, &bundle.entry)?;
            Logger::pass_applied(pass.name(), &bundle.entry, before, code.len());
        }

        Ok(ProcessedScript {
            origin: bundle.entry.clone(),
            mode: bundle.mode,
            code,
        })
    }

    fn advance(&mut self, next: PipelineStage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(HostpackError::config(format!(
                "illegal pipeline transition {} -> {}",
                self.stage, next
            )));
        }
        self.stage = next;
        if !next.is_terminal() {
            Logger::stage(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBundler {
        fail_host: bool,
    }

    #[async_trait::async_trait]
    impl BundlerService for FixedBundler {
        async fn bundle(&self, unit: &SourceUnit) -> Result<Bundle> {
            if self.fail_host && unit.mode == TargetMode::HostScript {
                return Err(HostpackError::bundle(&unit.entry, "cannot resolve './missing'"));
            }
            let code = match unit.mode {
                TargetMode::Browser => "(function () { var u = `https://${host}`; })();",
                TargetMode::HostScript => "export function apiGet() { return 1; }\n",
            };
            Ok(Bundle {
                entry: unit.entry.clone(),
                mode: unit.mode,
                code: code.to_string(),
                modules: vec![unit.entry.clone()],
            })
        }
    }

    struct FixedStyles;

    #[async_trait::async_trait]
    impl StyleExtractor for FixedStyles {
        async fn extract(&self, _stylesheet: &Path, _ui_files: &[PathBuf]) -> Result<StylesheetArtifact> {
            Ok(StylesheetArtifact {
                css: ".a{color:red}".to_string(),
                candidate_tokens: 1,
                generated_rules: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingAssembler {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ArtifactAssembler for RecordingAssembler {
        async fn assemble(&self, input: &AssemblyInput, outdir: &Path, _names: &OutputNames) -> Result<OutputSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!input.browser_script.contains('`'));
            assert!(!input.host_script.contains("export"));
            Ok(OutputSet {
                directory: outdir.to_path_buf(),
                files: Vec::new(),
            })
        }
    }

    fn project() -> (tempfile::TempDir, PipelineConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/ui")).unwrap();
        std::fs::write(dir.path().join("appsscript.json"), "{}").unwrap();
        let config = PipelineConfig::for_root(dir.path());
        (dir, config)
    }

    fn service(config: PipelineConfig, fail_host: bool, assembler: Arc<RecordingAssembler>) -> PipelineService {
        PipelineService::new(
            config,
            Arc::new(TokioFileSystemService),
            Arc::new(FixedBundler { fail_host }),
            Arc::new(FixedStyles),
            assembler,
        )
        .with_browser_pass(Arc::new(TemplateDowngradePass::new()))
        .with_browser_pass(Arc::new(ScriptEscaper::new()))
        .with_host_pass(Arc::new(ModuleMarkerStripper::new()))
    }

    #[tokio::test]
    async fn test_successful_run_reaches_done() {
        let (_dir, config) = project();
        let assembler = Arc::new(RecordingAssembler::default());
        let mut pipeline = service(config, false, assembler.clone());

        let report = pipeline.run().await.unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Done);
        assert_eq!(assembler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.browser_modules, 1);
        assert_eq!(report.stylesheet_bytes, ".a{color:red}".len());
    }

    #[tokio::test]
    async fn test_bundle_failure_stops_before_assembling() {
        let (_dir, config) = project();
        let assembler = Arc::new(RecordingAssembler::default());
        let mut pipeline = service(config, true, assembler.clone());

        let err = pipeline.run().await.unwrap_err();

        assert_eq!(pipeline.stage(), PipelineStage::Failed);
        assert_eq!(err.stage(), Some(PipelineStage::Bundling));
        assert_eq!(err.kind(), "BundleError");
        assert_eq!(assembler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pipeline_runs_once() {
        let (_dir, config) = project();
        let mut pipeline = service(config, false, Arc::new(RecordingAssembler::default()));
        pipeline.run().await.unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn test_standard_browser_pass_order() {
        let mut config = PipelineConfig::for_root("/project");
        assert_eq!(
            PipelineService::from_config(config.clone()).browser_pass_names(),
            vec!["syntax-downgrade", "escape"]
        );

        config.minify = true;
        assert_eq!(
            PipelineService::from_config(config).browser_pass_names(),
            vec!["minify", "syntax-downgrade", "escape"]
        );
    }
}
