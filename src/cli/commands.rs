use crate::core::services::PipelineService;
use crate::core::models::PipelineConfig;
use crate::utils::{BuildUI, CliOverrides, ConfigLoader, Logger, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hostpack")]
#[command(about = "Bundle a module-based web app into the flat files a managed script host accepts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the output set
    Build {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Output directory (overrides the config file)
        #[arg(short, long)]
        outdir: Option<String>,
        /// Minify the browser bundle
        #[arg(long)]
        minify: bool,
        /// Config file to use instead of <root>/hostpack.config.json
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the resolved configuration as JSON
    Config {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        root: String,
    },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        Logger::init();

        let cli = Cli::parse();

        match cli.command {
            Commands::Build {
                root,
                outdir,
                minify,
                config,
            } => {
                let overrides = CliOverrides {
                    outdir,
                    // A bare flag can only switch minification on
                    minify: minify.then_some(true),
                };
                self.handle_build_command(Path::new(&root), config.as_deref().map(Path::new), overrides)
                    .await
            }
            Commands::Config { root } => self.handle_config_command(Path::new(&root)),
        }
    }

    /// Load the config file (explicit or from the root) and merge the CLI overrides
    pub fn load_config(root: &Path, config_file: Option<&Path>, overrides: CliOverrides) -> Result<PipelineConfig> {
        let file = match config_file {
            Some(path) => Some(ConfigLoader::load_from_path(path)?),
            None => ConfigLoader::load_from_file(root)?,
        };
        ConfigLoader::resolve(file, PathBuf::from(root), overrides)
    }

    async fn handle_build_command(
        &self,
        root: &Path,
        config_file: Option<&Path>,
        overrides: CliOverrides,
    ) -> Result<()> {
        let ui = BuildUI::new();
        ui.show_banner();

        let config = Self::load_config(root, config_file, overrides)?;
        let mut pipeline = PipelineService::from_config(config);
        let report = pipeline.run().await?;

        ui.show_completion(&report);
        Ok(())
    }

    fn handle_config_command(&self, root: &Path) -> Result<()> {
        let config = Self::load_config(root, None, CliOverrides::default())?;
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| crate::utils::HostpackError::config(format!("cannot serialize config: {}", e)))?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
