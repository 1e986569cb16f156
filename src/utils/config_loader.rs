use crate::core::models::{OutputNames, PipelineConfig};
use crate::utils::{HostpackError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "hostpack.config.json";

/// Configuration file format (hostpack.config.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostpackConfig {
    /// Browser entry module (e.g. "src/ui/main.tsx")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_entry: Option<String>,

    /// Directory scanned for class usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_root: Option<String>,

    /// Stylesheet entry (.css, .scss or .sass)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stylesheet: Option<String>,

    /// Static HTML shell; a built-in shell is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Server entry module whose exports become host globals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_entry: Option<String>,

    /// Manifest copied verbatim into the output set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,

    /// Output directory (default: "dist")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdir: Option<String>,

    /// Minify the browser bundle (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    /// Value of process.env.NODE_ENV in the browser bundle (default: "production")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_names: Option<OutputNamesConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputNamesConfig {
    pub shell: Option<String>,
    pub script_wrapper: Option<String>,
    pub host_script: Option<String>,
    pub manifest: Option<String>,
}

/// Values given on the command line; they win over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub outdir: Option<String>,
    pub minify: Option<bool>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `hostpack.config.json` from the project root if it exists
    pub fn load_from_file(root: &Path) -> Result<Option<HostpackConfig>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Self::load_from_path(&config_path).map(Some)
    }

    /// Load an explicitly named config file; a missing file is an error
    pub fn load_from_path(config_path: &Path) -> Result<HostpackConfig> {
        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            HostpackError::config(format!("cannot read {}: {}", config_path.display(), e))
        })?;

        let config: HostpackConfig = serde_json::from_str(&content).map_err(|e| {
            HostpackError::config(format!("failed to parse {}: {}", config_path.display(), e))
        })?;

        Ok(config)
    }

    /// Merge file config with CLI arguments (CLI > config file > defaults).
    /// Relative paths resolve against `root`.
    pub fn resolve(
        file_config: Option<HostpackConfig>,
        root: PathBuf,
        overrides: CliOverrides,
    ) -> Result<PipelineConfig> {
        let file = file_config.unwrap_or_default();
        let defaults = PipelineConfig::for_root(&root);

        let join = |value: Option<String>, fallback: PathBuf| -> PathBuf {
            match value {
                Some(v) if Path::new(&v).is_absolute() => PathBuf::from(v),
                Some(v) => root.join(v),
                None => fallback,
            }
        };

        let names = file.output_names.unwrap_or_default();
        let default_names = OutputNames::default();
        let output_names = OutputNames {
            shell: names.shell.unwrap_or(default_names.shell),
            script_wrapper: names.script_wrapper.unwrap_or(default_names.script_wrapper),
            host_script: names.host_script.unwrap_or(default_names.host_script),
            manifest: names.manifest.unwrap_or(default_names.manifest),
        };
        Self::validate_names(&output_names)?;

        Ok(PipelineConfig {
            ui_entry: join(file.ui_entry, defaults.ui_entry),
            ui_root: join(file.ui_root, defaults.ui_root),
            stylesheet: join(file.stylesheet, defaults.stylesheet),
            shell: file.shell.map(|s| join(Some(s), PathBuf::new())),
            server_entry: join(file.server_entry, defaults.server_entry),
            manifest: join(file.manifest, defaults.manifest),
            outdir: join(overrides.outdir.or(file.outdir), defaults.outdir),
            minify: overrides.minify.or(file.minify).unwrap_or(defaults.minify),
            node_env: file.node_env.unwrap_or(defaults.node_env),
            output_names,
            root,
        })
    }

    fn validate_names(names: &OutputNames) -> Result<()> {
        let all = names.all();
        for (i, name) in all.iter().enumerate() {
            if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
                return Err(HostpackError::config(format!(
                    "output name '{}' must be a plain, non-hidden file name",
                    name
                )));
            }
            if all[..i].contains(name) {
                return Err(HostpackError::config(format!(
                    "output name '{}' is used for more than one artifact",
                    name
                )));
            }
        }
        if !names.script_wrapper.ends_with(".html") {
            return Err(HostpackError::config(format!(
                "script wrapper '{}' must be an .html file to be includable",
                names.script_wrapper
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let loaded = ConfigLoader::load_from_file(dir.path()).unwrap();
        assert!(loaded.is_none());

        let config = ConfigLoader::resolve(loaded, dir.path().to_path_buf(), CliOverrides::default()).unwrap();
        assert_eq!(config.outdir, dir.path().join("dist"));
        assert_eq!(config.ui_entry, dir.path().join("src/ui/main.tsx"));
        assert_eq!(config.node_env, "production");
        assert!(!config.minify);
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "outdir": "build", "minify": false, "serverEntry": "server/index.js",
                 "outputNames": { "hostScript": "Code.gs" } }"#,
        )
        .unwrap();

        let file = ConfigLoader::load_from_file(dir.path()).unwrap();
        let config = ConfigLoader::resolve(
            file,
            dir.path().to_path_buf(),
            CliOverrides {
                outdir: Some("out".to_string()),
                minify: Some(true),
            },
        )
        .unwrap();

        assert_eq!(config.outdir, dir.path().join("out"));
        assert!(config.minify);
        assert_eq!(config.server_entry, dir.path().join("server/index.js"));
        assert_eq!(config.output_names.host_script, "Code.gs");
        assert_eq!(config.output_names.shell, "index.html");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{ "outDirectory": "x" }"#).unwrap();

        let err = ConfigLoader::load_from_file(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn test_duplicate_output_names_are_rejected() {
        let dir = tempdir().unwrap();
        let file = HostpackConfig {
            output_names: Some(OutputNamesConfig {
                host_script: Some("index.html".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = ConfigLoader::resolve(Some(file), dir.path().to_path_buf(), CliOverrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("more than one artifact"));
    }
}
