//! Language plugin registry.
//!
//! Runners are installed under `<installation prefix>/plugins/<language>/
//! <version>/` with a `runner.json` descriptor naming the command to spawn
//! and the plugin's library directory. The project's `manifest.json` names
//! the language the project is written in.

use std::path::PathBuf;

use eyre::{Result, WrapErr, bail, eyre};
use serde::Deserialize;

use crate::config::{GaugeConfig, INSTALLATION_PREFIX_ENV};

/// The project manifest at the project root.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// The language whose runner executes this project's steps.
    pub language: String,
}

/// A runner plugin's `runner.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerDescriptor {
    pub id: String,
    pub version: String,
    /// Command line used to launch the runner, program first.
    pub command: Vec<String>,
    /// Library directory relative to the plugin's install dir.
    #[serde(default)]
    pub lib: String,
}

/// Load the project manifest.
pub fn project_manifest(config: &GaugeConfig) -> Result<Manifest> {
    let path = config.manifest_path();
    let content = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("failed to read project manifest {}", path.display()))?;
    serde_json::from_str(&content)
        .wrap_err_with(|| format!("malformed project manifest {}", path.display()))
}

/// The installation prefix, from the config or the environment.
pub fn installation_prefix(config: &GaugeConfig) -> Result<PathBuf> {
    config
        .installation_prefix
        .clone()
        .ok_or_else(|| eyre!("{INSTALLATION_PREFIX_ENV} is not set"))
}

/// The install directory of a language's runner: the latest version
/// installed under `plugins/<language>/`.
pub fn runner_install_dir(config: &GaugeConfig, language: &str) -> Result<PathBuf> {
    let plugin_dir = installation_prefix(config)?.join("plugins").join(language);
    let mut versions: Vec<PathBuf> = std::fs::read_dir(&plugin_dir)
        .wrap_err_with(|| format!("no runner installed for language '{language}'"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    versions.sort();
    versions
        .pop()
        .ok_or_else(|| eyre!("no versions installed under {}", plugin_dir.display()))
}

/// Load the runner descriptor for a language.
pub fn runner_descriptor(config: &GaugeConfig, language: &str) -> Result<RunnerDescriptor> {
    let dir = runner_install_dir(config, language)?;
    let path = dir.join("runner.json");
    let content = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("failed to read runner descriptor {}", path.display()))?;
    let descriptor: RunnerDescriptor = serde_json::from_str(&content)
        .wrap_err_with(|| format!("malformed runner descriptor {}", path.display()))?;
    if descriptor.command.is_empty() {
        bail!("runner descriptor {} has an empty command", path.display());
    }
    Ok(descriptor)
}

/// Absolute path of a language runner's library directory, as served to
/// editor plugins.
pub fn language_lib_path(config: &GaugeConfig, language: &str) -> Result<PathBuf> {
    let dir = runner_install_dir(config, language)?;
    let descriptor = runner_descriptor(config, language)?;
    Ok(dir.join(descriptor.lib))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config_with_prefix(prefix: &Path) -> GaugeConfig {
        let mut config = GaugeConfig::for_project_root(prefix.to_path_buf());
        config.installation_prefix = Some(prefix.to_path_buf());
        config
    }

    #[test]
    fn picks_the_latest_installed_version() {
        let temp = tempfile::tempdir().unwrap();
        let plugin = temp.path().join("plugins/js");
        std::fs::create_dir_all(plugin.join("0.9.0")).unwrap();
        std::fs::create_dir_all(plugin.join("1.2.0")).unwrap();
        let config = config_with_prefix(temp.path());

        let dir = runner_install_dir(&config, "js").unwrap();
        assert!(dir.ends_with("plugins/js/1.2.0"));
    }

    #[test]
    fn lib_path_joins_descriptor_lib() {
        let temp = tempfile::tempdir().unwrap();
        let install = temp.path().join("plugins/js/1.0.0");
        std::fs::create_dir_all(&install).unwrap();
        std::fs::write(
            install.join("runner.json"),
            r#"{"id":"js","version":"1.0.0","command":["node","runner.js"],"lib":"lib"}"#,
        )
        .unwrap();
        let config = config_with_prefix(temp.path());

        let lib = language_lib_path(&config, "js").unwrap();
        assert!(lib.ends_with("plugins/js/1.0.0/lib"));
    }

    #[test]
    fn missing_language_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_with_prefix(temp.path());
        assert!(runner_install_dir(&config, "cobol").is_err());
    }
}
