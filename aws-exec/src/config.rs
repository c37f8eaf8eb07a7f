//! Configuration loading
//!
//! Config is searched in order:
//! 1. `AWS_EXEC_CONFIG` env var
//! 2. `./aws-exec.toml`
//! 3. `$XDG_CONFIG_HOME/aws-exec/config.toml`
//! 4. `~/.aws-exec.toml`
//! 5. Default config if none found

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::types::Config;

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AWS_EXEC_CONFIG";

impl Config {
    /// Load config from the standard locations, falling back to defaults
    pub fn load() -> Self {
        for path in Self::candidate_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_path(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }

        tracing::info!("Using default configuration");
        Config::default()
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if !path.exists() {
                tracing::warn!("{}={} does not exist", CONFIG_PATH_ENV, env_path);
            }
            paths.push(path);
        }

        paths.push(PathBuf::from("aws-exec.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("aws-exec").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".aws-exec.toml"));
        }

        paths
    }
}
