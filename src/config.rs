//! Configuration parsing and validation.
//!
//! paper-intake is configured via a TOML file (default
//! `./config/intake.toml`, or the path in `INTAKE_CONFIG`). Each deployment
//! environment keeps its own file; nothing secret is written into it. The
//! optional API token is named by environment variable and resolved once,
//! when the config is loaded.
//!
//! ```toml
//! [db]
//! path = "./data/intake.sqlite"
//!
//! [detection]
//! high_threshold = 90
//! low_threshold = 40
//!
//! [replace]
//! strategy = "delete-then-insert"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! api_token_env = "INTAKE_API_TOKEN"
//! ```

use anyhow::{bail, Context, Result};
use paper_intake_core::replace::ReplaceStrategy;
use paper_intake_core::similarity::ScoringPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub detection: ScoringPolicy,
    #[serde(default)]
    pub replace: ReplaceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReplaceConfig {
    #[serde(default)]
    pub strategy: ReplaceStrategy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Name of the environment variable holding the bearer token.
    #[serde(default)]
    pub api_token_env: Option<String>,
    /// Resolved from `api_token_env` by [`load_config`]; never read from TOML.
    #[serde(skip)]
    pub api_token: Option<String>,
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Config {
    /// Checks invariants and resolves the API token from the environment.
    pub fn finalize(mut self) -> Result<Self> {
        self.detection
            .validate()
            .context("invalid [detection] section")?;

        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be > 0");
        }

        if let Some(ref var) = self.server.api_token_env {
            let token = std::env::var(var)
                .with_context(|| format!("server.api_token_env names unset variable '{}'", var))?;
            if token.trim().is_empty() {
                bail!("environment variable '{}' is empty", var);
            }
            self.server.api_token = Some(token);
        }

        Ok(self)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.finalize()
}
