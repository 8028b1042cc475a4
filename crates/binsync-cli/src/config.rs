use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use binsync_config::SourceConfig;

/// Project configuration from binsync.toml
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub state: StateConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,
}

fn default_stream_prefix() -> String {
    "binsync:events".to_string()
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ProjectConfig =
            toml::from_str(&content).with_context(|| "Failed to parse binsync.toml")?;

        Ok(config)
    }

    /// Resolve environment variables in a string.
    /// Supports ${VAR_NAME} syntax.
    pub fn resolve_env(&self, s: &str) -> String {
        let mut result = s.to_string();

        // Find all ${...} patterns
        while let Some(start) = result.find("${") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 2..start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
            } else {
                break;
            }
        }

        result
    }

    /// Get the resolved position store path.
    pub fn state_path(&self) -> String {
        self.resolve_env(&self.state.path)
    }

    /// Get the resolved queue URL.
    pub fn queue_url(&self) -> String {
        self.resolve_env(&self.queue.url)
    }

    /// Get a source's resolved password, if one is configured.
    pub fn source_password(&self, source: &SourceConfig) -> Option<String> {
        source.password.as_ref().map(|p| self.resolve_env(p))
    }

    /// Find the source to run: by name, or the only one configured.
    pub fn find_source(&self, name: Option<&str>) -> Result<&SourceConfig> {
        match name {
            Some(name) => self
                .sources
                .iter()
                .find(|s| s.name == name)
                .with_context(|| format!("source `{}` not found in config", name)),
            None => match self.sources.len() {
                0 => anyhow::bail!("no sources configured"),
                1 => Ok(&self.sources[0]),
                _ => anyhow::bail!("multiple sources configured, pass --source <name>"),
            },
        }
    }
}
