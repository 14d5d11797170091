use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TARGETED_CHANNEL: &str = "mail";

/// Optional `digest.toml` settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Default log filter when neither `RUST_LOG` nor a flag overrides it
    #[serde(default)]
    pub log_level: Option<String>,

    /// Channel reported for targeted keys
    #[serde(default = "default_targeted_channel")]
    pub targeted_channel: String,

    /// Channel slugs accepted when decoding generic keys
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            targeted_channel: default_targeted_channel(),
            channels: Vec::new(),
        }
    }
}

fn default_targeted_channel() -> String {
    DEFAULT_TARGETED_CHANNEL.to_string()
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.targeted_channel.trim().is_empty() {
            anyhow::bail!("targeted_channel must not be empty");
        }
        if let Some(slug) = self.channels.iter().find(|slug| slug.contains(':')) {
            anyhow::bail!("channel slug '{slug}' must not contain ':'");
        }
        Ok(())
    }
}
