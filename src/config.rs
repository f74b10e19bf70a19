use anyhow::Context;
use serde::Deserialize;

use crate::proxy::relay::DEFAULT_CHUNK_SIZE;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "RAWHTTP_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the server binds to
    pub listen_addr: String,
    /// Base URL that `/httpbin/...` targets are forwarded to
    pub upstream_url: String,
    /// Maximum bytes read from upstream per relayed chunk
    pub relay_chunk_size: usize,
    pub upstream_connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:42069".to_string(),
            upstream_url: "http://httpbin.org/".to_string(),
            relay_chunk_size: DEFAULT_CHUNK_SIZE,
            upstream_connect_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Loads the file named by `RAWHTTP_CONFIG` if set, then applies the
    /// `LISTEN` and `UPSTREAM` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {path}"))?;
                Self::from_yaml(&raw)?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }
        if let Ok(upstream_url) = std::env::var("UPSTREAM") {
            cfg.upstream_url = upstream_url;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw).context("Invalid config file")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.relay_chunk_size == 0 {
            anyhow::bail!("relay_chunk_size must be greater than zero");
        }
        Ok(())
    }
}
