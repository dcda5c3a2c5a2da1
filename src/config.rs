use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use crate::server::DEFAULT_ADDR;

/// Names the YAML file [`Config::load`] reads.
pub const CONFIG_ENV: &str = "GEMWIRE_CONFIG";

/// Overrides `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

pub const DEFAULT_CONFIG_PATH: &str = "gemwire.yaml";

/// Configuration of the `gemwire` binary.
///
/// ```yaml
/// server:
///   listen_addr: 0.0.0.0:1965
///   hosts: [example.com]
///   max_connections: 512
///   connection_timeout_secs: 30
/// tls:
///   cert_path: cert.pem
///   key_path: key.pem
/// pages:
///   /: pages/index.gmi
///   /about: pages/about.gmi
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub tls: TlsSettings,
    /// Route pattern to the file served under it.
    pub pages: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub hosts: Vec<String>,
    /// `0` for the default ceiling, negative for none.
    pub max_connections: isize,
    pub connection_timeout_secs: Option<u64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_ADDR.to_string(),
            hosts: Vec::new(),
            max_connections: 0,
            connection_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
        }
    }
}

impl Config {
    /// Loads from the process environment, see [`Config::load_with`].
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Reads the file named by `GEMWIRE_CONFIG`, or `gemwire.yaml` when it
    /// exists, then applies the `LISTEN` override. Without a file the
    /// defaults are used.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let explicit = env(CONFIG_ENV);
        let path = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_yaml(&text).with_context(|| format!("parsing {path}"))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound && explicit.is_none() => Self::default(),
            Err(e) => return Err(e).with_context(|| format!("reading {path}")),
        };

        if let Some(addr) = env(LISTEN_ENV) {
            cfg.server.listen_addr = addr;
        }

        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.server.connection_timeout_secs.map(Duration::from_secs)
    }
}
