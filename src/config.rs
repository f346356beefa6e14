//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so a config file
//! only needs to name what differs. [`load_config`] parses and validates;
//! [`Config::minimal`] gives a valid in-memory config for tests.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mailsift_core::index::Metric;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub db: Option<DbConfig>,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    /// `"imap"` or `"eml_dir"`.
    #[serde(default = "default_mailbox_kind")]
    pub kind: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Falls back to the `IMAP_EMAIL` environment variable.
    #[serde(default)]
    pub username: Option<String>,
    /// Name of the environment variable holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Root directory for `kind = "eml_dir"`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,
    /// Outer bound on any single mailbox operation.
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            kind: default_mailbox_kind(),
            host: default_host(),
            port: default_port(),
            username: None,
            password_env: default_password_env(),
            folder: default_folder(),
            root: None,
            connect_timeout_secs: default_connect_timeout(),
            io_timeout_secs: default_io_timeout(),
            op_timeout_secs: default_op_timeout(),
        }
    }
}

fn default_mailbox_kind() -> String {
    "imap".to_string()
}
fn default_host() -> String {
    "imap.gmail.com".to_string()
}
fn default_port() -> u16 {
    993
}
fn default_password_env() -> String {
    "IMAP_PASSWORD".to_string()
}
fn default_folder() -> String {
    "INBOX".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_io_timeout() -> u64 {
    30
}
fn default_op_timeout() -> u64 {
    120
}

impl MailboxConfig {
    pub fn resolve_username(&self) -> Result<String> {
        match &self.username {
            Some(u) if !u.is_empty() => Ok(u.clone()),
            _ => std::env::var("IMAP_EMAIL")
                .context("mailbox.username not set and IMAP_EMAIL environment variable missing"),
        }
    }

    pub fn resolve_password(&self) -> Result<String> {
        std::env::var(&self.password_env).with_context(|| {
            format!("{} environment variable not set", self.password_env)
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    mailsift_core::normalize::DEFAULT_MAX_CHUNK_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Messages fetched per `sync_batch`.
    #[serde(default = "default_sync_batch_size")]
    pub batch_size: usize,
    /// Period of the background sync task in `serve`.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Whether `serve` runs the background sync task.
    #[serde(default = "default_background")]
    pub background: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_sync_batch_size(),
            interval_secs: default_interval_secs(),
            background: default_background(),
        }
    }
}

fn default_sync_batch_size() -> usize {
    10
}
fn default_interval_secs() -> u64 {
    300
}
fn default_background() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    /// `"cosine"` or `"euclidean"`.
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            metric: default_metric(),
        }
    }
}

fn default_index_backend() -> String {
    "memory".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}

impl IndexConfig {
    pub fn metric(&self) -> Result<Metric> {
        Metric::parse(&self.metric)
    }
}

/// SQLite database. Required by the `sqlite` index backend, which also
/// persists sync state there.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// All defaults: IMAP mailbox, disabled embeddings, in-memory index.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        match self.mailbox.kind.as_str() {
            "imap" => {
                if self.mailbox.host.is_empty() {
                    bail!("mailbox.host must not be empty");
                }
            }
            "eml_dir" => {
                if self.mailbox.root.is_none() {
                    bail!("mailbox.root is required when mailbox.kind = 'eml_dir'");
                }
            }
            other => bail!(
                "Unknown mailbox kind: '{}'. Must be imap or eml_dir.",
                other
            ),
        }
        if self.mailbox.op_timeout_secs == 0 {
            bail!("mailbox.op_timeout_secs must be > 0");
        }

        if !(100..=8000).contains(&self.normalize.max_chunk_chars) {
            bail!("normalize.max_chunk_chars must be in [100, 8000]");
        }

        if self.sync.batch_size == 0 {
            bail!("sync.batch_size must be > 0");
        }
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" | "hash" => {}
            "openai" | "ollama" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.index.backend.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.db.is_none() {
                    bail!("[db] path is required when index.backend = 'sqlite'");
                }
            }
            other => bail!(
                "Unknown index backend: '{}'. Must be memory or sqlite.",
                other
            ),
        }
        self.index.metric()?;

        if self.retrieval.default_top_k < 1 {
            bail!("retrieval.default_top_k must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
