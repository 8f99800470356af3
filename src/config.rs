//! Application configuration.
//!
//! A [`Config`] is assembled once at startup and passed by reference to every
//! component. Values are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`, default `./kw.toml` when present)
//! 3. a `.env` file in the working directory (loaded with `dotenvy`)
//! 4. the process environment
//!
//! ```toml
//! [openai]
//! model = "gpt-4-turbo-preview"
//! embedding_model = "text-embedding-3-small"
//!
//! [documents]
//! root = "/srv/company-docs"
//! max_file_size = 100000
//! exclude_globs = ["**/archive/**"]
//!
//! [chunking]
//! chunk_size = 1200
//! chunk_overlap = 150
//!
//! [store]
//! data_dir = "./data"
//! name = "vector_db"
//!
//! [retrieval]
//! k = 25
//!
//! [server]
//! port = 7860
//!
//! [logging]
//! dir = "./logs"
//! to_file = true
//! ```
//!
//! The API key is only read from the environment (`OPENAI_API_KEY`) or the
//! TOML file; it is required for every mode.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file picked up automatically when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "kw.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_chat_model(),
            embedding_model: default_embedding_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4-turbo-preview".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Files larger than this many bytes are skipped.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_file_size: default_max_file_size(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_max_file_size() -> u64 {
    100_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_chunk_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_store_name")]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            name: default_store_name(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_store_name() -> String {
    "vector_db".to_string()
}

impl StoreConfig {
    /// Directory holding the persisted index, keyed by the store name.
    pub fn dir(&self) -> PathBuf {
        self.data_dir.join(&self.name)
    }

    /// SQLite file inside [`StoreConfig::dir`].
    pub fn db_path(&self) -> PathBuf {
        self.dir().join("index.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    /// Question/answer turns kept in conversation history.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_k() -> usize {
    25
}
fn default_history_turns() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind on all interfaces instead of `host`.
    #[serde(default)]
    pub share: bool,
    /// Consecutive ports tried when `port` is taken.
    #[serde(default = "default_port_attempts")]
    pub port_attempts: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            share: false,
            port_attempts: default_port_attempts(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7860
}
fn default_port_attempts() -> u16 {
    10
}

impl ServerConfig {
    pub fn bind_host(&self) -> &str {
        if self.share {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for the daily log files.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Also write log lines to `dir`; stderr output is always on.
    #[serde(default = "default_true")]
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            to_file: true,
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_true() -> bool {
    true
}

impl LoggingConfig {
    /// Where file logging goes, or `None` when it is off.
    pub fn file_dir(&self) -> Option<&Path> {
        self.to_file.then_some(self.dir.as_path())
    }
}

impl Config {
    /// Returns the API key. Only valid after [`Config::validate`] succeeded.
    pub fn api_key(&self) -> &str {
        self.openai.api_key.as_deref().unwrap_or_default()
    }

    /// Builds a config from an optional TOML file and a variable lookup.
    ///
    /// `lookup` stands in for `std::env::var` so callers (and tests) can
    /// supply a synthetic environment.
    pub fn from_sources<F>(file: Option<&Path>, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content).with_context(|| "Failed to parse config file")?
            }
            None => Config::default(),
        };

        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_MODEL") {
            self.openai.model = v;
        }
        if let Some(v) = lookup("OPENAI_EMBEDDING_MODEL") {
            self.openai.embedding_model = v;
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = v.trim_end_matches('/').to_string();
        }
        set_parsed(lookup, "OPENAI_TEMPERATURE", &mut self.openai.temperature)?;
        set_parsed(lookup, "EMBEDDING_BATCH_SIZE", &mut self.openai.batch_size)?;
        set_parsed(lookup, "OPENAI_MAX_RETRIES", &mut self.openai.max_retries)?;
        set_parsed(lookup, "OPENAI_TIMEOUT_SECS", &mut self.openai.timeout_secs)?;

        if let Some(v) = lookup("BASE_PATH") {
            self.documents.root = PathBuf::from(v);
        }
        set_parsed(lookup, "MAX_FILE_SIZE", &mut self.documents.max_file_size)?;

        set_parsed(lookup, "CHUNK_SIZE", &mut self.chunking.chunk_size)?;
        set_parsed(lookup, "CHUNK_OVERLAP", &mut self.chunking.chunk_overlap)?;

        if let Some(v) = lookup("DATA_DIR") {
            self.store.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DB_NAME") {
            self.store.name = v;
        }

        set_parsed(lookup, "RETRIEVAL_K", &mut self.retrieval.k)?;
        set_parsed(lookup, "HISTORY_TURNS", &mut self.retrieval.history_turns)?;

        if let Some(v) = lookup("WEB_HOST") {
            self.server.host = v;
        }
        set_parsed(lookup, "WEB_PORT", &mut self.server.port)?;
        if let Some(v) = lookup("WEB_SHARE") {
            self.server.share = parse_bool("WEB_SHARE", &v)?;
        }

        if let Some(v) = lookup("LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOG_TO_FILE") {
            self.logging.to_file = parse_bool("LOG_TO_FILE", &v)?;
        }

        Ok(())
    }

    /// Checks the structural invariants every component relies on.
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.as_deref().map_or(true, str::is_empty) {
            bail!("OPENAI_API_KEY environment variable is required");
        }

        let root = &self.documents.root;
        if !root.exists() {
            bail!("BASE_PATH '{}' does not exist", root.display());
        }
        if !root.is_dir() {
            bail!("BASE_PATH '{}' is not a directory", root.display());
        }

        if self.chunking.chunk_size == 0 {
            bail!("CHUNK_SIZE must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.k == 0 {
            bail!("RETRIEVAL_K must be >= 1");
        }
        if self.openai.batch_size == 0 {
            bail!("EMBEDDING_BATCH_SIZE must be >= 1");
        }
        if self.store.name.trim().is_empty() {
            bail!("DB_NAME must not be empty");
        }

        Ok(())
    }
}

fn set_parsed<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: '{}' ({})", key, raw, e))?;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => bail!("invalid value for {}: '{}' (expected true or false)", key, raw),
    }
}

/// Loads the process configuration.
///
/// `path` is the `--config` argument. When it is `None`, `./kw.toml` is used
/// if it exists.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    dotenvy::dotenv().ok();

    let default_file = PathBuf::from(DEFAULT_CONFIG_FILE);
    let file = match path {
        Some(p) => Some(p),
        None if default_file.exists() => Some(default_file.as_path()),
        None => None,
    };

    Config::from_sources(file, |key| std::env::var(key).ok())
}
