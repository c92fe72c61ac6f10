//! Layered configuration: TOML file + `RAGCORE_*` environment overrides,
//! following the teacher's `config.rs` pattern (nested sections, per-field
//! `#[serde(default = "fn")]`, a matching `impl Default`, small `env_*!`
//! macros applying overrides after the file loads).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub token_budget: TokenBudgetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            token_budget: TokenBudgetConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Selects the embedded backend (`"rocksdb"`) vs. the in-memory test
    /// backend (`"memory"`). The MySQL-compatible server backend is a second
    /// trait implementation stub, not a runtime-selectable option here.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
    #[serde(default = "default_cache_size_mb")]
    pub cache_size_mb: usize,
    #[serde(default = "default_mmap_size_mb")]
    pub mmap_size_mb: usize,
    #[serde(default = "default_true")]
    pub wal_enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_rrf_constant")]
    pub rrf_constant: f64,
    #[serde(default = "default_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_weight")]
    pub text_weight: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            extension: default_extension(),
            vector_size: default_vector_size(),
            cache_size_mb: default_cache_size_mb(),
            mmap_size_mb: default_mmap_size_mb(),
            wal_enabled: true,
            timeout_secs: default_timeout_secs(),
            rrf_constant: default_rrf_constant(),
            vector_weight: default_weight(),
            text_weight: default_weight(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    default_data_dir().join("ragcore.db")
}
fn default_extension() -> String {
    "rocksdb".to_string()
}
fn default_vector_size() -> usize {
    1536
}
fn default_cache_size_mb() -> usize {
    256
}
fn default_mmap_size_mb() -> usize {
    512
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_rrf_constant() -> f64 {
    crate::store::rrf::DEFAULT_RRF_CONSTANT
}
fn default_weight() -> f64 {
    crate::store::rrf::DEFAULT_WEIGHT
}
fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ragcore")
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// `"http"` (the remote provider collaborator of spec §6) or `"fallback"`
    /// (primary + fallback chain — `endpoint`/`fallback_endpoint` both set).
    #[serde(default = "default_provider_kind")]
    pub provider_kind: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub fallback_endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vector_size")]
    pub dimension: usize,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_kind: default_provider_kind(),
            model: default_model(),
            endpoint: default_endpoint(),
            fallback_endpoint: None,
            api_key: None,
            dimension: default_vector_size(),
            cache_max_size: default_cache_max_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_provider_kind() -> String {
    "http".to_string()
}
fn default_model() -> String {
    "text-embedding".to_string()
}
fn default_endpoint() -> String {
    "http://localhost:11434/api/embeddings".to_string()
}
fn default_cache_max_size() -> usize {
    crate::cache::DEFAULT_CAPACITY
}
fn default_cache_ttl_secs() -> i64 {
    crate::cache::DEFAULT_TTL_SECS
}

// ---------------------------------------------------------------------------
// Token budget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenBudgetConfig {
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self { total_tokens: default_total_tokens(), safety_margin: default_safety_margin() }
    }
}

fn default_total_tokens() -> usize {
    8192
}
fn default_safety_margin() -> f64 {
    0.05
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loading + environment overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply `RAGCORE_*`
    /// environment variable overrides. Missing files fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                }
            };
        }
        macro_rules! env_opt_str {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                }
            };
        }
        macro_rules! env_parse {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                    }
                }
            };
        }
        macro_rules! env_path {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                }
            };
        }

        env_path!("RAGCORE_STORAGE_PATH", self.storage.path);
        env_str!("RAGCORE_STORAGE_EXTENSION", self.storage.extension);
        env_parse!("RAGCORE_STORAGE_VECTOR_SIZE", self.storage.vector_size);
        env_parse!("RAGCORE_STORAGE_CACHE_SIZE_MB", self.storage.cache_size_mb);
        env_parse!("RAGCORE_STORAGE_MMAP_SIZE_MB", self.storage.mmap_size_mb);
        env_parse!("RAGCORE_STORAGE_WAL_ENABLED", self.storage.wal_enabled);
        env_parse!("RAGCORE_STORAGE_TIMEOUT_SECS", self.storage.timeout_secs);
        env_parse!("RAGCORE_STORAGE_RRF_CONSTANT", self.storage.rrf_constant);
        env_parse!("RAGCORE_STORAGE_VECTOR_WEIGHT", self.storage.vector_weight);
        env_parse!("RAGCORE_STORAGE_TEXT_WEIGHT", self.storage.text_weight);

        env_str!("RAGCORE_EMBEDDING_PROVIDER_KIND", self.embedding.provider_kind);
        env_str!("RAGCORE_EMBEDDING_MODEL", self.embedding.model);
        env_str!("RAGCORE_EMBEDDING_ENDPOINT", self.embedding.endpoint);
        env_opt_str!("RAGCORE_EMBEDDING_FALLBACK_ENDPOINT", self.embedding.fallback_endpoint);
        env_opt_str!("RAGCORE_EMBEDDING_API_KEY", self.embedding.api_key);
        env_parse!("RAGCORE_EMBEDDING_DIMENSION", self.embedding.dimension);
        env_parse!("RAGCORE_EMBEDDING_CACHE_MAX_SIZE", self.embedding.cache_max_size);
        env_parse!("RAGCORE_EMBEDDING_CACHE_TTL_SECS", self.embedding.cache_ttl_secs);

        env_parse!("RAGCORE_TOKEN_BUDGET_TOTAL_TOKENS", self.token_budget.total_tokens);
        env_parse!("RAGCORE_TOKEN_BUDGET_SAFETY_MARGIN", self.token_budget.safety_margin);

        env_str!("RAGCORE_LOG_LEVEL", self.logging.level);
        env_parse!("RAGCORE_LOG_JSON", self.logging.json);
    }
}
