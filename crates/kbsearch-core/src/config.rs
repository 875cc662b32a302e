//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`APP_SEARCH__HYBRID_WEIGHT=0.6`). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a known base
//! directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::default("search", SearchSettings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Build from an explicit figment, mostly for tests and embedding callers.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn search_settings(&self) -> Result<SearchSettings> {
        self.figment
            .extract_inner::<SearchSettings>("search")
            .map_err(|e| Error::Configuration(format!("invalid [search] section: {e}")))
    }
}

/// Similarity metric of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Inner product over L2-normalized vectors (cosine).
    InnerProduct,
    /// Euclidean distance; smaller is more similar.
    L2,
}

/// Every knob of the search subsystem, `[search]` in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub corpus_root: String,
    pub corpus_extensions: Vec<String>,
    pub index_dir: String,

    pub chunk_size: usize,
    pub chunk_overlap: usize,

    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedding_api_url: Option<String>,
    pub embedding_api_key_env: String,
    pub local_model_dir: Option<String>,
    pub batch_size: usize,
    pub provider_timeout_secs: u64,
    pub embedding_cache_capacity: usize,

    pub similarity_metric: SimilarityMetric,
    pub similarity_threshold: f32,
    pub max_l2_distance: Option<f32>,

    pub max_results: usize,
    pub hybrid_weight: f32,
    pub keyword_boost_enabled: bool,
    pub keyword_boost: f32,
    pub relevance_threshold: f32,
    pub response_cache_capacity: usize,
    pub response_cache_ttl_secs: u64,
    pub search_timeout_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            corpus_root: "./knowledge_base".to_string(),
            corpus_extensions: vec!["md".to_string(), "markdown".to_string(), "txt".to_string()],
            index_dir: "./data/vector_index".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            embedding_api_url: None,
            embedding_api_key_env: "OPENAI_API_KEY".to_string(),
            local_model_dir: None,
            batch_size: 32,
            provider_timeout_secs: 30,
            embedding_cache_capacity: 50_000,
            similarity_metric: SimilarityMetric::InnerProduct,
            similarity_threshold: 0.3,
            max_l2_distance: None,
            max_results: 10,
            hybrid_weight: 0.7,
            keyword_boost_enabled: true,
            keyword_boost: 1.5,
            relevance_threshold: 0.1,
            response_cache_capacity: 1000,
            response_cache_ttl_secs: 3600,
            search_timeout_ms: 10_000,
        }
    }
}

impl SearchSettings {
    /// Human-readable list of problems; empty when the settings are usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.chunk_size == 0 {
            issues.push("chunk_size must be positive".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            issues.push(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        if self.embedding_dimension == 0 {
            issues.push("embedding_dimension must be positive".to_string());
        }
        if self.batch_size == 0 {
            issues.push("batch_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.hybrid_weight) {
            issues.push(format!("hybrid_weight ({}) must lie in [0, 1]", self.hybrid_weight));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            issues.push(format!("similarity_threshold ({}) must lie in [-1, 1]", self.similarity_threshold));
        }
        if self.relevance_threshold < 0.0 {
            issues.push("relevance_threshold must not be negative".to_string());
        }
        if self.keyword_boost <= 0.0 {
            issues.push("keyword_boost must be positive".to_string());
        }
        if self.max_results == 0 {
            issues.push("max_results must be positive".to_string());
        }
        if let Some(url) = &self.embedding_api_url {
            if env::var(&self.embedding_api_key_env).map(|v| v.trim().is_empty()).unwrap_or(true) {
                issues.push(format!(
                    "embedding_api_url is set to {url} but ${} holds no credentials",
                    self.embedding_api_key_env
                ));
            }
        }
        issues
    }

    pub fn ensure_valid(&self) -> Result<()> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(issues.join("; ")))
        }
    }

    pub fn corpus_root_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.corpus_root)
    }

    pub fn index_dir_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
