use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::semantic::{
    lexical::DEFAULT_KEYWORD_LIMIT, DEFAULT_ALCHEMIST_THRESHOLD, DEFAULT_MODEL, DEFAULT_THRESHOLD,
};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_ALCHEMIST_LIMIT: usize = 5;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Where ranking happens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Linear scan over the embeddings file, reviews from the CSV
    #[default]
    Local,
    /// Similarity RPC and review rows from the remote store
    Remote,
}

/// Input files. Relative paths resolve against the base directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_reviews_path")]
    pub reviews: String,
    #[serde(default = "default_embeddings_path")]
    pub embeddings: String,
    #[serde(default = "default_concepts_path")]
    pub concepts: String,
    /// Precomputed insights aggregate, read for `last_updated`
    #[serde(default)]
    pub insights: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            reviews: default_reviews_path(),
            embeddings: default_embeddings_path(),
            concepts: default_concepts_path(),
            insights: None,
        }
    }
}

fn default_reviews_path() -> String {
    "reviews.csv".to_string()
}

fn default_embeddings_path() -> String {
    "embeddings.json".to_string()
}

fn default_concepts_path() -> String {
    "concepts.json".to_string()
}

/// PostgREST-compatible store holding reviews and the similarity function.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: String,
    /// Overridden by `BREWINTEL_REMOTE_API_KEY`
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_remote_table")]
    pub table: String,
    #[serde(default = "default_match_rpc")]
    pub match_rpc: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: default_remote_table(),
            match_rpc: default_match_rpc(),
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

fn default_remote_table() -> String {
    "reviews".to_string()
}

fn default_match_rpc() -> String {
    "match_reviews".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

/// Configuration for free-text semantic search
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Minimum cosine similarity [-1.0, 1.0]
    #[serde(default = "default_semantic_threshold")]
    pub threshold: f32,

    #[serde(default = "default_search_limit")]
    pub limit: usize,

    /// Cap on keyword fallback results
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_SEARCH_LIMIT,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_semantic_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_keyword_limit() -> usize {
    DEFAULT_KEYWORD_LIMIT
}

/// Configuration for concept-vector formula search
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlchemistConfig {
    #[serde(default = "default_alchemist_threshold")]
    pub threshold: f32,
    #[serde(default = "default_alchemist_limit")]
    pub limit: usize,
}

impl Default for AlchemistConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ALCHEMIST_THRESHOLD,
            limit: DEFAULT_ALCHEMIST_LIMIT,
        }
    }
}

fn default_alchemist_threshold() -> f32 {
    DEFAULT_ALCHEMIST_THRESHOLD
}

fn default_alchemist_limit() -> usize {
    DEFAULT_ALCHEMIST_LIMIT
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,
    #[serde(default)]
    pub alchemist: AlchemistConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            strategy: Strategy::default(),
            data: DataConfig::default(),
            remote: RemoteConfig::default(),
            semantic_search: SemanticSearchConfig::default(),
            alchemist: AlchemistConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        let sem = &self.semantic_search;
        if !(-1.0..=1.0).contains(&sem.threshold) {
            bail!(
                "semantic_search.threshold must be between -1.0 and 1.0, got {}",
                sem.threshold
            );
        }
        if sem.limit == 0 || sem.keyword_limit == 0 {
            bail!("semantic_search.limit and semantic_search.keyword_limit must be greater than 0");
        }
        if sem.download_timeout_secs == 0 {
            bail!("semantic_search.download_timeout_secs must be greater than 0");
        }

        if !(-1.0..=1.0).contains(&self.alchemist.threshold) {
            bail!(
                "alchemist.threshold must be between -1.0 and 1.0, got {}",
                self.alchemist.threshold
            );
        }
        if self.alchemist.limit == 0 {
            bail!("alchemist.limit must be greater than 0");
        }

        if self.strategy == Strategy::Remote {
            url::Url::parse(&self.remote.url)
                .with_context(|| format!("remote.url is not a valid url: {:?}", self.remote.url))?;
            if self.remote.api_key.is_empty() {
                bail!("remote.api_key (or BREWINTEL_REMOTE_API_KEY) is required for the remote strategy");
            }
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing a default one if absent.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("couldnt create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            log::info!("writing default config to {}", config_path.display());
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("couldnt read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        if let Ok(api_key) = std::env::var("BREWINTEL_REMOTE_API_KEY") {
            config.remote.api_key = api_key;
        }

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a data path against the base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}
