use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.yaml";

/// Default image tower asset, relative to the data directory
const DEFAULT_IMAGE_MODEL: &str = "models/clip-image-encoder.onnx";
/// Default text tower asset, relative to the data directory
const DEFAULT_TEXT_MODEL: &str = "models/clip-text-encoder.onnx";
const DEFAULT_TOKENIZER: &str = "models/tokenizer.json";
/// Identity of the exported model pair; stored vectors are tied to it
const DEFAULT_MODEL_ID: &str = "clip-vit-base-patch32";
const DEFAULT_DIMENSIONS: usize = 512;
const DEFAULT_CONTEXT_LENGTH: usize = 77;
const DEFAULT_OPTIMIZATION_LEVEL: u8 = 3;

const DEFAULT_JOURNAL_COMPACT_THRESHOLD: usize = 1024;
const DEFAULT_JOB_HISTORY: usize = 32;
const DEFAULT_STORE_WRITE_RETRIES: u32 = 1;

const DEFAULT_TOP_K: usize = 30;
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Could not determine home directory")]
    NoHome,
}

/// Element type of the text tower's token input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[default]
    Int64,
    Int32,
}

/// Model assets and their tensor contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_image_model")]
    pub image_model: PathBuf,

    #[serde(default = "default_text_model")]
    pub text_model: PathBuf,

    #[serde(default = "default_tokenizer")]
    pub tokenizer: PathBuf,

    /// Changing this invalidates stored embeddings
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Output dimensionality of both towers
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_context_length")]
    pub context_length: usize,

    #[serde(default)]
    pub token_type: TokenType,

    /// Intra-op threads for the runtime; 0 lets the runtime decide
    #[serde(default)]
    pub intra_threads: usize,

    /// Graph optimization level, 0 (off) to 3 (all)
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u8,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            image_model: default_image_model(),
            text_model: default_text_model(),
            tokenizer: default_tokenizer(),
            model_id: default_model_id(),
            dimensions: DEFAULT_DIMENSIONS,
            context_length: DEFAULT_CONTEXT_LENGTH,
            token_type: TokenType::default(),
            intra_threads: 0,
            optimization_level: DEFAULT_OPTIMIZATION_LEVEL,
        }
    }
}

fn default_image_model() -> PathBuf {
    PathBuf::from(DEFAULT_IMAGE_MODEL)
}

fn default_text_model() -> PathBuf {
    PathBuf::from(DEFAULT_TEXT_MODEL)
}

fn default_tokenizer() -> PathBuf {
    PathBuf::from(DEFAULT_TOKENIZER)
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_context_length() -> usize {
    DEFAULT_CONTEXT_LENGTH
}

fn default_optimization_level() -> u8 {
    DEFAULT_OPTIMIZATION_LEVEL
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Journal frames before the store folds them into its snapshot
    #[serde(default = "default_journal_compact_threshold")]
    pub journal_compact_threshold: usize,

    /// Finished jobs kept for status queries
    #[serde(default = "default_job_history")]
    pub job_history: usize,

    /// Extra attempts for a failed store write before the photo is skipped
    #[serde(default = "default_store_write_retries")]
    pub store_write_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            journal_compact_threshold: DEFAULT_JOURNAL_COMPACT_THRESHOLD,
            job_history: DEFAULT_JOB_HISTORY,
            store_write_retries: DEFAULT_STORE_WRITE_RETRIES,
        }
    }
}

fn default_journal_compact_threshold() -> usize {
    DEFAULT_JOURNAL_COMPACT_THRESHOLD
}

fn default_job_history() -> usize {
    DEFAULT_JOB_HISTORY
}

fn default_store_write_retries() -> u32 {
    DEFAULT_STORE_WRITE_RETRIES
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Results scoring below this are dropped; none keeps everything
    #[serde(default)]
    pub default_min_score: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            default_min_score: None,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryConfig {
    /// Photo library root; each sub-directory is an album
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let models = &self.models;
        if models.dimensions == 0 || models.dimensions > u16::MAX as usize {
            return invalid(format!(
                "models.dimensions must be between 1 and {}, got {}",
                u16::MAX,
                models.dimensions
            ));
        }
        if models.context_length == 0 {
            return invalid("models.context_length must be greater than 0".to_string());
        }
        if models.optimization_level > 3 {
            return invalid(format!(
                "models.optimization_level must be between 0 and 3, got {}",
                models.optimization_level
            ));
        }
        if models.model_id.trim().is_empty() {
            return invalid("models.model_id must not be empty".to_string());
        }

        if self.index.job_history == 0 {
            return invalid("index.job_history must be greater than 0".to_string());
        }

        if self.search.default_top_k == 0 {
            return invalid("search.default_top_k must be greater than 0".to_string());
        }
        if let Some(min) = self.search.default_min_score {
            if !(-1.0..=1.0).contains(&min) {
                return invalid(format!(
                    "search.default_min_score must be between -1.0 and 1.0, got {}",
                    min
                ));
            }
        }

        if self.daemon.listen.parse::<std::net::SocketAddr>().is_err() {
            return invalid(format!(
                "daemon.listen must be a socket address, got '{}'",
                self.daemon.listen
            ));
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path)?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)?;
            log::info!("Created default config at {}", path.display());
        }

        let config_str = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// Data directory: explicit path (flag or `PICQ_DATA_DIR`), else
/// `$HOME/.local/share/picq`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }

    let home = homedir::my_home()
        .map_err(|_| ConfigError::NoHome)?
        .ok_or(ConfigError::NoHome)?;
    Ok(home.join(".local").join("share").join("picq"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.models.dimensions, 512);
        assert_eq!(config.models.context_length, 77);
        assert_eq!(config.models.token_type, TokenType::Int64);
        assert_eq!(config.index.journal_compact_threshold, 1024);
        assert_eq!(config.index.store_write_retries, 1);
        assert_eq!(config.search.default_top_k, 30);
        assert_eq!(config.search.default_min_score, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.base_path(), dir.path());
        assert_eq!(config.models, ModelsConfig::default());
    }

    #[test]
    fn test_partial_file_gets_defaults_and_is_resaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "models:\n  token_type: int32\nsearch:\n  default_top_k: 5\n").unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.models.token_type, TokenType::Int32);
        assert_eq!(config.search.default_top_k, 5);
        assert_eq!(config.models.dimensions, 512);

        let resaved = std::fs::read_to_string(&path).unwrap();
        assert!(resaved.contains("journal_compact_threshold"));

        let reloaded = Config::load_with(dir.path()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        for yaml in [
            "models:\n  dimensions: 0\n",
            "models:\n  optimization_level: 7\n",
            "search:\n  default_min_score: 1.5\n",
            "index:\n  job_history: 0\n",
            "daemon:\n  listen: not-an-address\n",
        ] {
            std::fs::write(&path, yaml).unwrap();
            let result = Config::load_with(dir.path());
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "{yaml:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "models: [unclosed").unwrap();
        let result = Config::load_with(dir.path());
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_resolve_data_dir_prefers_explicit() {
        let dir = resolve_data_dir(Some(PathBuf::from("/srv/picq"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/picq"));
    }
}
