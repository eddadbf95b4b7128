//! Pipeline configuration
//!
//! Built once per run from defaults, an optional TOML file and the process
//! environment (highest precedence), then passed by reference into every
//! stage. Nothing else in the crate reads the environment.

use crate::errors::ConfigError;
use crate::taxonomy::EventTaxonomy;
use config::{Config, Environment, File as ConfigFile};
use gathr_gbdt::GbdtParams;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Event store connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "gathr".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Train/evaluation split parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Fraction of examples held out for evaluation, in (0, 1)
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub lookback_days: i64,
    /// Bound on the extraction call; `None` waits indefinitely
    pub extract_timeout: Option<Duration>,
    pub taxonomy: EventTaxonomy,
    pub split: SplitConfig,
    /// Train even when only one label class is present
    pub allow_single_class: bool,
    pub trainer: GbdtParams,
    pub dataset_path: PathBuf,
    pub model_output_path: PathBuf,
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            lookback_days: 30,
            extract_timeout: None,
            taxonomy: EventTaxonomy::default(),
            split: SplitConfig::default(),
            allow_single_class: false,
            trainer: GbdtParams::default(),
            dataset_path: PathBuf::from("data/event_logs.csv"),
            model_output_path: PathBuf::from("models/xgboost_v1.json"),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file overlaid with the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::default());

        Self::from_source(&builder.build()?)
    }

    /// Resolve every key against `source`, falling back to defaults.
    pub fn from_source(source: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database = DatabaseConfig {
            host: get_string_value(source, "DB_HOST").unwrap_or(defaults.database.host),
            port: get_parsed(source, "DB_PORT", defaults.database.port)?,
            name: get_string_value(source, "DB_NAME").unwrap_or(defaults.database.name),
            user: get_string_value(source, "DB_USER").unwrap_or(defaults.database.user),
            password: get_string_value(source, "DB_PASS").unwrap_or(defaults.database.password),
        };

        let relevant = get_list(source, "RELEVANT_EVENT_TYPES");
        let positive = get_list(source, "POSITIVE_EVENT_TYPES");
        let taxonomy = match (relevant, positive) {
            (None, None) => defaults.taxonomy,
            (relevant, positive) => {
                let relevant = relevant
                    .unwrap_or_else(|| defaults.taxonomy.relevant().map(String::from).collect());
                let positive = positive
                    .unwrap_or_else(|| defaults.taxonomy.positive().map(String::from).collect());
                if relevant.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: "RELEVANT_EVENT_TYPES",
                        reason: "must name at least one event type".to_string(),
                    });
                }
                EventTaxonomy::new(relevant, positive).map_err(|reason| ConfigError::Invalid {
                    key: "POSITIVE_EVENT_TYPES",
                    reason,
                })?
            }
        };

        let extract_timeout = match get_string_value(source, "EXTRACT_TIMEOUT_SECS") {
            None => None,
            Some(raw) => Some(Duration::from_secs(raw.parse().map_err(|e| {
                ConfigError::Invalid {
                    key: "EXTRACT_TIMEOUT_SECS",
                    reason: format!("'{raw}': {e}"),
                }
            })?)),
        };

        let log = LogConfig {
            level: get_string_value(source, "LOG_LEVEL").unwrap_or(defaults.log.level),
            format: get_parsed(source, "LOG_FORMAT", defaults.log.format)?,
        };

        let trainer = GbdtParams {
            num_trees: get_parsed(source, "NUM_TREES", defaults.trainer.num_trees)?,
            max_depth: get_parsed(source, "MAX_DEPTH", defaults.trainer.max_depth)?,
            min_samples_leaf: get_parsed(
                source,
                "MIN_SAMPLES_LEAF",
                defaults.trainer.min_samples_leaf,
            )?,
            learning_rate: get_parsed(source, "LEARNING_RATE", defaults.trainer.learning_rate)?,
            ..defaults.trainer
        };

        let config = Self {
            database,
            lookback_days: get_parsed(source, "LOOKBACK_DAYS", defaults.lookback_days)?,
            extract_timeout,
            taxonomy,
            split: SplitConfig {
                test_fraction: get_parsed(source, "TEST_FRACTION", defaults.split.test_fraction)?,
                seed: get_parsed(source, "RANDOM_SEED", defaults.split.seed)?,
            },
            allow_single_class: get_parsed(
                source,
                "ALLOW_SINGLE_CLASS",
                defaults.allow_single_class,
            )?,
            trainer,
            dataset_path: get_string_value(source, "DATASET_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.dataset_path),
            model_output_path: get_string_value(source, "MODEL_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_output_path),
            log,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_days <= 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Invalid {
                key: "LOOKBACK_DAYS",
                reason: format!(
                    "must be in 1..={MAX_LOOKBACK_DAYS}, got {}",
                    self.lookback_days
                ),
            });
        }
        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid {
                key: "TEST_FRACTION",
                reason: format!("must be strictly between 0 and 1, got {fraction}"),
            });
        }
        self.trainer
            .validate()
            .map_err(|e| ConfigError::Invalid {
                key: "NUM_TREES/LEARNING_RATE",
                reason: e.to_string(),
            })?;
        if self.model_output_path.file_stem().is_none() {
            return Err(ConfigError::Invalid {
                key: "MODEL_OUTPUT_PATH",
                reason: format!(
                    "'{}' does not name a file",
                    self.model_output_path.display()
                ),
            });
        }
        Ok(())
    }
}

/// Keys are looked up as written and lowercased, since sources differ in
/// how they normalise case.
fn get_string_value(config: &Config, key: &str) -> Option<String> {
    [key.to_string(), key.to_ascii_lowercase()]
        .iter()
        .find_map(|candidate| {
            config
                .get_string(candidate)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

fn get_parsed<T>(config: &Config, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get_string_value(config, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("'{raw}': {e}"),
        }),
    }
}

fn get_list(config: &Config, key: &str) -> Option<Vec<String>> {
    get_string_value(config, key).map(|raw| {
        raw.split(',')
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    })
}
