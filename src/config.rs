//! Configuration for witness.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (WITNESS_HOME, WITNESS_RECORDS)
//! 2. Config file (.witness/config.yaml)
//! 3. Defaults (~/.witness)
//!
//! Config file discovery:
//! - Searches current directory and parents for .witness/config.yaml
//! - Paths in config file are relative to the .witness/ directory
//!
//! Secrets never live in the file. Service sections name the environment
//! variable holding the key instead.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::limits::Limits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default bind address for `witness serve`
pub const DEFAULT_BIND: &str = "127.0.0.1:5001";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub anchor: Option<AnchorConfig>,
    #[serde(default)]
    pub narration: Option<NarrationSettings>,
    #[serde(default)]
    pub analysis: Option<AnalysisSettings>,
    #[serde(default)]
    pub limits: Option<Limits>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .witness/)
    pub home: Option<String>,
    /// Record documents directory (relative to .witness/)
    pub records: Option<String>,
}

/// Anchor section as written in the file
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum AnchorConfig {
    Journal {
        path: Option<String>,
        memo_prefix: Option<String>,
    },
    Http {
        endpoint: String,
        token_env: Option<String>,
        poll_interval_ms: Option<u64>,
        memo_prefix: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

/// Which ledger seals fingerprints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum AnchorSettings {
    /// Local hash-chained journal
    Journal { path: PathBuf, memo_prefix: String },
    /// Remote ledger gateway
    Http {
        endpoint: String,
        token_env: Option<String>,
        poll_interval_ms: u64,
        memo_prefix: String,
    },
}

/// Text-to-speech service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    pub endpoint: String,
    pub voice_id: String,
    pub model_id: String,
    /// Name of the env var holding the API key
    pub api_key_env: String,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.elevenlabs.io".to_string(),
            voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            api_key_env: "ELEVENLABS_API_KEY".to_string(),
        }
    }
}

/// Chat-completions service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the env var holding the API key
    pub api_key_env: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            model: "upstage/solar-pro-3:free".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Absolute path to witness home (state)
    pub home: PathBuf,
    /// Directory holding record documents
    pub records: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub anchor: AnchorSettings,
    pub narration: NarrationSettings,
    pub analysis: AnalysisSettings,
    pub limits: Limits,
    /// Address `witness serve` binds to
    pub bind: String,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            records: home.join("records"),
            config_file: None,
            anchor: AnchorSettings::Journal {
                path: home.join("ledger").join("journal.jsonl"),
                memo_prefix: crate::adapters::ledger::DEFAULT_MEMO_PREFIX.to_string(),
            },
            narration: NarrationSettings::default(),
            analysis: AnalysisSettings::default(),
            limits: Limits::default(),
            bind: DEFAULT_BIND.to_string(),
            home,
        }
    }

    /// Audit log location
    pub fn events_path(&self) -> PathBuf {
        self.home.join("events.jsonl")
    }
}

/// Values taken from the environment
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    home: Option<PathBuf>,
    records: Option<PathBuf>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            home: std::env::var("WITNESS_HOME").ok().map(PathBuf::from),
            records: std::env::var("WITNESS_RECORDS").ok().map(PathBuf::from),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".witness").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file, environment and defaults into one configuration
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: EnvOverrides,
    default_home: PathBuf,
) -> ResolvedConfig {
    let Some((config_path, file)) = file else {
        let home = env.home.unwrap_or(default_home);
        let mut config = ResolvedConfig::with_home(home);
        if let Some(records) = env.records {
            config.records = records;
        }
        return config;
    };

    // .witness/ directory; relative paths in the file start here
    let witness_dir = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let home = env
        .home
        .or_else(|| file.paths.home.as_deref().map(|p| resolve_path(&witness_dir, p)))
        .unwrap_or(default_home);

    let mut config = ResolvedConfig::with_home(home);
    config.config_file = Some(config_path);

    if let Some(records) = env
        .records
        .or_else(|| file.paths.records.as_deref().map(|p| resolve_path(&witness_dir, p)))
    {
        config.records = records;
    }

    let default_memo = crate::adapters::ledger::DEFAULT_MEMO_PREFIX;
    match file.anchor {
        Some(AnchorConfig::Journal { path, memo_prefix }) => {
            config.anchor = AnchorSettings::Journal {
                path: path
                    .as_deref()
                    .map(|p| resolve_path(&witness_dir, p))
                    .unwrap_or_else(|| config.home.join("ledger").join("journal.jsonl")),
                memo_prefix: memo_prefix.unwrap_or_else(|| default_memo.to_string()),
            };
        }
        Some(AnchorConfig::Http {
            endpoint,
            token_env,
            poll_interval_ms,
            memo_prefix,
        }) => {
            config.anchor = AnchorSettings::Http {
                endpoint,
                token_env,
                poll_interval_ms: poll_interval_ms.unwrap_or(2_000),
                memo_prefix: memo_prefix.unwrap_or_else(|| default_memo.to_string()),
            };
        }
        None => {}
    }

    if let Some(narration) = file.narration {
        config.narration = narration;
    }
    if let Some(analysis) = file.analysis {
        config.analysis = analysis;
    }
    if let Some(limits) = file.limits {
        config.limits = limits;
    }
    if let Some(bind) = file.server.and_then(|s| s.bind) {
        config.bind = bind;
    }

    config
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".witness");

    let file = match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    Ok(resolve(file, EnvOverrides::from_env(), default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (bypasses the cache)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the witness home directory
pub fn witness_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the records directory ($WITNESS_HOME/records unless overridden)
pub fn records_dir() -> Result<PathBuf> {
    Ok(config()?.records.clone())
}

/// Get the audit log path ($WITNESS_HOME/events.jsonl)
pub fn events_path() -> Result<PathBuf> {
    Ok(config()?.events_path())
}
