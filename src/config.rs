//! Configuration for the kbase CLI.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (KBASE_HOME, KBASE_DATABASE)
//! 2. Config file (.kbase/config.yaml)
//! 3. Defaults (~/.kbase)
//!
//! Config file discovery:
//! - Searches current directory and parents for .kbase/config.yaml
//! - Relative paths in the config file are resolved against the .kbase/ directory

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::extractors::{ExtractorRegistry, HttpFetcher, HttpSettings, DEFAULT_USER_AGENT};
use crate::manager::{ContentManager, Timeouts};
use crate::storage::SqliteContentStore;
use crate::summarizer::{self, SummarizerConfig};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".kbase";
const CONFIG_FILE: &str = "config.yaml";
const DATABASE_FILE: &str = "kbase.db";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,
    #[serde(default)]
    pub timeouts: Option<TimeoutsConfig>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .kbase/)
    pub home: Option<String>,
    /// SQLite database file (relative to .kbase/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsConfig {
    pub extract_seconds: Option<u64>,
    pub summarize_seconds: Option<u64>,
    pub http_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    pub user_agent: Option<String>,
    pub max_redirects: Option<usize>,
    /// Largest response body accepted from the network
    pub max_bytes: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub summarizer: SummarizerConfig,
    pub timeouts: Timeouts,
    pub http: HttpSettings,
}

impl ResolvedConfig {
    /// Open the store and wire extractors, summarizer and timeouts together
    pub fn build_manager(&self) -> Result<ContentManager> {
        let http = HttpFetcher::new(&self.http).context("Failed to build HTTP client")?;
        let summarizer = summarizer::from_config(&self.summarizer)
            .context("Failed to configure summarizer")?;
        let store = SqliteContentStore::open(&self.database).with_context(|| {
            format!("Failed to open content store: {}", self.database.display())
        })?;

        Ok(ContentManager::new(
            ExtractorRegistry::with_defaults(http),
            summarizer,
            Arc::new(store),
        )
        .with_timeouts(self.timeouts))
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
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

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Combine a parsed file (if any) with env overrides and defaults
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env_home: Option<String>,
    env_database: Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_file, parsed) = match file {
        Some((path, parsed)) => (Some(path), parsed),
        None => (None, ConfigFile::default()),
    };

    // Relative paths in the file are anchored at the .kbase/ directory
    let anchor = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let (Some(anchor), Some(home)) = (&anchor, &parsed.paths.home) {
        resolve_path(anchor, home)
    } else {
        default_home
    };

    let database = if let Some(env_db) = env_database {
        PathBuf::from(env_db)
    } else if let (Some(anchor), Some(db)) = (&anchor, &parsed.paths.database) {
        resolve_path(anchor, db)
    } else {
        home.join(DATABASE_FILE)
    };

    let timeouts_cfg = parsed.timeouts.unwrap_or_default();
    let defaults = Timeouts::default();
    let timeouts = Timeouts {
        extract: timeouts_cfg
            .extract_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.extract),
        summarize: timeouts_cfg
            .summarize_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.summarize),
    };

    let http_cfg = parsed.http.unwrap_or_default();
    let http_defaults = HttpSettings::default();
    let http = HttpSettings {
        user_agent: http_cfg
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        max_redirects: http_cfg.max_redirects.unwrap_or(http_defaults.max_redirects),
        timeout: timeouts_cfg
            .http_seconds
            .map(Duration::from_secs)
            .unwrap_or(http_defaults.timeout),
        max_bytes: http_cfg.max_bytes.unwrap_or(http_defaults.max_bytes),
    };

    ResolvedConfig {
        home,
        database,
        config_file,
        summarizer: parsed.summarizer.unwrap_or_default(),
        timeouts,
        http,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let file = match find_config_file(&cwd) {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    Ok(resolve(
        file,
        std::env::var("KBASE_HOME").ok(),
        std::env::var("KBASE_DATABASE").ok(),
        default_home,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
