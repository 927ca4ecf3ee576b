//! Configuration resolution.
//!
//! Values come from, in order of precedence: explicit overrides (CLI flags),
//! the process environment, a `.env` file, and built-in defaults. The merged
//! environment is also what the analyzer subprocess receives.

use crate::error::{SweepError, SweepResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_ANALYZER: &str = "CACHESWEEP_ANALYZER";
pub const ENV_DB: &str = "CACHESWEEP_DB";
pub const ENV_TIMEOUT: &str = "CACHESWEEP_TIMEOUT";
pub const ENV_CACHE_DIR: &str = "CACHESWEEP_CACHE_DIR";
pub const ENV_EXTENSION: &str = "CACHESWEEP_EXTENSION";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

pub const DEFAULT_ANALYZER: &str = "rustassistant";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/cachesweep.db";
pub const DEFAULT_CACHE_DIR: &str = ".rustassistant";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EXTENSION: &str = "rs";

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub analyzer: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    analyzer: PathBuf,
    pub db_path: Option<PathBuf>,
    pub database_url: String,
    pub timeout: Duration,
    pub cache_dir_name: String,
    pub extension: String,
    /// Environment handed to the analyzer, with `DATABASE_URL` guaranteed set.
    pub analyzer_env: BTreeMap<String, String>,
}

impl SweepConfig {
    /// Resolve configuration from the process environment and `./.env`.
    pub fn load(overrides: &ConfigOverrides) -> SweepResult<Self> {
        let process: BTreeMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir()?;
        Self::resolve(overrides, process, &cwd)
    }

    /// Resolve against an explicit environment and working directory.
    pub fn resolve(
        overrides: &ConfigOverrides,
        process: BTreeMap<String, String>,
        cwd: &Path,
    ) -> SweepResult<Self> {
        let dotenv = match &overrides.env_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(SweepError::precondition(format!(
                        "env file not found: {}",
                        path.display()
                    )));
                }
                read_env_file(path)?
            }
            None => {
                let default = cwd.join(".env");
                if default.is_file() {
                    read_env_file(&default)?
                } else {
                    BTreeMap::new()
                }
            }
        };

        // Process environment wins over the file, like dotenvy's own loader.
        let mut env = dotenv;
        env.extend(process);

        let database_url = env
            .get(ENV_DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| {
                tracing::debug!("DATABASE_URL not set, using {DEFAULT_DATABASE_URL}");
                DEFAULT_DATABASE_URL.to_string()
            });
        env.insert(ENV_DATABASE_URL.to_string(), database_url.clone());

        let analyzer = overrides
            .analyzer
            .clone()
            .or_else(|| env.get(ENV_ANALYZER).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ANALYZER));

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => match env.get(ENV_TIMEOUT) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    SweepError::precondition(format!("{ENV_TIMEOUT} is not a number: {raw}"))
                })?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            return Err(SweepError::precondition("timeout must be at least 1 second"));
        }

        let db_path = overrides
            .db
            .clone()
            .or_else(|| env.get(ENV_DB).map(PathBuf::from))
            .or_else(|| sqlite_path_from_url(&database_url).map(|p| cwd.join(p)));

        Ok(Self {
            analyzer,
            db_path,
            database_url,
            timeout: Duration::from_secs(timeout_secs),
            cache_dir_name: env
                .get(ENV_CACHE_DIR)
                .cloned()
                .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()),
            extension: env
                .get(ENV_EXTENSION)
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            analyzer_env: env,
        })
    }

    /// Locate the analyzer binary. A bare name is searched for in `PATH`.
    pub fn resolve_analyzer(&self) -> SweepResult<PathBuf> {
        if self.analyzer.components().count() > 1 || self.analyzer.is_absolute() {
            if self.analyzer.is_file() {
                return Ok(self.analyzer.clone());
            }
            return Err(SweepError::precondition(format!(
                "analyzer binary not found at {}",
                self.analyzer.display()
            )));
        }
        which::which(&self.analyzer).map_err(|_| {
            SweepError::precondition(format!(
                "analyzer binary {:?} not found in PATH (set {ENV_ANALYZER} or --analyzer)",
                self.analyzer
            ))
        })
    }

    /// Path of the registry database, or a precondition failure if none is configured.
    pub fn require_db_path(&self) -> SweepResult<&Path> {
        self.db_path.as_deref().ok_or_else(|| {
            SweepError::precondition(format!(
                "no registry database configured: DATABASE_URL is not a sqlite URL; set {ENV_DB} or --db"
            ))
        })
    }
}

fn read_env_file(path: &Path) -> SweepResult<BTreeMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        SweepError::precondition(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut map = BTreeMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            SweepError::precondition(format!("invalid line in {}: {e}", path.display()))
        })?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Extract the file path from a `sqlite:` connection string.
pub fn sqlite_path_from_url(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}
