//! Configuration file parser for `gleaner.toml`.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Every section and key uses `#[serde(default)]`, so any
//! subset can be specified. Unknown top-level keys and section keys are
//! accepted but logged as warnings, since they are usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file used for the article store and the cache.
    /// `None` means the platform default (see [`Config::database_path`]).
    pub database_path: Option<PathBuf>,
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub readability: ReadabilityConfig,
    pub worker: WorkerConfig,
}

/// Batch sync pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Entries processed concurrently per chunk. Values below 1 are treated as 1.
    pub chunk_size: usize,
    /// Pause between consecutive chunks, in milliseconds.
    pub parallel_delay_ms: u64,
    /// Also pause after the final chunk.
    pub delay_after_last_chunk: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            parallel_delay_ms: 1000,
            delay_after_last_chunk: false,
        }
    }
}

impl SyncConfig {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    pub fn parallel_delay(&self) -> Duration {
        Duration::from_millis(self.parallel_delay_ms)
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for request plus body read, in seconds.
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Responses larger than this are rejected.
    pub max_body_bytes: usize,
    pub user_agent: String,
    /// Permit localhost and private-network targets. Off in production.
    pub allow_private_hosts: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_redirects: 5,
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: format!(
                "gleaner/{} (+https://github.com/dhofheinz/gleaner)",
                env!("CARGO_PKG_VERSION")
            ),
            allow_private_hosts: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of SQLite cache rows, in hours.
    pub ttl_hours: i64,
    /// Entry bound for the in-memory cache.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 72,
            memory_capacity: 1024,
        }
    }
}

/// Thresholds for the readability heuristic.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadabilityConfig {
    /// Minimum characters of text the main content block must hold.
    pub min_text_length: usize,
    pub max_excerpt_chars: usize,
}

impl Default for ReadabilityConfig {
    fn default() -> Self {
        Self {
            min_text_length: 500,
            max_excerpt_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs allowed to run at the same time in `gleaner work`.
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
        }
    }
}

const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("database_path", &[]),
    (
        "sync",
        &["chunk_size", "parallel_delay_ms", "delay_after_last_chunk"],
    ),
    (
        "http",
        &[
            "timeout_secs",
            "max_redirects",
            "max_body_bytes",
            "user_agent",
            "allow_private_hosts",
        ],
    ),
    ("cache", &["ttl_hours", "memory_capacity"]),
    ("readability", &["min_text_length", "max_excerpt_chars"]),
    ("worker", &["max_concurrent_jobs"]),
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file -> `Ok(Config::default())`
    /// - Empty file -> `Ok(Config::default())`
    /// - Invalid TOML -> `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys -> accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            chunk_size = config.sync.chunk_size(),
            parallel_delay_ms = config.sync.parallel_delay_ms,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Resolved database path: the configured one, else
    /// `$XDG_DATA_HOME/gleaner/gleaner.db`, else `~/.local/share/gleaner/gleaner.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.database_path {
            return Some(path.clone());
        }
        let data_home = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share"))
            })?;
        Some(data_home.join("gleaner").join("gleaner.db"))
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let Some((_, section_keys)) = KNOWN_KEYS.iter().find(|(name, _)| *name == key.as_str()) else {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        };
        if let Some(table) = value.as_table() {
            for sub in table.keys() {
                if !section_keys.contains(&sub.as_str()) {
                    tracing::warn!(section = %key, key = %sub, "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.chunk_size, 10);
        assert_eq!(config.sync.parallel_delay(), Duration::from_millis(1000));
        assert!(!config.sync.delay_after_last_chunk);
        assert_eq!(config.http.timeout_secs, 20);
        assert_eq!(config.http.max_redirects, 5);
        assert_eq!(config.http.max_body_bytes, 5 * 1024 * 1024);
        assert!(config.http.user_agent.starts_with("gleaner/"));
        assert!(!config.http.allow_private_hosts);
        assert_eq!(config.cache.ttl_hours, 72);
        assert_eq!(config.readability.min_text_length, 500);
        assert_eq!(config.worker.max_concurrent_jobs, 4);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gleaner_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.sync.chunk_size, 10);
    }

    #[test]
    fn test_empty_and_whitespace_return_default() {
        assert_eq!(Config::parse("").unwrap().sync.chunk_size, 10);
        assert_eq!(Config::parse("  \n \n").unwrap().sync.chunk_size, 10);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let config = Config::parse("[sync]\nchunk_size = 3\n").unwrap();
        assert_eq!(config.sync.chunk_size, 3);
        assert_eq!(config.sync.parallel_delay_ms, 1000);
        assert_eq!(config.http.max_redirects, 5);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
database_path = "/var/lib/gleaner/db.sqlite"

[sync]
chunk_size = 5
parallel_delay_ms = 250
delay_after_last_chunk = true

[http]
timeout_secs = 7
max_redirects = 2
max_body_bytes = 1024
user_agent = "test-agent"
allow_private_hosts = true

[cache]
ttl_hours = 12
memory_capacity = 64

[readability]
min_text_length = 200
max_excerpt_chars = 80

[worker]
max_concurrent_jobs = 8
"#;
        let config = Config::parse(content).unwrap();
        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/var/lib/gleaner/db.sqlite"))
        );
        assert_eq!(config.sync.chunk_size, 5);
        assert_eq!(config.sync.parallel_delay(), Duration::from_millis(250));
        assert!(config.sync.delay_after_last_chunk);
        assert_eq!(config.http.timeout_secs, 7);
        assert_eq!(config.http.user_agent, "test-agent");
        assert!(config.http.allow_private_hosts);
        assert_eq!(config.cache.ttl_hours, 12);
        assert_eq!(config.cache.memory_capacity, 64);
        assert_eq!(config.readability.min_text_length, 200);
        assert_eq!(config.worker.max_concurrent_jobs, 8);
    }

    #[test]
    fn test_zero_chunk_size_clamped() {
        let config = Config::parse("[sync]\nchunk_size = 0\n").unwrap();
        assert_eq!(config.sync.chunk_size(), 1);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = "totally_fake_key = 1\n[sync]\nchunk_sise = 4\n";
        let config = Config::parse(content).unwrap();
        assert_eq!(config.sync.chunk_size, 10);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::parse("[sync]\nchunk_size = \"ten\"\n").is_err());
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("gleaner_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gleaner.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("gleaner_config_test_file");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gleaner.toml");
        std::fs::write(&path, "[worker]\nmax_concurrent_jobs = 2\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.worker.max_concurrent_jobs, 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
