//! Configuration management for the Scrypo indexer.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables referenced as `${VAR_NAME}`
//! - Default values (fallbacks)

use anyhow::{Context, Result};
use scrypo_core::Felt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::storage::Finality;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Contract addresses
    pub contracts: ContractsConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Commit retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Starknet JSON-RPC URL
    pub rpc_url: String,
}

/// Contract addresses configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// ProfileRegistry contract address (ProfileUpdated + MessageSent events)
    pub profile_registry: Felt,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://scrypo.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a write waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First block to project when the database has no cursor
    #[serde(default)]
    pub start_block: u64,

    /// Delay between polls once caught up, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Finality to consume: "accepted" (default) or "pending"
    #[serde(default)]
    pub finality: Finality,

    /// Page size for `starknet_getEvents`
    #[serde(default = "default_events_chunk_size")]
    pub events_chunk_size: u64,
}

impl SyncConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            poll_interval_ms: default_poll_interval_ms(),
            finality: Finality::default(),
            events_chunk_size: default_events_chunk_size(),
        }
    }
}

/// Retry policy for block commits and upstream reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Commit attempts before the engine gives up on a block
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_events_chunk_size() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `rpc_url = "${STARKNET_RPC_URL}"`
    ///
    /// # Example
    /// ```no_run
    /// # use scrypo_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let rpc_url = self.network.rpc_url.trim();
        if rpc_url.is_empty() {
            anyhow::bail!("Network RPC URL cannot be empty");
        }
        if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
            anyhow::bail!(
                "Network RPC URL must start with http:// or https:// (got '{}')",
                rpc_url
            );
        }

        if self.contracts.profile_registry.is_zero() {
            anyhow::bail!("Contracts profile_registry must be a non-zero address");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.sync.poll_interval_ms == 0 {
            anyhow::bail!("Sync poll_interval_ms must be > 0");
        }
        if self.sync.events_chunk_size == 0 {
            anyhow::bail!("Sync events_chunk_size must be > 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("Retry max_attempts must be > 0");
        }
        if self.retry.initial_backoff_ms == 0 {
            anyhow::bail!("Retry initial_backoff_ms must be > 0");
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            anyhow::bail!(
                "Retry max_backoff_ms ({}) cannot be below initial_backoff_ms ({})",
                self.retry.max_backoff_ms,
                self.retry.initial_backoff_ms
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

/// Lexical context while scanning TOML for placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Bare,
    Comment,
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

/// Expand `${VAR_NAME}` placeholders.
///
/// Placeholders inside comments are left untouched; placeholders anywhere
/// else, including every TOML string form, are replaced. A referenced
/// variable that is not set is an error.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut scan = Scan::Bare;
    let mut i = 0;

    let triple = |i: usize, q: char| chars.get(i..i + 3) == Some(&[q, q, q][..]);

    while i < chars.len() {
        let ch = chars[i];

        match scan {
            Scan::Comment => {
                if ch == '\n' {
                    scan = Scan::Bare;
                }
                out.push(ch);
                i += 1;
                continue;
            }
            Scan::Basic | Scan::MultiBasic if ch == '\\' => {
                out.push(ch);
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                }
                i += 2;
                continue;
            }
            _ => {}
        }

        if ch == '$' && chars.get(i + 1) == Some(&'{') {
            let start = i + 2;
            let Some(len) = chars[start..].iter().position(|c| *c == '}') else {
                anyhow::bail!("Unclosed environment variable placeholder at position {}", i);
            };
            let name: String = chars[start..start + len].iter().collect();
            if name.is_empty() {
                anyhow::bail!("Empty environment variable name at position {}", i);
            }
            let value = std::env::var(&name).with_context(|| {
                format!(
                    "Environment variable '{}' is not set (referenced at position {})",
                    name, i
                )
            })?;
            out.push_str(&value);
            i = start + len + 1;
            continue;
        }

        let (next, width) = match (scan, ch) {
            (Scan::Bare, '#') => (Scan::Comment, 1),
            (Scan::Bare, '"') if triple(i, '"') => (Scan::MultiBasic, 3),
            (Scan::Bare, '"') => (Scan::Basic, 1),
            (Scan::Bare, '\'') if triple(i, '\'') => (Scan::MultiLiteral, 3),
            (Scan::Bare, '\'') => (Scan::Literal, 1),
            (Scan::Basic, '"') | (Scan::Literal, '\'') => (Scan::Bare, 1),
            (Scan::MultiBasic, '"') if triple(i, '"') => (Scan::Bare, 3),
            (Scan::MultiLiteral, '\'') if triple(i, '\'') => (Scan::Bare, 3),
            _ => (scan, 1),
        };

        out.extend(&chars[i..i + width]);
        scan = next;
        i += width;
    }

    Ok(out)
}
