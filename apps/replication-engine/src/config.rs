//! Environment-driven configuration.
//!
//! Everything is read once at boot from environment variables (a `.env`
//! file is honored in development). Replication settings are shared
//! behind a readers-writer lock: readers take a consistent snapshot,
//! the single writer (admin collaborator) goes through [`SharedSettings`].

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Configuration errors, fatal at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Upstream venue credentials.
#[derive(Debug, Clone, Default)]
pub struct BinanceCredentials {
    /// REST/stream API key.
    pub api_key: String,
    /// REST API secret.
    pub api_secret: String,
    /// Whether to use the futures testnet endpoints.
    pub testnet: bool,
}

impl BinanceCredentials {
    /// Whether credentials are present at all.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Replication policy settings, adjustable at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Symbol replicated from the source venue.
    pub symbol: String,
    /// Scale applied to source fill quantities before mirroring.
    pub position_ratio: Decimal,
    /// Upper bound on a single signal's quantity.
    pub max_position: Decimal,
    /// Stop-loss distance as a price ratio.
    pub stop_loss_ratio: Decimal,
    /// Per-order venue timeout.
    pub order_timeout: Duration,
    /// Stream delivery budget before an entry goes to the dead letter.
    pub max_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            position_ratio: Decimal::ONE,
            max_position: Decimal::ONE,
            stop_loss_ratio: Decimal::new(5, 2),
            order_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Shared handle over [`SyncSettings`].
///
/// Clones are cheap; every reader gets a consistent snapshot and writes
/// are serialized through the lock.
#[derive(Debug, Clone)]
pub struct SharedSettings(Arc<RwLock<SyncSettings>>);

impl SharedSettings {
    /// Wrap `settings` for sharing.
    #[must_use]
    pub fn new(settings: SyncSettings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    /// Consistent copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> SyncSettings {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Apply a serialized update.
    pub fn update(&self, apply: impl FnOnce(&mut SyncSettings)) {
        let mut guard = self
            .0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        apply(&mut guard);
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

/// Full boot configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Redis connection URL (streams + idempotency keys).
    pub redis_url: String,
    /// Path of the local order database.
    pub database_path: String,
    /// Metrics listener address; `None` disables the exporter.
    pub metrics_addr: Option<SocketAddr>,
    /// Upstream venue credentials.
    pub binance: BinanceCredentials,
    /// Names of the downstream venues to mirror onto.
    pub targets: Vec<String>,
    /// Replication policy.
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but does not
    /// parse. Absent variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SyncSettings::default();

        let sync = SyncSettings {
            symbol: env_or("SYMBOL", &defaults.symbol),
            position_ratio: env_decimal("POSITION_RATIO", defaults.position_ratio)?,
            max_position: env_decimal("MAX_POSITION", defaults.max_position)?,
            stop_loss_ratio: env_decimal("STOP_LOSS_RATIO", defaults.stop_loss_ratio)?,
            order_timeout: Duration::from_secs(env_parse(
                "ORDER_TIMEOUT_SECS",
                defaults.order_timeout.as_secs(),
            )?),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries)?,
        };

        let targets = env_or("TARGETS", "okx,bybit")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let metrics_addr = match std::env::var("METRICS_ADDR") {
            Ok(raw) if !raw.is_empty() => {
                Some(raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "METRICS_ADDR",
                    value: raw,
                })?)
            }
            _ => None,
        };

        Ok(Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            database_path: env_or("DATABASE_PATH", "./replication.db"),
            metrics_addr,
            binance: BinanceCredentials {
                api_key: env_or("BINANCE_API_KEY", ""),
                api_secret: env_or("BINANCE_API_SECRET", ""),
                testnet: env_parse("BINANCE_TESTNET", false)?,
            },
            targets,
            sync,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_decimal(name: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => Decimal::from_str(&raw).map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_policy() {
        let settings = SyncSettings::default();
        assert_eq!(settings.position_ratio, Decimal::ONE);
        assert_eq!(settings.max_position, Decimal::ONE);
        assert_eq!(settings.stop_loss_ratio, Decimal::new(5, 2));
        assert_eq!(settings.order_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let shared = SharedSettings::default();
        let before = shared.snapshot();

        shared.update(|s| s.max_position = Decimal::from(10));

        assert_eq!(before.max_position, Decimal::ONE);
        assert_eq!(shared.snapshot().max_position, Decimal::from(10));
    }

    #[test]
    fn credentials_require_both_halves() {
        let mut creds = BinanceCredentials::default();
        assert!(!creds.is_configured());
        creds.api_key = "k".to_string();
        assert!(!creds.is_configured());
        creds.api_secret = "s".to_string();
        assert!(creds.is_configured());
    }
}
