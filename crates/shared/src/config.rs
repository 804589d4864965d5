//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Bank-feed reconciliation settings.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://tally.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

/// How the aggregation provider signs amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Positive provider amounts are money leaving the account.
    #[default]
    PositiveIsDebit,
    /// Provider amounts already use the ledger convention (negative = debit).
    NegativeIsDebit,
}

/// What a sync pass does when a bank row had several equally good candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Resolve with the deterministic tie-break order and report the ambiguity.
    #[default]
    TieBreak,
    /// Fail the pass without applying anything.
    Reject,
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReconciliationConfig {
    /// Maximum distance in days between a bank row and a manual row.
    #[serde(default = "default_date_window_days")]
    pub date_window_days: u32,
    /// Provider sign convention.
    #[serde(default)]
    pub sign_convention: SignConvention,
    /// Rank candidates by payee similarity before insertion order.
    #[serde(default = "default_payee_tiebreak")]
    pub payee_tiebreak: bool,
    /// Ambiguity handling.
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            date_window_days: default_date_window_days(),
            sign_convention: SignConvention::default(),
            payee_tiebreak: default_payee_tiebreak(),
            ambiguity: AmbiguityPolicy::default(),
        }
    }
}

fn default_date_window_days() -> u32 {
    3
}

fn default_payee_tiebreak() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info,sqlx=warn".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
