//! API configuration

use std::time::Duration;

use serde::Deserialize;

use domain_billing::{BillingConfig, MailboxConfig, RetryPolicy};
use infra_db::DatabaseConfig;

/// Where bills are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Postgres,
    /// Process-local store; state is lost on restart
    Memory,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Database pool size
    pub database_max_connections: u32,
    /// Log level
    pub log_level: String,
    /// Ledger store backend
    pub ledger_backend: LedgerBackend,
    /// Queue depth per bill
    pub mailbox_capacity: usize,
    /// How long a request waits for its orchestrator to answer
    pub command_timeout_ms: u64,
    pub retry_max_retries: usize,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let mailbox = MailboxConfig::default();
        let retry = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/billing".to_string(),
            database_max_connections: 10,
            log_level: "info".to_string(),
            ledger_backend: LedgerBackend::Postgres,
            mailbox_capacity: mailbox.capacity,
            command_timeout_ms: mailbox.ack_timeout.as_millis() as u64,
            retry_max_retries: retry.max_retries,
            retry_initial_delay_ms: retry.initial_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_*` environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Orchestration settings for the billing service
    pub fn billing(&self) -> BillingConfig {
        BillingConfig {
            mailbox: MailboxConfig {
                capacity: self.mailbox_capacity.max(1),
                ack_timeout: Duration::from_millis(self.command_timeout_ms),
            },
            retry: RetryPolicy::builder()
                .max_retries(self.retry_max_retries)
                .initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
                .max_delay(Duration::from_millis(self.retry_max_delay_ms))
                .build(),
        }
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.database_max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_billing_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.ledger_backend, LedgerBackend::Postgres);
        assert_eq!(config.billing(), BillingConfig::default());
    }

    #[test]
    fn test_billing_config_from_fields() {
        let config = ApiConfig {
            mailbox_capacity: 0,
            command_timeout_ms: 250,
            retry_max_retries: 1,
            ..ApiConfig::default()
        };

        let billing = config.billing();
        assert_eq!(billing.mailbox.capacity, 1);
        assert_eq!(billing.mailbox.ack_timeout, Duration::from_millis(250));
        assert_eq!(billing.retry.max_retries, 1);
    }

    #[test]
    fn test_backend_names() {
        let backend: LedgerBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(backend, LedgerBackend::Memory);
        assert!(serde_json::from_str::<LedgerBackend>("\"redis\"").is_err());
    }
}
