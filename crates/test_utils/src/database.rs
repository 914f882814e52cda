//! PostgreSQL test harness
//!
//! Starts a throwaway PostgreSQL container, applies the ledger migrations,
//! and hands out stores and services wired to it. Tests using it need
//! Docker and are marked `#[ignore]`.

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use domain_billing::{BillingConfig, BillingService};
use infra_db::{create_pool, run_migrations, DatabaseConfig, DatabasePool, PostgresLedgerStore};

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "billing_test";

type HarnessError = Box<dyn std::error::Error + Send + Sync>;

/// Connection URL for the harness database on `host:port`
pub fn test_database_url(host: &str, port: u16) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{}",
        POSTGRES_USER, POSTGRES_PASSWORD, host, port, POSTGRES_DB
    )
}

/// A migrated ledger database running in a container
///
/// The container is stopped when this value is dropped.
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub url: String,
    pub pool: DatabasePool,
}

impl TestDatabase {
    /// Starts a container and applies the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or a migration fails
    pub async fn new() -> Result<Self, HarnessError> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();
        let url = test_database_url(&host, port);

        let config = DatabaseConfig::new(url.clone())
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30));
        let pool = create_pool(config).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    /// A ledger store over this database
    pub fn ledger_store(&self) -> PostgresLedgerStore {
        PostgresLedgerStore::new(self.pool.clone())
    }

    /// A billing service persisting to this database
    pub fn billing_service(&self, config: BillingConfig) -> BillingService {
        BillingService::new(Arc::new(self.ledger_store()), config)
    }
}

/// Creates an isolated test database for a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, HarnessError> {
    TestDatabase::new().await
}
