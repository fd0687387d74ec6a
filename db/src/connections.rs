use diesel::{Connection, PgConnection};
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::{env, time::Duration};
use tracing::info;

use crate::error::{StoreError, StoreResult};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

const DEFAULT_MAX_POOL_SIZE: usize = 8;
const POOL_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DatabaseConnections {
    pub postgres: Pool<AsyncPgConnection>,
}

impl DatabaseConnections {
    fn run_migrations(db_url: &str) -> anyhow::Result<usize> {
        let mut conn = PgConnection::establish(db_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(applied.len())
    }

    pub fn postgres_pool(db_url: String) -> StoreResult<Pool<AsyncPgConnection>> {
        let config = AsyncDieselConnectionManager::new(db_url);
        let max_pool_size = match env::var("MAX_POOL_SIZE") {
            Ok(size) => size.parse().map_err(|_| {
                StoreError::ConfigError(format!("MAX_POOL_SIZE is not a number: {}", size))
            })?,
            Err(_) => DEFAULT_MAX_POOL_SIZE,
        };
        Pool::builder(config)
            .max_size(max_pool_size)
            .runtime(deadpool::Runtime::Tokio1)
            .wait_timeout(Some(POOL_WAIT_TIMEOUT))
            .build()
            .map_err(|e| StoreError::PoolError(e.to_string()))
    }

    /// Reads `DATABASE_URL`, substituting `$(POSTGRES_USER)` and
    /// `$(POSTGRES_PASSWORD)` placeholders from the environment.
    pub fn database_url() -> StoreResult<String> {
        let mut db_url = env::var("DATABASE_URL")
            .map_err(|_| StoreError::ConfigError("DATABASE_URL must be set".to_string()))?;

        if db_url.contains("$(POSTGRES_USER)") {
            let postgres_user = env::var("POSTGRES_USER")
                .map_err(|_| StoreError::ConfigError("POSTGRES_USER must be set".to_string()))?;
            db_url = db_url.replace("$(POSTGRES_USER)", &postgres_user);
        }
        if db_url.contains("$(POSTGRES_PASSWORD)") {
            let postgres_password = env::var("POSTGRES_PASSWORD").map_err(|_| {
                StoreError::ConfigError("POSTGRES_PASSWORD must be set".to_string())
            })?;
            db_url = db_url.replace("$(POSTGRES_PASSWORD)", &postgres_password);
        }

        Ok(db_url)
    }

    async fn init_postgres(db_url: String) -> StoreResult<Pool<AsyncPgConnection>> {
        let migrations_url = db_url.clone();
        let applied = tokio::task::spawn_blocking(move || Self::run_migrations(&migrations_url))
            .await
            .map_err(|e| StoreError::MigrationError(e.to_string()))?
            .map_err(|e| StoreError::MigrationError(e.to_string()))?;
        info!("applied {} pending migrations", applied);

        let pool = Self::postgres_pool(db_url)?;

        // Fail at startup rather than on the first batch write.
        let _conn = pool
            .get()
            .await
            .map_err(|e| StoreError::PoolError(e.to_string()))?;

        Ok(pool)
    }

    pub async fn init() -> StoreResult<Self> {
        Ok(Self {
            postgres: Self::init_postgres(Self::database_url()?).await?,
        })
    }
}
