use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database Error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Connection Pool Error: {0}")]
    PoolError(String),

    #[error("Migration Error: {0}")]
    MigrationError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
