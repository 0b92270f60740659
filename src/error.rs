use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Missing or invalid connection parameters. Raised before any page is fetched.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database pool is not initialized")]
    PoolUnavailable,

    #[error("failed to create venues table: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("page {page} failed: {source}")]
    Adapter {
        page: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The page source could not be built (bad selector, client setup).
    #[error("page source setup failed: {0}")]
    Setup(#[source] anyhow::Error),

    #[error("interrupted by shutdown signal")]
    Interrupted,
}

impl CrawlError {
    /// Store unreachable, auth failure, or no pool where one is required.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            CrawlError::Connection { .. } | CrawlError::PoolUnavailable
        )
    }
}
