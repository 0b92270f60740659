use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::{debug, error, info};

use crate::error::CrawlError;
use crate::settings::DatabaseSettings;
use crate::venue::Venue;

const DEFAULT_PG_PORT: u16 = 5432;
const MAX_CONNECTIONS: u32 = 10;

const PG_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS venues (
        id          SERIAL PRIMARY KEY,
        name        TEXT,
        location    TEXT,
        price       TEXT,
        capacity    TEXT,
        rating      DOUBLE PRECISION,
        reviews     INTEGER,
        description TEXT,
        scraped_at  TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,
        CONSTRAINT unique_venue_name_location UNIQUE (name, location)
    )";

const SQLITE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS venues (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT,
        location    TEXT,
        price       TEXT,
        capacity    TEXT,
        rating      REAL,
        reviews     INTEGER,
        description TEXT,
        scraped_at  TEXT DEFAULT CURRENT_TIMESTAMP,
        CONSTRAINT unique_venue_name_location UNIQUE (name, location)
    )";

// `$n` placeholders bind positionally on both backends.
const INSERT_VENUE: &str = "
    INSERT INTO venues (name, location, price, capacity, rating, reviews, description)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (name, location) DO NOTHING";

// ── Connection parameters ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    fn from_url(url: &str) -> Result<Backend, CrawlError> {
        match url.split(':').next().unwrap_or_default() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(CrawlError::Configuration(format!(
                "unsupported database scheme '{}'",
                other
            ))),
        }
    }

    fn schema(self) -> &'static str {
        match self {
            Backend::Postgres => PG_SCHEMA,
            Backend::Sqlite => SQLITE_SCHEMA,
        }
    }
}

/// A resolved connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    url: String,
    backend: Backend,
}

impl ConnectParams {
    /// The full URL when present, else built from the discrete parts.
    pub fn resolve(db: &DatabaseSettings) -> Result<ConnectParams, CrawlError> {
        let url = match db.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => {
                debug!("DATABASE_URL not set, building from discrete parameters");
                let (Some(user), Some(password), Some(name), Some(host)) = (
                    db.user.as_deref(),
                    db.password.as_deref(),
                    db.name.as_deref(),
                    db.host.as_deref(),
                ) else {
                    return Err(CrawlError::Configuration(
                        "missing database parameters: need DATABASE_URL or PGUSER, \
                         PGPASSWORD, PGDATABASE and PGHOST"
                            .into(),
                    ));
                };
                format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    urlencoding::encode(user),
                    urlencoding::encode(password),
                    host,
                    db.port.unwrap_or(DEFAULT_PG_PORT),
                    name
                )
            }
        };
        let backend = Backend::from_url(&url)?;
        Ok(ConnectParams { url, backend })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// The URL with any password masked, safe for logs and errors.
    pub fn redacted(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut u) if u.password().is_some() => {
                let _ = u.set_password(Some("********"));
                u.to_string()
            }
            Ok(u) => u.to_string(),
            Err(_) => "<unparseable database url>".to_string(),
        }
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("url", &self.redacted())
            .field("backend", &self.backend)
            .finish()
    }
}

// ── Pool lifecycle ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Uninitialized,
    Initializing,
    Ready,
}

enum PoolState {
    Uninitialized,
    Initializing,
    Ready { pool: AnyPool, backend: Backend },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialized {
    Created,
    AlreadyReady,
}

/// Owned handle to the venue store's connection pool.
///
/// The owner initializes and closes it (`&mut`); persistence calls only
/// borrow it. Closing returns it to `Uninitialized`.
pub struct PoolHandle {
    state: PoolState,
}

impl PoolHandle {
    pub fn new() -> Self {
        PoolHandle {
            state: PoolState::Uninitialized,
        }
    }

    pub fn status(&self) -> PoolStatus {
        match self.state {
            PoolState::Uninitialized => PoolStatus::Uninitialized,
            PoolState::Initializing => PoolStatus::Initializing,
            PoolState::Ready { .. } => PoolStatus::Ready,
        }
    }

    /// Connect and create the schema. A no-op if already ready.
    /// On failure the handle is left uninitialized.
    pub async fn initialize(&mut self, params: &ConnectParams) -> Result<Initialized, CrawlError> {
        if let PoolState::Ready { .. } = self.state {
            debug!("Database pool already initialized");
            return Ok(Initialized::AlreadyReady);
        }

        self.state = PoolState::Initializing;
        match connect(params).await {
            Ok(pool) => {
                self.state = PoolState::Ready {
                    pool,
                    backend: params.backend,
                };
                Ok(Initialized::Created)
            }
            Err(e) => {
                self.state = PoolState::Uninitialized;
                error!("Could not initialize database pool: {}", e);
                Err(e)
            }
        }
    }

    pub fn pool(&self) -> Result<&AnyPool, CrawlError> {
        match &self.state {
            PoolState::Ready { pool, .. } => Ok(pool),
            _ => Err(CrawlError::PoolUnavailable),
        }
    }

    pub fn backend(&self) -> Option<Backend> {
        match self.state {
            PoolState::Ready { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// Release all connections. Safe to call repeatedly or before initialize.
    pub async fn close(&mut self) {
        match std::mem::replace(&mut self.state, PoolState::Uninitialized) {
            PoolState::Ready { pool, .. } => {
                pool.close().await;
                info!("Database connection pool closed");
            }
            _ => debug!("Database pool not open, nothing to close"),
        }
    }
}

impl Default for PoolHandle {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect(params: &ConnectParams) -> Result<AnyPool, CrawlError> {
    install_default_drivers();
    info!("Connecting to database: {}", params.redacted());

    let pool = AnyPoolOptions::new()
        .min_connections(1)
        .max_connections(MAX_CONNECTIONS)
        .connect(&params.url)
        .await
        .map_err(|source| CrawlError::Connection {
            target: params.redacted(),
            source,
        })?;
    info!("Database connection pool created");

    if let Err(e) = ensure_schema(&pool, params.backend).await {
        pool.close().await;
        return Err(e);
    }
    Ok(pool)
}

/// Create the venues table if absent. Idempotent.
pub async fn ensure_schema(pool: &AnyPool, backend: Backend) -> Result<(), CrawlError> {
    sqlx::query(backend.schema())
        .execute(pool)
        .await
        .map_err(CrawlError::Schema)?;
    debug!("'venues' table checked/created");
    Ok(())
}

// ── Venues ──

/// Insert venues, skipping any (name, location) already stored.
///
/// Returns how many venues were submitted, not how many rows were new.
/// A failed batch is rolled back, logged, and reported as 0.
pub async fn save_venues(handle: &PoolHandle, venues: &[Venue]) -> Result<usize, CrawlError> {
    let pool = handle.pool()?;
    if venues.is_empty() {
        info!("No venues to save to database");
        return Ok(0);
    }

    match insert_batch(pool, venues).await {
        Ok(()) => {
            info!(
                "{} venues processed for database insertion/conflict check",
                venues.len()
            );
            Ok(venues.len())
        }
        Err(e) => {
            error!("Batch insert into 'venues' failed: {:?}", e);
            Ok(0)
        }
    }
}

async fn insert_batch(pool: &AnyPool, venues: &[Venue]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for v in venues {
        sqlx::query(INSERT_VENUE)
            .bind(v.name.as_str())
            .bind(v.location.as_str())
            .bind(v.price.as_str())
            .bind(v.capacity.as_str())
            .bind(v.stored_rating())
            .bind(v.stored_reviews())
            .bind(v.description.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

pub async fn count_venues(handle: &PoolHandle) -> Result<i64, CrawlError> {
    let pool = handle.pool()?;
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM venues")
        .fetch_one(pool)
        .await
        .map_err(CrawlError::Query)?;
    Ok(n)
}
