//! Engine construction.
//!
//! An [`Engine`] owns a driver-specific connection pool built from
//! [`DbSettings`]. The pooling strategy is keyed by the URL's driver: embedded
//! file databases get no pool, MySQL gets a bounded pool sized from the
//! settings, everything else uses the driver's defaults.

use crate::config::{DbSettings, PoolSettings};
use crate::error::{DbError, DbResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use std::str::FromStr;
use tracing::debug;

#[cfg(feature = "mysql")]
use sqlx::MySqlPool;
#[cfg(feature = "mysql")]
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
#[cfg(feature = "mysql")]
use tracing::info;

/// Supported database drivers, detected from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseDriver {
    Postgres,
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl DatabaseDriver {
    /// Detect the driver from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Get the display name for this driver.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Get the default port for this driver.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }
}

impl std::fmt::Display for DatabaseDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Pooling decision recorded on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    /// No connection pool: a single connection slot, no warm minimum.
    Unpooled,
    /// Bounded pool sized from the settings.
    Bounded { min: u32, max: u32 },
    /// Driver-default pool sizing.
    Default,
}

/// Choose the pooling strategy for a driver.
///
/// Embedded file databases are not pooled. MySQL gets the bounded pool only
/// when its driver is compiled in; without it engine construction rejects the
/// URL before this decision matters.
pub fn plan_strategy(driver: DatabaseDriver, pool: &PoolSettings) -> PoolStrategy {
    match driver {
        DatabaseDriver::Sqlite => PoolStrategy::Unpooled,
        DatabaseDriver::MySql if cfg!(feature = "mysql") => PoolStrategy::Bounded {
            min: pool.min_connections,
            max: pool.max_connections,
        },
        DatabaseDriver::MySql => PoolStrategy::Default,
        DatabaseDriver::Postgres => PoolStrategy::Default,
    }
}

/// Driver-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "mysql")]
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// A configured handle to a database endpoint, including pooling policy.
///
/// Created once and shared for the process lifetime; sessions borrow
/// connections from its pool per operation.
#[derive(Debug)]
pub struct Engine {
    pool: DbPool,
    driver: DatabaseDriver,
    strategy: PoolStrategy,
    masked_url: String,
}

impl Engine {
    /// Build an engine from settings.
    ///
    /// Connect failures surface as [`DbError::Connection`]; URL problems and
    /// missing drivers keep their own variants. No retries.
    pub async fn connect(settings: &DbSettings) -> DbResult<Engine> {
        let resolved = settings.resolve()?;
        let driver = DatabaseDriver::from_scheme(resolved.url.scheme())
            .ok_or_else(|| DbError::unsupported_driver(resolved.url.scheme()))?;
        let strategy = plan_strategy(driver, &resolved.pool);
        let masked_url = settings.masked_url();

        debug!(
            driver = %driver,
            strategy = ?strategy,
            url = %masked_url,
            "building engine"
        );

        // Connection recycle: cap connection lifetime on every driver.
        let recycle = resolved.pool.idle_timeout;

        let pool = match driver {
            DatabaseDriver::Sqlite => {
                let options = SqliteConnectOptions::from_str(resolved.url.as_str())
                    .map_err(|e| DbError::invalid_url(e.to_string()))?
                    .create_if_missing(true);

                let pool = SqlitePoolOptions::new()
                    .min_connections(0)
                    .max_connections(1)
                    .acquire_timeout(resolved.pool.acquire_timeout)
                    .max_lifetime(Some(recycle))
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        DbError::connection(format!("failed to open sqlite database: {}", e), None)
                    })?;
                DbPool::Sqlite(pool)
            }
            #[cfg(feature = "mysql")]
            DatabaseDriver::MySql => {
                info!(
                    min = resolved.pool.min_connections,
                    max = resolved.pool.max_connections,
                    "using bounded mysql connection pool"
                );

                let options = MySqlConnectOptions::from_str(resolved.url.as_str())
                    .map_err(|e| DbError::invalid_url(e.to_string()))?
                    .charset("utf8mb4");

                let pool = MySqlPoolOptions::new()
                    .min_connections(resolved.pool.min_connections)
                    .max_connections(resolved.pool.max_connections)
                    .idle_timeout(Some(resolved.pool.idle_timeout))
                    .acquire_timeout(resolved.pool.acquire_timeout)
                    .test_before_acquire(resolved.pool.test_before_acquire)
                    .max_lifetime(Some(recycle))
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        DbError::connection(format!("failed to connect to MySQL: {}", e), Some(e))
                    })?;
                DbPool::MySql(pool)
            }
            #[cfg(not(feature = "mysql"))]
            DatabaseDriver::MySql => return Err(DbError::driver_unavailable("mysql")),
            DatabaseDriver::Postgres => {
                let pool = PgPoolOptions::new()
                    .acquire_timeout(resolved.pool.acquire_timeout)
                    .test_before_acquire(resolved.pool.test_before_acquire)
                    .max_lifetime(Some(recycle))
                    .connect(resolved.url.as_str())
                    .await
                    .map_err(|e| {
                        DbError::connection(
                            format!("failed to connect to PostgreSQL: {}", e),
                            Some(e),
                        )
                    })?;
                DbPool::Postgres(pool)
            }
        };

        Ok(Engine {
            pool,
            driver,
            strategy,
            masked_url,
        })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get the driver this engine was built for.
    pub fn driver(&self) -> DatabaseDriver {
        self.driver
    }

    /// Get the pooling strategy in effect.
    pub fn strategy(&self) -> PoolStrategy {
        self.strategy
    }

    /// Get the display-safe connection URL.
    pub fn masked_url(&self) -> &str {
        &self.masked_url
    }

    /// Close the engine's pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_settings(min: u32, max: u32) -> PoolSettings {
        let mut settings = DbSettings::new("mysql://host/db");
        settings.min_pool_size = min;
        settings.max_pool_size = max;
        settings.resolve().unwrap().pool
    }

    #[test]
    fn test_driver_from_scheme() {
        assert_eq!(
            DatabaseDriver::from_scheme("postgres"),
            Some(DatabaseDriver::Postgres)
        );
        assert_eq!(
            DatabaseDriver::from_scheme("postgresql"),
            Some(DatabaseDriver::Postgres)
        );
        assert_eq!(
            DatabaseDriver::from_scheme("mysql"),
            Some(DatabaseDriver::MySql)
        );
        assert_eq!(
            DatabaseDriver::from_scheme("mariadb"),
            Some(DatabaseDriver::MySql)
        );
        assert_eq!(
            DatabaseDriver::from_scheme("sqlite"),
            Some(DatabaseDriver::Sqlite)
        );
        assert_eq!(DatabaseDriver::from_scheme("redis"), None);
    }

    #[test]
    fn test_driver_default_ports() {
        assert_eq!(DatabaseDriver::Postgres.default_port(), Some(5432));
        assert_eq!(DatabaseDriver::MySql.default_port(), Some(3306));
        assert_eq!(DatabaseDriver::Sqlite.default_port(), None);
    }

    #[test]
    fn test_sqlite_is_never_pooled() {
        let pool = pool_settings(5, 50);
        assert_eq!(
            plan_strategy(DatabaseDriver::Sqlite, &pool),
            PoolStrategy::Unpooled
        );
    }

    #[test]
    fn test_postgres_uses_default_pooling() {
        let pool = pool_settings(5, 50);
        assert_eq!(
            plan_strategy(DatabaseDriver::Postgres, &pool),
            PoolStrategy::Default
        );
    }

    #[test]
    #[cfg(feature = "mysql")]
    fn test_mysql_pool_is_bounded_by_settings() {
        let pool = pool_settings(2, 8);
        assert_eq!(
            plan_strategy(DatabaseDriver::MySql, &pool),
            PoolStrategy::Bounded { min: 2, max: 8 }
        );
    }

    #[test]
    #[cfg(not(feature = "mysql"))]
    fn test_mysql_without_driver_falls_back_to_default() {
        let pool = pool_settings(2, 8);
        assert_eq!(
            plan_strategy(DatabaseDriver::MySql, &pool),
            PoolStrategy::Default
        );
    }
}
