//! Adapter between bb8 and the sqlx::Postgres driver.
use derive_builder::Builder;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use bb8::ManageConnection;
use sqlx::ConnectOptions;

use super::value::{SqlValue, bind_values};
use crate::config::{CONNECT_TIMEOUT, DEFAULT_POOL_SIZE, DEFAULT_PORT, PING_TIMEOUT};
use crate::error::LoadError;

pub type Bb8Connection<'a> = bb8::PooledConnection<'a, ConnectionManager>;

/// SQL dialect spoken by the pool's backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    #[cfg(test)]
    Sqlite,
}

impl Dialect {
    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            #[cfg(test)]
            Dialect::Sqlite => "?".to_string(),
        }
    }
}

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Connection that can be either Postgres or SQLite.
///
/// Dropping it hands the connection back to its pool, so every store call
/// releases its connection on all exit paths.
pub enum PoolConnection {
    Postgres(Bb8Connection<'static>),
    #[cfg(test)]
    Sqlite(sqlx::pool::PoolConnection<sqlx::Sqlite>),
}

#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

/// Connection settings for the store
#[derive(Debug, Clone, Builder)]
pub struct PoolArgs {
    #[builder(setter(into))]
    host: String,
    #[builder(default = "DEFAULT_PORT")]
    port: u16,
    #[builder(setter(into))]
    username: String,
    #[builder(setter(into, strip_option), default)]
    password: Option<String>,
    #[builder(setter(into))]
    database: String,
    #[builder(default = "DEFAULT_POOL_SIZE")]
    max_pool_size: u32,
}

pub async fn pool(args: PoolArgs) -> Result<Pool, LoadError> {
    let PoolArgs {
        host,
        port,
        username,
        password,
        database,
        max_pool_size,
    } = args;

    let mut connect_options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&username)
        .database(&database);
    if let Some(password) = password {
        connect_options = connect_options.password(&password);
    }

    tracing::info!(host = %host, port, database = %database, max_pool_size, "connecting to store");

    // bb8 only connects lazily. Connect once up front so an unreachable
    // store fails here with the driver's own error.
    let conn_manager = ConnectionManager::new(connect_options);
    let conn = conn_manager.connect().await.map_err(LoadError::Connection)?;
    sqlx::Connection::close(conn).await.map_err(LoadError::Connection)?;

    let bb8_pool = bb8::Builder::new()
        .max_size(max_pool_size)
        .connection_timeout(CONNECT_TIMEOUT)
        .build(conn_manager)
        .await
        .map_err(LoadError::Connection)?;

    Ok(Pool {
        inner: PoolInner::Postgres(bb8_pool),
    })
}

fn run_error(e: bb8::RunError<sqlx::Error>) -> sqlx::Error {
    match e {
        bb8::RunError::User(e) => e,
        bb8::RunError::TimedOut => sqlx::Error::PoolTimedOut,
    }
}

impl Pool {
    /// Create an in-memory SQLite pool for testing.
    ///
    /// A single connection keeps per-connection pragmas such as
    /// `foreign_keys` deterministic.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    pub fn dialect(&self) -> Dialect {
        match &self.inner {
            PoolInner::Postgres(_) => Dialect::Postgres,
            #[cfg(test)]
            PoolInner::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub async fn acquire(&self) -> Result<PoolConnection, sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let conn = pool.get_owned().await.map_err(run_error)?;
                Ok(PoolConnection::Postgres(conn))
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let conn = pool.acquire().await?;
                Ok(PoolConnection::Sqlite(conn))
            }
        }
    }

    /// Execute a statement without parameters (DDL, maintenance)
    pub async fn execute_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => {
                sqlx::query(sql).execute(&mut *conn).await?;
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                sqlx::query(sql).execute(&mut *conn).await?;
            }
        }
        Ok(())
    }

    /// Execute one statement binding every value of every row in order
    pub async fn execute_rows(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<(), sqlx::Error> {
        match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => {
                let mut query = sqlx::query::<sqlx::Postgres>(sql);
                for row in rows {
                    query = bind_values(query, row);
                }
                query.execute(&mut *conn).await?;
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                let mut query = sqlx::query::<sqlx::Sqlite>(sql);
                for row in rows {
                    query = bind_values(query, row);
                }
                query.execute(&mut *conn).await?;
            }
        }
        Ok(())
    }

    /// Run a query returning a single integer (e.g. `SELECT COUNT(*)`)
    pub async fn fetch_count(&self, sql: &str) -> Result<i64, sqlx::Error> {
        let count = match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => {
                let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&mut *conn).await?;
                count
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&mut *conn).await?;
                count
            }
        };
        Ok(count)
    }
}

// Wrap the connect options so that we can implement the bb8::ManageConnection trait.
#[derive(Debug)]
pub struct ConnectionManager {
    connect_options: PgConnectOptions,
}

impl ConnectionManager {
    pub fn new(connect_options: PgConnectOptions) -> Self {
        Self { connect_options }
    }
}

impl bb8::ManageConnection for ConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        tokio::time::timeout(CONNECT_TIMEOUT, self.connect_options.connect())
            .await
            .map_err(|_| sqlx::Error::PoolTimedOut)?
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        tokio::time::timeout(PING_TIMEOUT, sqlx::Connection::ping(conn))
            .await
            // Convert tokio timeouts into sqlx pool timeouts. bb8 will retry a different connection on ping failure.
            .map_err(|_| sqlx::Error::PoolTimedOut)
            .and_then(|result| result)?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx::PgConnection provides no non-async way to check for closed/broken connections.
        false
    }
}
