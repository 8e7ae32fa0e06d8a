//! Connection pool.
//!
//! Checkout is bounded by a semaphore sized from [`Config::pool_size`]:
//! one connection outside lakehouse mode, several independent handles in
//! lakehouse mode. Engine work runs on tokio's blocking threads.
//!
//! A blocking task owns the connection until it finishes, even when the
//! future that started it is dropped, and checks it back in itself. The
//! checkout permit is held until then, so a cancelled call never lets a
//! second connection open against the same database.
//!
//! A connection checked back in while a transaction is open or failed is
//! rolled back and reused.

use std::sync::Arc;

use ducklake_sql::{DdlOp, Statement};
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionState};
use crate::error::{DriverError, DriverResult};
use crate::handle::QueryOutput;
use crate::types::Param;

/// A pool of DuckDB connections sharing one config.
#[derive(Clone)]
pub struct Pool {
    config: Arc<Config>,
    /// Idle connections.
    connections: Arc<Mutex<Vec<Connection>>>,
    semaphore: Arc<Semaphore>,
}

impl Pool {
    /// Create a pool and open its first connection, so a bad config or a
    /// failing setup step is reported here.
    pub async fn new(config: Config) -> DriverResult<Self> {
        info!(
            pool_size = config.pool_size,
            path = %config.path.display(),
            "Creating DuckDB connection pool"
        );

        let pool = Self {
            semaphore: Arc::new(Semaphore::new(config.pool_size)),
            config: Arc::new(config),
            connections: Arc::new(Mutex::new(Vec::new())),
        };

        let conn = pool.create_connection().await?;
        pool.connections.lock().push(conn);

        Ok(pool)
    }

    /// Get a connection from the pool, waiting for one to free up.
    pub async fn get(&self) -> DriverResult<PooledConnection> {
        debug!("Acquiring connection from pool");

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DriverError::pool(format!("Failed to acquire semaphore: {}", e)))?;

        let idle = self.connections.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.create_connection().await?,
        };

        Ok(PooledConnection {
            checkout: Arc::new(Checkout {
                slot: Mutex::new(Slot {
                    conn: Some(conn),
                    permit: Some(permit),
                    busy: false,
                    released: false,
                }),
                done: Notify::new(),
            }),
            pool: self.clone(),
        })
    }

    async fn create_connection(&self) -> DriverResult<Connection> {
        debug!("Creating new DuckDB connection");
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || Connection::connect(config))
            .await
            .map_err(|e| DriverError::internal(format!("Task join error: {}", e)))?
    }

    fn return_connection(&self, mut conn: Connection) {
        if conn.status() != ConnectionState::Idle {
            debug!(state = %conn.status(), "Rolling back connection checked in mid-transaction");
            if let Err(e) = conn.rollback() {
                warn!(error = %e, "Rollback at checkin failed");
            }
        }
        self.connections.lock().push(conn);
    }

    /// Get pool status.
    pub fn status(&self) -> PoolStatus {
        let available = self.connections.lock().len();
        let permits = self.semaphore.available_permits();

        PoolStatus {
            max_connections: self.config.pool_size,
            available_connections: available,
            available_permits: permits,
            in_use: self.config.pool_size - permits,
        }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .finish()
    }
}

/// Pool status information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// Maximum connections in the pool.
    pub max_connections: usize,
    /// Idle connections held by the pool.
    pub available_connections: usize,
    /// Available permits.
    pub available_permits: usize,
    /// Connections currently checked out.
    pub in_use: usize,
}

/// State shared between a checkout and the blocking task using it.
struct Checkout {
    slot: Mutex<Slot>,
    /// Signalled whenever a blocking task hands the connection back.
    done: Notify,
}

struct Slot {
    conn: Option<Connection>,
    permit: Option<OwnedSemaphorePermit>,
    /// A blocking task holds the connection.
    busy: bool,
    /// The guard was dropped while `busy`; the task checks in.
    released: bool,
}

impl Slot {
    /// Hand the connection and permit back to the pool, permit last.
    fn check_in(&mut self, pool: &Pool) {
        let permit = self.permit.take();
        if let Some(conn) = self.conn.take() {
            pool.return_connection(conn);
        }
        drop(permit);
    }
}

/// A connection checked out of the pool.
///
/// Returned to the pool on drop, rolled back first if a transaction is
/// still open. If a blocking task is still running the return happens when
/// it finishes.
pub struct PooledConnection {
    checkout: Arc<Checkout>,
    pool: Pool,
}

impl PooledConnection {
    /// The underlying connection, for synchronous use.
    ///
    /// Fails while a cancelled [`run`](Self::run) is still finishing.
    pub fn connection(&mut self) -> DriverResult<&mut Connection> {
        let checkout = Arc::get_mut(&mut self.checkout)
            .ok_or_else(|| DriverError::pool("connection is in use by a blocking task"))?;
        checkout.slot.get_mut().conn.as_mut().ok_or_else(lost)
    }

    /// Transaction state of the underlying connection.
    pub fn status(&self) -> DriverResult<ConnectionState> {
        let slot = self.checkout.slot.lock();
        match &slot.conn {
            Some(conn) => Ok(conn.status()),
            None if slot.busy => Err(DriverError::pool("connection is in use by a blocking task")),
            None => Err(lost()),
        }
    }

    /// Take the connection, waiting for a blocking task left over from a
    /// cancelled call to hand it back.
    async fn acquire(&self) -> DriverResult<Connection> {
        loop {
            let done = self.checkout.done.notified();
            {
                let mut slot = self.checkout.slot.lock();
                if let Some(conn) = slot.conn.take() {
                    slot.busy = true;
                    return Ok(conn);
                }
                if !slot.busy {
                    return Err(lost());
                }
            }
            done.await;
        }
    }

    /// Run `f` against the connection on a blocking thread.
    ///
    /// Dropping the returned future does not stop `f`; the connection comes
    /// back once it returns. If the closure panics the connection is lost
    /// and every later call returns an internal error.
    pub async fn run<F, T>(&mut self, f: F) -> DriverResult<T>
    where
        F: FnOnce(&mut Connection) -> DriverResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = InFlight {
            conn: Some(self.acquire().await?),
            checkout: self.checkout.clone(),
            pool: self.pool.clone(),
        };

        tokio::task::spawn_blocking(move || {
            let conn = task.conn.as_mut().ok_or_else(lost)?;
            f(conn)
        })
        .await
        .map_err(|e| DriverError::internal(format!("Task join error: {}", e)))?
    }

    /// Execute a statement.
    pub async fn execute(
        &mut self,
        sql: impl Into<String>,
        params: Vec<Param>,
    ) -> DriverResult<QueryOutput> {
        let sql = sql.into();
        self.run(move |conn| conn.execute(&sql, &params)).await
    }

    /// Compile and execute a statement.
    pub async fn execute_statement(
        &mut self,
        statement: Statement,
        params: Vec<Param>,
    ) -> DriverResult<QueryOutput> {
        self.run(move |conn| conn.execute_statement(&statement, &params))
            .await
    }

    /// Compile and run a DDL operation.
    pub async fn execute_ddl(&mut self, op: DdlOp) -> DriverResult<()> {
        self.run(move |conn| conn.execute_ddl(&op)).await
    }

    pub async fn begin(&mut self) -> DriverResult<()> {
        self.run(Connection::begin).await
    }

    pub async fn commit(&mut self) -> DriverResult<()> {
        self.run(Connection::commit).await
    }

    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.run(Connection::rollback).await
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let mut slot = self.checkout.slot.lock();
        if slot.busy {
            slot.released = true;
        } else {
            slot.check_in(&self.pool);
        }
    }
}

/// The connection while a blocking task owns it.
///
/// Dropped on the blocking thread when the task ends, whether or not
/// anyone still awaits it.
struct InFlight {
    conn: Option<Connection>,
    checkout: Arc<Checkout>,
    pool: Pool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let conn = self.conn.take();
        let mut slot = self.checkout.slot.lock();
        slot.busy = false;
        if std::thread::panicking() {
            warn!("Dropping connection after a panic in a blocking task");
            drop(conn);
        } else {
            slot.conn = conn;
        }
        if slot.released {
            slot.check_in(&self.pool);
        }
        drop(slot);
        self.checkout.done.notify_one();
    }
}

fn lost() -> DriverError {
    DriverError::internal("connection was lost by a panicking task")
}
