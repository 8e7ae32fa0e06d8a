//! DuckDB and DuckLake connection driver.
//!
//! A [`Connection`] owns one engine handle and its transaction state. Opening
//! one runs a fixed setup pipeline derived from the [`Config`]: extensions are
//! installed and loaded, secrets created, external databases attached and,
//! for a `ducklake:` path, the lakehouse catalog attached last.
//!
//! # Features
//!
//! - **Validated config**: [`Options`] deserializes from TOML or JSON and is
//!   checked up front, secrets included
//! - **Tagged setup failures**: errors name the stage and component that failed
//! - **Transaction state machine**: `Idle`, `InTransaction`, `Errored`, with
//!   misuse reported instead of silently ignored
//! - **Pooling**: a semaphore-bounded pool that runs engine work on blocking
//!   threads
//!
//! # Example
//!
//! ```rust,no_run
//! use ducklake_driver::{Config, Options, Pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options: Options = serde_json::from_str(
//!         r#"{
//!             "path": "ducklake:metadata.ducklake",
//!             "data_path": "s3://my-bucket/lake/",
//!             "extensions": ["httpfs"],
//!             "secrets": [{
//!                 "name": "lake_s3",
//!                 "type": "s3",
//!                 "key_id": "AKIA...",
//!                 "secret": "...",
//!                 "region": "us-east-1"
//!             }]
//!         }"#,
//!     )?;
//!
//!     let pool = Pool::new(Config::from_options(options)?).await?;
//!     let mut conn = pool.get().await?;
//!
//!     conn.begin().await?;
//!     conn.execute("CREATE TABLE metadata.events (id BIGINT, kind VARCHAR)", vec![])
//!         .await?;
//!     conn.commit().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod pipeline;
pub mod pool;
pub mod types;

pub use config::{AccessMode, Config, ConfigBuilder, DatabasePath, Options};
pub use connection::{Connection, ConnectionState};
pub use error::{DriverError, DriverResult, EngineError};
pub use handle::{DuckDbHandle, EngineHandle, QueryOutput};
pub use pipeline::{Stage, Step};
pub use pool::{Pool, PoolStatus, PooledConnection};
pub use types::Param;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{Config, Options};
    pub use crate::connection::{Connection, ConnectionState};
    pub use crate::error::{DriverError, DriverResult};
    pub use crate::handle::QueryOutput;
    pub use crate::pool::{Pool, PooledConnection};
    pub use crate::types::Param;
}
