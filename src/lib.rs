//! Session handling for SQL backends.
//!
//! This library lazily configures a database engine (a connection pool with a
//! driver-keyed pooling strategy) and a session factory, and hands out
//! per-request unit-of-work sessions whose query and flush operations
//! translate driver errors into one application-level error kind.
//!
//! ```no_run
//! use db_session::{DbSettings, SessionOptions, get_session};
//!
//! # async fn example() -> db_session::DbResult<()> {
//! let settings = DbSettings::new("sqlite:app.db");
//! let mut session = get_session(&settings, SessionOptions::default()).await?;
//! session.stage("INSERT INTO items (name) VALUES (?)", vec!["widget".into()]);
//! session.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;

pub use config::{DbSettings, PoolSettings};
pub use db::{Engine, Session, SessionFactory, SessionOptions, SqlParam, get_session};
pub use error::{DbError, DbResult};
