//! Database layer: engine construction, session handling, and the
//! process-wide accessor that lazily initializes both.

pub mod engine;
pub mod rows;
pub mod session;

pub use engine::{DatabaseDriver, DbPool, Engine, PoolStrategy, plan_strategy};
pub use rows::SqlParam;
pub use session::{Session, SessionFactory, SessionOptions};

use crate::config::DbSettings;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Process-wide factory, initialized by the first successful `get_session`.
/// The factory owns the engine, so the two are cached both-or-neither.
static SHARED_FACTORY: OnceCell<SessionFactory> = OnceCell::const_new();

/// Return a session from the process-wide factory.
///
/// The first call constructs the engine and the factory and caches them for
/// the process lifetime; the settings and options of later callers are
/// ignored. Initialization is single-flight: concurrent first calls race, one
/// wins, and the rest observe its result. A failed initialization leaves
/// nothing cached, so a later call may retry.
pub async fn get_session(settings: &DbSettings, options: SessionOptions) -> DbResult<Session> {
    let factory = SHARED_FACTORY
        .get_or_try_init(|| async {
            let engine = Arc::new(Engine::connect(settings).await?);
            Ok::<_, DbError>(SessionFactory::new(engine, options))
        })
        .await?;
    Ok(factory.session())
}

/// Get the process-wide factory, if `get_session` has initialized it.
pub fn shared_factory() -> Option<&'static SessionFactory> {
    SHARED_FACTORY.get()
}
