//! Session store trait and backends.

mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;

use crate::domain::{Session, SessionPatch, Stage};
use crate::Result;

/// Durable record of a session's identity and pipeline state.
///
/// All stage transitions go through [`SessionStore::compare_and_set_stage`]:
/// the store must refuse a writer whose expected stage no longer matches the
/// persisted one, so that under duplicate queue delivery only the first
/// successful handler invocation's result is kept. An unconditional
/// overwrite is not an acceptable implementation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Session>;

    /// Most recently created sessions, newest first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<Session>>;

    /// Atomically advance `stage` from `expected` to `new_stage`, applying
    /// `patch` in the same write. Returns `Ok(false)` when the persisted
    /// stage is no longer `expected` (a concurrent writer won), and
    /// `Err(NotFound)` when the session row is gone (deleted mid-flight).
    async fn compare_and_set_stage(
        &self,
        id: &str,
        expected: Stage,
        new_stage: Stage,
        patch: SessionPatch,
    ) -> Result<bool>;

    async fn delete(&self, id: &str) -> Result<()>;
}
