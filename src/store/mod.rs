//! Transactional data store abstraction
//!
//! The persisted store behind the tree and projection components is treated
//! as an abstract transactional engine: reads see a consistent snapshot, and
//! a transaction either commits every contained write or none of them. The
//! shipped implementation is [`MemStore`], an in-memory store with
//! snapshot-rollback semantics — the same memory-only posture the service
//! takes for all registry state. A persistent engine plugs in by
//! implementing [`Store`] elsewhere.

mod memory;
mod tables;

pub use memory::MemStore;
pub use tables::{
    EntityRow, FolderItemRow, FolderRow, Id, ItemKind, NoteRow, PlayerRow, Tables, PLAYER_TYPE,
};

use async_trait::async_trait;
use thiserror::Error;

/// Store-level failure. Rare by construction: row lookups that can miss go
/// through `Option` returns; this surfaces only genuinely unexpected state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A row expected to exist inside a transaction was gone
    #[error("row missing from table '{table}'")]
    MissingRow { table: &'static str },
}

/// Abstract transactional data store.
///
/// `transaction` serializes multi-step mutations: while a closure runs, no
/// concurrent reader observes a partially applied state, and an `Err` return
/// rolls every write back.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Run a read-only closure against a consistent view of the tables
    async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Tables) -> R + Send,
        R: Send;

    /// Run a closure as one atomic transaction. On `Err` the table state is
    /// restored exactly as it was before the closure ran.
    async fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Tables) -> Result<R, E> + Send,
        R: Send,
        E: Send;
}
