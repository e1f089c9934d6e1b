//! In-memory store with snapshot-rollback transactions
//!
//! A single async mutex guards the table set, so every transaction runs to
//! completion before the next one starts. That is stronger than the minimum
//! the tree needs (serialization per folder sequence) and keeps the
//! contiguous-position invariant trivially safe under concurrency.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Store, Tables};

/// Memory-backed [`Store`] used by the server and by tests
#[derive(Debug, Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a seeding closure outside any transaction. Test and dev-mode
    /// convenience; production data arrives through the components.
    pub async fn seed<F>(&self, f: F)
    where
        F: FnOnce(&mut Tables),
    {
        let mut guard = self.tables.lock().await;
        f(&mut guard);
    }
}

#[async_trait]
impl Store for MemStore {
    async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Tables) -> R + Send,
        R: Send,
    {
        let guard = self.tables.lock().await;
        f(&guard)
    }

    async fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Tables) -> Result<R, E> + Send,
        R: Send,
        E: Send,
    {
        let mut guard = self.tables.lock().await;
        let snapshot = guard.clone();
        match f(&mut guard) {
            Ok(value) => Ok(value),
            Err(e) => {
                *guard = snapshot;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NoteRow;

    #[tokio::test]
    async fn test_transaction_commits_all_writes() {
        let store = MemStore::new();

        let id = store
            .transaction::<_, (), _>(|tables| {
                let id = tables.allocate_id();
                tables.notes.insert(
                    id,
                    NoteRow {
                        id,
                        title: "session zero".into(),
                        body: "everyone rolls stats".into(),
                        created_by: 1,
                    },
                );
                Ok(id)
            })
            .await
            .unwrap();

        let title = store
            .read(|tables| tables.notes.get(&id).map(|n| n.title.clone()))
            .await;
        assert_eq!(title.as_deref(), Some("session zero"));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_every_write_on_error() {
        let store = MemStore::new();
        store
            .seed(|tables| {
                let id = tables.allocate_id();
                tables.notes.insert(
                    id,
                    NoteRow {
                        id,
                        title: "keep me".into(),
                        body: String::new(),
                        created_by: 1,
                    },
                );
            })
            .await;

        let result: Result<(), &str> = store
            .transaction(|tables| {
                // First write succeeds, then the transaction aborts
                let id = tables.allocate_id();
                tables.notes.insert(
                    id,
                    NoteRow {
                        id,
                        title: "phantom".into(),
                        body: String::new(),
                        created_by: 1,
                    },
                );
                tables.notes.clear();
                Err("boom")
            })
            .await;

        assert_eq!(result, Err("boom"));

        // The pre-transaction state is restored exactly
        let titles = store
            .read(|tables| tables.notes.values().map(|n| n.title.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(titles, vec!["keep me".to_string()]);
    }
}
