//! Transaction trait for atomic ledger writes.
//!
//! A command that touches more than one key (an entity blob and its index, a
//! table row and the applications index) stages every write in one
//! [`Transaction`] so that either all of them commit or none do.
//!
//! # Example
//!
//! ```
//! use brokerage_ledger_storage::{MemoryBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//!
//! let mut txn = backend.transaction().await.unwrap();
//! txn.compare_and_set(b"_things".to_vec(), None, br#"["t1"]"#.to_vec()).unwrap();
//! txn.set(b"t1".to_vec(), br#"{"id":"t1","description":"desk"}"#.to_vec());
//! txn.commit().await.unwrap();
//!
//! assert!(backend.get(b"t1").await.unwrap().is_some());
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Transaction handle for atomic multi-key commits.
///
/// Writes are buffered until [`commit`](Transaction::commit). Reads through
/// [`get`](Transaction::get) see the transaction's own pending writes.
///
/// # Concurrency
///
/// Conflict detection is optimistic. Preconditions registered with
/// [`compare_and_set`](Transaction::compare_and_set) are evaluated at commit
/// time; if any fails, nothing is applied and commit returns
/// [`StorageError::Conflict`](crate::StorageError::Conflict).
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Gets a value, consulting pending writes before the backend.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist or was deleted in this transaction
    /// - `Err(...)` on storage errors
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Buffers an unconditional set.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Buffers a delete.
    fn delete(&mut self, key: Vec<u8>);

    /// Buffers a conditional set.
    ///
    /// At commit time the current value of `key` must equal `expected`
    /// (`None` meaning "absent"), otherwise the whole transaction fails with
    /// [`Conflict`](crate::StorageError::Conflict).
    ///
    /// A later [`get`](Transaction::get) of `key` inside this transaction
    /// returns `new_value`.
    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Commits all buffered operations atomically.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) if a
    ///   precondition no longer holds
    /// - Other [`StorageError`](crate::StorageError) variants on backend failures
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
