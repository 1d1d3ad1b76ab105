//! Key/value ledger trait definition.
//!
//! [`StorageBackend`] is the key/value half of the ledger collaborator. The
//! records layer never talks to a concrete ledger; it is generic over this
//! trait, and the table abstraction in [`crate::table`] is layered on top of
//! it as well.
//!
//! # Design
//!
//! - **Keys and values are bytes**: no assumptions about serialization format
//! - **Async**: the production ledger is remote
//! - **Conditional writes**: [`compare_and_set`](StorageBackend::compare_and_set) is the
//!   primitive that turns read-modify-write cycles into conflict-detecting writes
//! - **Transactional**: atomic multi-key writes via [`Transaction`]

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, transaction::Transaction};

/// Abstract key/value ledger.
///
/// Implementations must be `Send + Sync` and linearizable per key.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`set`](StorageBackend::set) | Store a key-value pair |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Atomic compare-and-swap |
/// | [`delete`](StorageBackend::delete) | Remove a key |
/// | [`transaction`](StorageBackend::transaction) | Begin an atomic transaction |
/// | [`health_check`](StorageBackend::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use brokerage_ledger_storage::{StorageBackend, MemoryBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"_users".to_vec(), b"[]".to_vec()).await.unwrap();
/// let value = backend.get(b"_users").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("[]")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically sets a key's value if it matches the expected current value.
    ///
    /// - **`expected: None`**: insert-if-absent. Fails with
    ///   [`Conflict`](crate::StorageError::Conflict) if any value is present.
    /// - **`expected: Some(value)`**: update-if-unchanged. Fails with
    ///   [`Conflict`](crate::StorageError::Conflict) if the key is absent or holds
    ///   different bytes.
    ///
    /// The comparison is exact and length-sensitive. Values that are serialized
    /// structures must therefore be produced by a deterministic serializer
    /// (struct fields, `Vec`, `BTreeMap`).
    ///
    /// `Conflict` is never retried here; the caller re-reads and decides.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use brokerage_ledger_storage::{MemoryBackend, StorageBackend};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let backend = MemoryBackend::new();
    /// backend.compare_and_set(b"_things", None, br#"["t1"]"#.to_vec()).await?;
    ///
    /// // Stale expectation: fails with Conflict
    /// let result = backend.compare_and_set(b"_things", Some(b"[]"), br#"["t2"]"#.to_vec()).await;
    /// assert!(result.is_err());
    /// # Ok(())
    /// # }
    /// ```
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Deletes a key. Deleting an absent key is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Begins a new transaction.
    #[must_use = "transactions must be committed to take effect"]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Verifies that the backend can serve requests.
    async fn health_check(&self) -> StorageResult<()>;
}
