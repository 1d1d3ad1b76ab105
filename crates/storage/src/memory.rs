//! In-memory ledger implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] used for development and tests. Table rows live in the
//! same map as key/value blobs (see [`crate::table`]), so one transaction can
//! cover both.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Linearizable per key**: every operation runs under the map lock
//! - **Transaction support**: buffered writes with read-your-writes and
//!   compare-and-set preconditions checked at commit
//!
//! # Example
//!
//! ```
//! use brokerage_ledger_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"t1".to_vec(), br#"{"id":"t1"}"#.to_vec()).await.unwrap();
//!     let value = backend.get(b"t1").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), br#"{"id":"t1"}"#);
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - No replication or consensus

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    transaction::Transaction,
};

/// In-memory ledger using a [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

fn precondition_holds(expected: Option<&[u8]>, current: Option<&Bytes>) -> bool {
    match (expected, current) {
        (None, None) => true,
        (Some(exp), Some(cur)) => exp == &cur[..],
        _ => false,
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip(self, key), fields(key_len = key.len()))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let data = self.data.read();
        Ok(data.get(key).cloned())
    }

    #[tracing::instrument(skip(self, key, value), fields(key_len = key.len(), value_len = value.len()))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write();
        data.insert(key, Bytes::from(value));
        Ok(())
    }

    #[tracing::instrument(skip(self, key, expected, new_value), fields(key_len = key.len()))]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        let mut data = self.data.write();

        if !precondition_holds(expected, data.get(key)) {
            return Err(StorageError::conflict());
        }

        data.insert(key.to_vec(), Bytes::from(new_value));
        Ok(())
    }

    #[tracing::instrument(skip(self, key), fields(key_len = key.len()))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.remove(key);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        // Acquiring the read lock proves the map is not wedged.
        let _unused = self.data.read();
        Ok(())
    }
}

/// A compare-and-set precondition to be verified at commit time.
#[derive(Debug, Clone)]
struct CasPrecondition {
    key: Vec<u8>,
    expected: Option<Vec<u8>>,
}

/// In-memory transaction.
///
/// Buffers writes and deletes until commit, providing read-your-writes
/// semantics within the transaction.
struct MemoryTransaction {
    backend: MemoryBackend,
    pending_writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    preconditions: Vec<CasPrecondition>,
}

impl MemoryTransaction {
    fn new(backend: MemoryBackend) -> Self {
        Self { backend, pending_writes: BTreeMap::new(), preconditions: Vec::new() }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if let Some(value) = self.pending_writes.get(key) {
            return Ok(value.as_ref().map(|v| Bytes::copy_from_slice(v)));
        }

        self.backend.get(key).await
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending_writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.pending_writes.insert(key, None);
    }

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        // A key already written in this transaction is checked against the
        // staged value now; the committed value is checked at commit.
        match self.pending_writes.get(&key) {
            Some(staged) => {
                if staged.as_deref() != expected.as_deref() {
                    return Err(StorageError::conflict());
                }
            },
            None => self.preconditions.push(CasPrecondition { key: key.clone(), expected }),
        }

        self.pending_writes.insert(key, Some(new_value));
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut data = self.backend.data.write();

        for cas in &self.preconditions {
            if !precondition_holds(cas.expected.as_deref(), data.get(&cas.key)) {
                tracing::debug!(key_len = cas.key.len(), "transaction precondition failed");
                return Err(StorageError::conflict());
            }
        }

        for (key, value) in self.pending_writes {
            match value {
                Some(v) => {
                    data.insert(key, Bytes::from(v));
                },
                None => {
                    data.remove(&key);
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let backend = MemoryBackend::new();

        backend.set(b"key1".to_vec(), b"value1".to_vec()).await.unwrap();
        let value = backend.get(b"key1").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value1")));

        backend.delete(b"key1").await.unwrap();
        let value = backend.get(b"key1").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_noop() {
        let backend = MemoryBackend::new();
        backend.delete(b"never-written").await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_transaction() {
        let backend = MemoryBackend::new();

        backend.set(b"key1".to_vec(), b"value1".to_vec()).await.unwrap();

        let mut txn = backend.transaction().await.unwrap();

        let value = txn.get(b"key1").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value1")));

        txn.set(b"key2".to_vec(), b"value2".to_vec());

        // Read-your-writes
        let value = txn.get(b"key2").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value2")));

        txn.delete(b"key1".to_vec());
        let value = txn.get(b"key1").await.unwrap();
        assert_eq!(value, None);

        // Nothing visible before commit
        assert_eq!(backend.get(b"key2").await.unwrap(), None);

        txn.commit().await.unwrap();

        assert_eq!(backend.get(b"key1").await.unwrap(), None);
        assert_eq!(backend.get(b"key2").await.unwrap(), Some(Bytes::from("value2")));
    }

    #[tokio::test]
    async fn test_transaction_cas_visible_to_later_reads() {
        let backend = MemoryBackend::new();

        let mut txn = backend.transaction().await.unwrap();
        txn.compare_and_set(b"_things".to_vec(), None, br#"["t1"]"#.to_vec()).unwrap();
        assert_eq!(txn.get(b"_things").await.unwrap(), Some(Bytes::from(r#"["t1"]"#)));

        // Chained CAS on the same key checks the staged value
        txn.compare_and_set(
            b"_things".to_vec(),
            Some(br#"["t1"]"#.to_vec()),
            br#"["t1","t2"]"#.to_vec(),
        )
        .unwrap();
        txn.commit().await.unwrap();

        assert_eq!(backend.get(b"_things").await.unwrap(), Some(Bytes::from(r#"["t1","t2"]"#)));
    }

    #[tokio::test]
    async fn test_transaction_staged_cas_mismatch_fails_immediately() {
        let backend = MemoryBackend::new();

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"k".to_vec(), b"staged".to_vec());
        let result = txn.compare_and_set(b"k".to_vec(), Some(b"other".to_vec()), b"new".to_vec());
        assert!(matches!(result, Err(StorageError::Conflict)));
    }

    #[tokio::test]
    async fn test_transaction_conflict_applies_nothing() {
        let backend = MemoryBackend::new();
        backend.set(b"_users".to_vec(), b"[]".to_vec()).await.unwrap();

        let mut txn = backend.transaction().await.unwrap();
        txn.compare_and_set(b"_users".to_vec(), Some(b"[]".to_vec()), br#"["u1"]"#.to_vec())
            .unwrap();
        txn.set(b"u1".to_vec(), br#"{"userId":"u1"}"#.to_vec());

        // Concurrent writer gets in first
        backend.set(b"_users".to_vec(), br#"["u0"]"#.to_vec()).await.unwrap();

        let result = txn.commit().await;
        assert!(matches!(result, Err(StorageError::Conflict)));

        assert_eq!(backend.get(b"u1").await.unwrap(), None);
        assert_eq!(backend.get(b"_users").await.unwrap(), Some(Bytes::from(r#"["u0"]"#)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_applies_nothing() {
        let backend = MemoryBackend::new();
        {
            let mut txn = backend.transaction().await.unwrap();
            txn.set(b"k".to_vec(), b"v".to_vec());
        }
        assert_eq!(backend.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = MemoryBackend::new();
        assert!(backend.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_data() {
        let backend1 = MemoryBackend::new();
        let backend2 = backend1.clone();

        backend1.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();

        let value = backend2.get(b"key").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value")));
    }

    #[tokio::test]
    async fn test_compare_and_set_success() {
        let backend = MemoryBackend::new();

        backend.set(b"key".to_vec(), b"value1".to_vec()).await.unwrap();
        backend
            .compare_and_set(b"key", Some(b"value1".as_slice()), b"value2".to_vec())
            .await
            .unwrap();

        let value = backend.get(b"key").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value2")));
    }

    #[tokio::test]
    async fn test_compare_and_set_conflict() {
        let backend = MemoryBackend::new();

        backend.set(b"key".to_vec(), b"value1".to_vec()).await.unwrap();
        let result =
            backend.compare_and_set(b"key", Some(b"wrong".as_slice()), b"value2".to_vec()).await;

        assert!(matches!(result, Err(StorageError::Conflict)));
        assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("value1")));
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_if_absent() {
        let backend = MemoryBackend::new();

        backend.compare_and_set(b"new_key", None, b"value".to_vec()).await.unwrap();
        assert_eq!(backend.get(b"new_key").await.unwrap(), Some(Bytes::from("value")));

        // Second insert-if-absent loses
        let result = backend.compare_and_set(b"new_key", None, b"other".to_vec()).await;
        assert!(matches!(result, Err(StorageError::Conflict)));
    }

    #[tokio::test]
    async fn test_compare_and_set_nonexistent_key_with_expected_some() {
        let backend = MemoryBackend::new();

        let result =
            backend.compare_and_set(b"missing", Some(b"value".as_slice()), b"new".to_vec()).await;

        assert!(matches!(result, Err(StorageError::Conflict)));
        assert_eq!(backend.get(b"missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_compare_and_set_is_length_sensitive() {
        let backend = MemoryBackend::new();
        backend.set(b"k".to_vec(), b"abc".to_vec()).await.unwrap();

        let result = backend.compare_and_set(b"k", Some(b"ab".as_slice()), b"x".to_vec()).await;
        assert!(matches!(result, Err(StorageError::Conflict)));
    }

    proptest! {
        #[test]
        fn prop_committed_transaction_matches_sequential_writes(
            writes in proptest::collection::vec(
                (proptest::collection::vec(any::<u8>(), 1..8), proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16))),
                0..20,
            )
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let txn_backend = MemoryBackend::new();
                let direct_backend = MemoryBackend::new();

                let mut txn = txn_backend.transaction().await.unwrap();
                for (key, value) in &writes {
                    match value {
                        Some(v) => {
                            txn.set(key.clone(), v.clone());
                            direct_backend.set(key.clone(), v.clone()).await.unwrap();
                        },
                        None => {
                            txn.delete(key.clone());
                            direct_backend.delete(key).await.unwrap();
                        },
                    }
                }
                txn.commit().await.unwrap();

                for (key, _) in &writes {
                    prop_assert_eq!(
                        txn_backend.get(key).await.unwrap(),
                        direct_backend.get(key).await.unwrap()
                    );
                }
                prop_assert_eq!(txn_backend.len(), direct_backend.len());
                Ok(())
            })?;
        }
    }
}
