//! Shared test utilities for ledger testing.
//!
//! This module provides assertion macros over [`StorageResult`] values and
//! [`FailingBackend`], a [`MemoryBackend`] wrapper that injects read or
//! write failures on demand. It is feature-gated behind `testutil` to
//! prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! brokerage-ledger-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use brokerage_ledger_storage::testutil::FailingBackend;
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    StorageBackend,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
    transaction::Transaction,
};

/// Assert that a [`StorageResult`] is a [`StorageError::Conflict`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use brokerage_ledger_storage::assert_conflict;
/// use brokerage_ledger_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::Conflict);
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "{}: expected StorageError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::NotFound`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use brokerage_ledger_storage::assert_not_found;
/// use brokerage_ledger_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::NotFound { key: "missing".into() });
/// assert_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "{}: expected StorageError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::SchemaMismatch`].
#[macro_export]
macro_rules! assert_schema_mismatch {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::SchemaMismatch { .. })),
            "expected StorageError::SchemaMismatch, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message
/// on failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use brokerage_ledger_storage::assert_storage_ok;
/// use brokerage_ledger_storage::error::StorageResult;
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

#[derive(Default)]
struct FailureSwitches {
    reads: AtomicBool,
    writes: AtomicBool,
}

impl FailureSwitches {
    fn check_read(&self) -> StorageResult<()> {
        if self.reads.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.writes.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected write failure"));
        }
        Ok(())
    }
}

/// A [`MemoryBackend`] wrapper whose reads and writes can be switched to
/// fail with [`StorageError::Connection`].
///
/// Writes cover `set`, `compare_and_set`, `delete` and transaction commit.
/// Reads cover `get` on the backend and inside transactions. Clones share
/// both the data and the switches.
#[derive(Clone, Default)]
pub struct FailingBackend {
    inner: MemoryBackend,
    switches: Arc<FailureSwitches>,
}

impl FailingBackend {
    /// Wraps `inner` with both switches off.
    #[must_use]
    pub fn new(inner: MemoryBackend) -> Self {
        Self { inner, switches: Arc::default() }
    }

    /// The wrapped backend, which never fails.
    #[must_use]
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Makes every subsequent read fail.
    pub fn fail_reads(&self) {
        self.switches.reads.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        self.switches.writes.store(true, Ordering::SeqCst);
    }

    /// Turns both switches off.
    pub fn heal(&self) {
        self.switches.reads.store(false, Ordering::SeqCst);
        self.switches.writes.store(false, Ordering::SeqCst);
    }
}

struct FailingTransaction {
    inner: Box<dyn Transaction>,
    switches: Arc<FailureSwitches>,
}

#[async_trait]
impl Transaction for FailingTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.switches.check_read()?;
        self.inner.get(key).await
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.set(key, value);
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.inner.delete(key);
    }

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.inner.compare_and_set(key, expected, new_value)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.switches.check_write()?;
        self.inner.commit().await
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.switches.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.switches.check_write()?;
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.switches.check_write()?;
        self.inner.compare_and_set(key, expected, new_value).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.switches.check_write()?;
        self.inner.delete(key).await
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        let inner = self.inner.transaction().await?;
        Ok(Box::new(FailingTransaction { inner, switches: Arc::clone(&self.switches) }))
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.switches.check_read()?;
        self.inner.health_check().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_conflict_macro() {
        let result: StorageResult<()> = Err(StorageError::Conflict);
        assert_conflict!(result);
    }

    #[test]
    fn test_assert_not_found_macro() {
        let result: StorageResult<()> = Err(StorageError::NotFound { key: "missing".into() });
        assert_not_found!(result);
    }

    #[test]
    fn test_assert_schema_mismatch_macro() {
        let result: StorageResult<()> = Err(StorageError::schema_mismatch("T", "bad"));
        assert_schema_mismatch!(result);
    }

    #[test]
    fn test_assert_storage_ok_macro() {
        let result: StorageResult<i32> = Ok(42);
        let val = assert_storage_ok!(result);
        assert_eq!(val, 42);
    }

    #[tokio::test]
    async fn test_failing_backend_switches() {
        let backend = FailingBackend::default();
        backend.set(b"k".to_vec(), b"v".to_vec()).await.unwrap();

        backend.fail_reads();
        assert!(matches!(backend.get(b"k").await, Err(StorageError::Connection { .. })));
        // Writes still go through
        backend.set(b"k".to_vec(), b"v2".to_vec()).await.unwrap();

        backend.heal();
        backend.fail_writes();
        assert_eq!(backend.get(b"k").await.unwrap(), Some(Bytes::from("v2")));
        assert!(matches!(backend.delete(b"k").await, Err(StorageError::Connection { .. })));

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"other".to_vec(), b"x".to_vec());
        assert!(matches!(txn.commit().await, Err(StorageError::Connection { .. })));
        assert_eq!(backend.inner().get(b"other").await.unwrap(), None);
    }
}
