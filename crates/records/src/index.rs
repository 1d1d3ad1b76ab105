//! Collection indexes.
//!
//! An index is an ordered JSON array of entity identifiers stored under the
//! collection's configured key. Appends are read-modify-write cycles made
//! safe by a compare-and-set against the exact bytes read, so a racing
//! appender surfaces [`RecordError::Conflict`] instead of silently dropping
//! an identifier.

use std::{collections::HashSet, sync::Arc};

use brokerage_ledger_storage::{StorageBackend, Transaction};

use crate::{
    config::{Collection, DuplicatePolicy, StoreConfig},
    error::{RecordError, RecordResult},
};

const EMPTY_INDEX: &[u8] = b"[]";

/// Maintains the per-collection identifier lists.
#[derive(Clone)]
pub struct IndexManager<B> {
    backend: B,
    config: Arc<StoreConfig>,
}

impl<B: StorageBackend> IndexManager<B> {
    /// Creates an index manager over `backend`.
    pub fn new(backend: B, config: Arc<StoreConfig>) -> Self {
        Self { backend, config }
    }

    fn key(&self, collection: Collection) -> &str {
        self.config.collection(collection).key()
    }

    /// Appends `id` to the collection's index and returns the stored
    /// identifier.
    ///
    /// With `generate_suffix`, the stored identifier is `id`, a `-`, and the
    /// index length after the append (`"req" → "req-3"` on an index of two).
    /// The count never contains `-`, so distinct `(id, length)` pairs give
    /// distinct identifiers.
    ///
    /// # Errors
    ///
    /// - [`RecordError::DuplicateKey`] if the identifier is present and the
    ///   policy is [`DuplicatePolicy::Reject`]
    /// - [`RecordError::Conflict`] if another appender wrote in between
    /// - [`RecordError::LedgerRead`] / [`RecordError::LedgerWrite`] on ledger failures
    /// - [`RecordError::Marshal`] if the stored index is not a JSON array of strings
    #[tracing::instrument(skip(self), fields(index = self.key(collection)))]
    pub async fn append(
        &self,
        collection: Collection,
        id: &str,
        generate_suffix: bool,
    ) -> RecordResult<String> {
        let key = self.key(collection);
        let current = self.backend.get(key.as_bytes()).await.map_err(RecordError::read)?;
        let (new_id, encoded) = self.appended(key, current.as_deref(), id, generate_suffix)?;

        self.backend
            .compare_and_set(key.as_bytes(), current.as_deref(), encoded)
            .await
            .map_err(|e| {
                let err = RecordError::write(e);
                if err.is_retryable() {
                    tracing::warn!(index = key, "concurrent index append");
                }
                err
            })?;

        tracing::info!(index = key, id = %new_id, "index append committed");
        Ok(new_id)
    }

    /// Stages the same append inside `txn`. The compare-and-set is checked
    /// when the transaction commits.
    ///
    /// # Errors
    ///
    /// As [`append`](Self::append), except that conflicts surface from commit.
    #[tracing::instrument(skip(self, txn), fields(index = self.key(collection)))]
    pub async fn append_in(
        &self,
        txn: &mut dyn Transaction,
        collection: Collection,
        id: &str,
        generate_suffix: bool,
    ) -> RecordResult<String> {
        let key = self.key(collection);
        let current = txn.get(key.as_bytes()).await.map_err(RecordError::read)?;
        let (new_id, encoded) = self.appended(key, current.as_deref(), id, generate_suffix)?;

        txn.compare_and_set(key.as_bytes().to_vec(), current.map(|b| b.to_vec()), encoded)
            .map_err(RecordError::write)?;
        Ok(new_id)
    }

    fn appended(
        &self,
        key: &str,
        current: Option<&[u8]>,
        id: &str,
        generate_suffix: bool,
    ) -> RecordResult<(String, Vec<u8>)> {
        let mut ids = decode_index(key, current)?;
        let new_id = if generate_suffix { format!("{id}-{}", ids.len() + 1) } else { id.to_owned() };

        if self.config.duplicate_policy() == DuplicatePolicy::Reject && ids.contains(&new_id) {
            return Err(RecordError::duplicate_key(new_id));
        }

        ids.push(new_id.clone());
        Ok((new_id, encode_index(key, &ids)?))
    }

    /// Returns the identifiers in append order. An absent index is empty.
    /// Under [`DuplicatePolicy::DedupOnRead`] each identifier appears once.
    ///
    /// # Errors
    ///
    /// - [`RecordError::LedgerRead`] on ledger failures
    /// - [`RecordError::Marshal`] if the stored index is malformed
    #[tracing::instrument(skip(self), fields(index = self.key(collection)))]
    pub async fn list(&self, collection: Collection) -> RecordResult<Vec<String>> {
        let key = self.key(collection);
        let current = self.backend.get(key.as_bytes()).await.map_err(RecordError::read)?;
        let ids = decode_index(key, current.as_deref())?;

        let ids = match self.config.duplicate_policy() {
            DuplicatePolicy::Reject => ids,
            DuplicatePolicy::DedupOnRead => {
                let mut seen = HashSet::new();
                ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
            },
        };
        tracing::debug!(count = ids.len(), "index read");
        Ok(ids)
    }

    /// Overwrites one index with an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::LedgerWrite`] on ledger failures.
    #[tracing::instrument(skip(self), fields(index = self.key(collection)))]
    pub async fn reset(&self, collection: Collection) -> RecordResult<()> {
        self.backend
            .set(self.key(collection).as_bytes().to_vec(), EMPTY_INDEX.to_vec())
            .await
            .map_err(RecordError::write)?;
        tracing::info!("index reset");
        Ok(())
    }

    /// Overwrites every configured index with an empty sequence, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::LedgerWrite`] on ledger failures.
    #[tracing::instrument(skip(self))]
    pub async fn reset_all(&self) -> RecordResult<()> {
        let mut txn = self.backend.transaction().await.map_err(RecordError::write)?;
        self.reset_all_in(txn.as_mut());
        txn.commit().await.map_err(RecordError::write)?;
        tracing::info!("all indexes reset");
        Ok(())
    }

    /// Stages [`reset_all`](Self::reset_all) inside `txn`.
    #[tracing::instrument(skip(self, txn))]
    pub fn reset_all_in(&self, txn: &mut dyn Transaction) {
        for collection in Collection::ALL {
            txn.set(self.key(collection).as_bytes().to_vec(), EMPTY_INDEX.to_vec());
        }
    }
}

fn decode_index(key: &str, bytes: Option<&[u8]>) -> RecordResult<Vec<String>> {
    match bytes {
        None => Ok(Vec::new()),
        Some(bytes) => serde_json::from_slice(bytes)
            .map_err(|e| RecordError::marshal(format!("decode index {key}"), e)),
    }
}

fn encode_index(key: &str, ids: &[String]) -> RecordResult<Vec<u8>> {
    serde_json::to_vec(ids).map_err(|e| RecordError::marshal(format!("encode index {key}"), e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use brokerage_ledger_storage::{MemoryBackend, testutil::FailingBackend};
    use proptest::prelude::*;

    use super::*;

    fn manager(policy: DuplicatePolicy) -> IndexManager<MemoryBackend> {
        let config = StoreConfig::builder().duplicate_policy(policy).build().unwrap();
        IndexManager::new(MemoryBackend::new(), Arc::new(config))
    }

    #[tokio::test]
    async fn test_append_to_absent_index() {
        let index = manager(DuplicatePolicy::Reject);
        assert_eq!(index.append(Collection::Things, "t1", false).await.unwrap(), "t1");
        assert_eq!(index.list(Collection::Things).await.unwrap(), vec!["t1"]);
        assert!(index.list(Collection::Users).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suffix_uses_length_after_append() {
        let index = manager(DuplicatePolicy::Reject);
        assert_eq!(index.append(Collection::Applications, "req", true).await.unwrap(), "req-1");
        assert_eq!(index.append(Collection::Applications, "req", true).await.unwrap(), "req-2");
        assert_eq!(index.append(Collection::Applications, "x", false).await.unwrap(), "x");
        assert_eq!(index.append(Collection::Applications, "req", true).await.unwrap(), "req-4");
        assert_eq!(
            index.list(Collection::Applications).await.unwrap(),
            vec!["req-1", "req-2", "x", "req-4"]
        );
    }

    #[tokio::test]
    async fn test_suffix_keeps_digit_ids_apart() {
        let index = manager(DuplicatePolicy::Reject);
        for n in 1..=10 {
            index.append(Collection::Applications, &format!("pad{n}"), false).await.unwrap();
        }
        // "a1" at length 1 and "a" at length 11 must not both store "a11"
        let late = index.append(Collection::Applications, "a", true).await.unwrap();
        assert_eq!(late, "a-11");

        let index = manager(DuplicatePolicy::Reject);
        let early = index.append(Collection::Applications, "a1", true).await.unwrap();
        assert_eq!(early, "a1-1");
        assert_ne!(early, late);
    }

    #[tokio::test]
    async fn test_reject_duplicate() {
        let index = manager(DuplicatePolicy::Reject);
        index.append(Collection::Users, "u1", false).await.unwrap();
        let result = index.append(Collection::Users, "u1", false).await;
        assert!(matches!(result, Err(RecordError::DuplicateKey { key }) if key == "u1"));
        assert_eq!(index.list(Collection::Users).await.unwrap(), vec!["u1"]);
    }

    #[tokio::test]
    async fn test_dedup_on_read() {
        let index = manager(DuplicatePolicy::DedupOnRead);
        for id in ["u1", "u2", "u1", "u3", "u2"] {
            index.append(Collection::Users, id, false).await.unwrap();
        }
        assert_eq!(index.list(Collection::Users).await.unwrap(), vec!["u1", "u2", "u3"]);

        let raw = index.backend.get(b"_users").await.unwrap().unwrap();
        let stored: Vec<String> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.len(), 5);
    }

    #[tokio::test]
    async fn test_reset_and_reset_all() {
        let index = manager(DuplicatePolicy::Reject);
        index.append(Collection::Users, "u1", false).await.unwrap();
        index.append(Collection::Things, "t1", false).await.unwrap();

        index.reset(Collection::Users).await.unwrap();
        assert!(index.list(Collection::Users).await.unwrap().is_empty());
        assert_eq!(index.list(Collection::Things).await.unwrap(), vec!["t1"]);

        index.reset_all().await.unwrap();
        for collection in Collection::ALL {
            assert!(index.list(collection).await.unwrap().is_empty());
            let raw = index.backend.get(index.key(collection).as_bytes()).await.unwrap();
            assert_eq!(raw.as_deref(), Some(EMPTY_INDEX));
        }
    }

    #[tokio::test]
    async fn test_reset_all_in_waits_for_commit() {
        let index = manager(DuplicatePolicy::Reject);
        index.append(Collection::Things, "t1", false).await.unwrap();

        let mut txn = index.backend.transaction().await.unwrap();
        index.reset_all_in(txn.as_mut());
        assert_eq!(index.list(Collection::Things).await.unwrap(), vec!["t1"]);
        txn.commit().await.unwrap();
        assert!(index.list(Collection::Things).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_index_is_marshal_error() {
        let index = manager(DuplicatePolicy::Reject);
        index.backend.set(b"_things".to_vec(), b"{\"not\":\"an array\"}".to_vec()).await.unwrap();
        assert!(matches!(index.list(Collection::Things).await, Err(RecordError::Marshal { .. })));
        assert!(matches!(
            index.append(Collection::Things, "t1", false).await,
            Err(RecordError::Marshal { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_append_conflicts() {
        let index = manager(DuplicatePolicy::Reject);
        index.append(Collection::Things, "t1", false).await.unwrap();

        let mut txn = index.backend.transaction().await.unwrap();
        index.append_in(txn.as_mut(), Collection::Things, "t2", false).await.unwrap();

        // Direct append lands first
        index.append(Collection::Things, "t3", false).await.unwrap();

        let result = txn.commit().await.map_err(RecordError::write);
        assert!(matches!(result, Err(RecordError::Conflict)));
        assert_eq!(index.list(Collection::Things).await.unwrap(), vec!["t1", "t3"]);
    }

    #[tokio::test]
    async fn test_append_in_sees_earlier_staged_append() {
        let index = manager(DuplicatePolicy::Reject);
        let mut txn = index.backend.transaction().await.unwrap();
        index.append_in(txn.as_mut(), Collection::Users, "u1", false).await.unwrap();
        assert_eq!(
            index.append_in(txn.as_mut(), Collection::Users, "u", true).await.unwrap(),
            "u-2"
        );
        txn.commit().await.unwrap();
        assert_eq!(index.list(Collection::Users).await.unwrap(), vec!["u1", "u-2"]);
    }

    #[tokio::test]
    async fn test_read_and_write_failures_classified() {
        let backend = FailingBackend::default();
        let index = IndexManager::new(backend.clone(), Arc::new(StoreConfig::default()));

        backend.fail_reads();
        assert!(matches!(
            index.append(Collection::Users, "u1", false).await,
            Err(RecordError::LedgerRead { .. })
        ));
        assert!(matches!(index.list(Collection::Users).await, Err(RecordError::LedgerRead { .. })));

        backend.heal();
        backend.fail_writes();
        assert!(matches!(
            index.append(Collection::Users, "u1", false).await,
            Err(RecordError::LedgerWrite { .. })
        ));
        assert!(matches!(index.reset_all().await, Err(RecordError::LedgerWrite { .. })));
    }

    proptest! {
        /// N suffixed appends of distinct ids yield N distinct stored ids in
        /// call order, including ids that end in digits or contain `-`.
        #[test]
        fn suffixed_appends_are_distinct_and_ordered(
            ids in proptest::collection::hash_set("[a-z0-9-]{1,6}", 1..24)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let ids: Vec<String> = ids.into_iter().collect();
            rt.block_on(async {
                let index = manager(DuplicatePolicy::Reject);
                let mut returned = Vec::new();
                for id in &ids {
                    returned.push(index.append(Collection::Applications, id, true).await.unwrap());
                }

                let listed = index.list(Collection::Applications).await.unwrap();
                prop_assert_eq!(&listed, &returned);
                prop_assert_eq!(listed.len(), ids.len());
                let distinct: HashSet<_> = listed.iter().collect();
                prop_assert_eq!(distinct.len(), ids.len());
                for (pos, (stored, id)) in listed.iter().zip(&ids).enumerate() {
                    prop_assert_eq!(stored, &format!("{id}-{}", pos + 1));
                }
                Ok(())
            })?;
        }
    }
}
