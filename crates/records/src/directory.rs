//! Users and things.
//!
//! Both are JSON blobs stored under their identifier inside their own
//! namespace (see [`keys`](crate::keys)) and listed through their collection
//! index. Adding one appends to the index and writes the blob in a single
//! transaction.

use std::sync::Arc;

use brokerage_ledger_storage::StorageBackend;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec,
    config::{Collection, StoreConfig},
    error::{RecordError, RecordResult},
    index::IndexManager,
    keys,
    model::{Thing, User},
    query::{Enumeration, QueryService},
};

/// Stores and reads users and things.
#[derive(Clone)]
pub struct Directory<B> {
    backend: B,
    index: IndexManager<B>,
    query: QueryService<B>,
}

impl<B: StorageBackend + Clone> Directory<B> {
    /// Creates a directory over `backend`.
    pub fn new(backend: B, config: Arc<StoreConfig>) -> Self {
        Self {
            index: IndexManager::new(backend.clone(), Arc::clone(&config)),
            query: QueryService::new(backend.clone(), config),
            backend,
        }
    }

    /// Adds a user given as JSON.
    ///
    /// An empty `userId` in the document takes `user_id`.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Marshal`] if `json` is not a user
    /// - [`RecordError::InvalidArguments`] if `user_id` is empty or the
    ///   document names a different user
    /// - as [`add`](Self::add) otherwise
    pub async fn add_user(&self, user_id: &str, json: &[u8]) -> RecordResult<()> {
        let mut user: User = codec::decode(json)?;
        user.user_id = reconcile_id(user_id, std::mem::take(&mut user.user_id))?;
        self.add(Collection::Users, user_id, &user).await
    }

    /// Adds a thing given as JSON.
    ///
    /// An empty `id` in the document takes `thing_id`.
    ///
    /// # Errors
    ///
    /// As [`add_user`](Self::add_user).
    pub async fn add_thing(&self, thing_id: &str, json: &[u8]) -> RecordResult<()> {
        let mut thing: Thing = codec::decode(json)?;
        thing.id = reconcile_id(thing_id, std::mem::take(&mut thing.id))?;
        self.add(Collection::Things, thing_id, &thing).await
    }

    /// Indexes `entity` under `id` and stores its canonical blob.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidArguments`] for a collection not stored as
    ///   blobs
    /// - [`RecordError::DuplicateKey`] if `id` is already indexed and the
    ///   duplicate policy rejects it
    /// - [`RecordError::Conflict`] if the index was written concurrently
    /// - [`RecordError::LedgerRead`] / [`RecordError::LedgerWrite`] on ledger failures
    #[tracing::instrument(skip(self, entity))]
    pub async fn add<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        entity: &T,
    ) -> RecordResult<()> {
        let key = keys::blob_key(collection, id).ok_or_else(|| {
            RecordError::invalid_arguments(format!("{collection:?} are not stored as blobs"))
        })?;
        let blob = codec::encode(entity)?;

        let mut txn = self.backend.transaction().await.map_err(RecordError::write)?;
        self.index.append_in(txn.as_mut(), collection, id, false).await?;
        txn.set(key.into_bytes(), blob);
        txn.commit().await.map_err(|e| {
            let err = RecordError::write(e);
            if err.is_retryable() {
                tracing::warn!("concurrent index append");
            }
            err
        })?;

        tracing::info!("entity stored");
        Ok(())
    }

    /// Reads a user.
    ///
    /// # Errors
    ///
    /// - [`RecordError::NotFound`] if absent
    /// - [`RecordError::Marshal`] if the stored blob does not decode
    /// - [`RecordError::LedgerRead`] on ledger failures
    pub async fn get_user(&self, user_id: &str) -> RecordResult<User> {
        self.get(keys::user_key(user_id), user_id).await
    }

    /// Reads a thing.
    ///
    /// # Errors
    ///
    /// As [`get_user`](Self::get_user).
    pub async fn get_thing(&self, thing_id: &str) -> RecordResult<Thing> {
        self.get(keys::thing_key(thing_id), thing_id).await
    }

    #[tracing::instrument(skip(self, id))]
    async fn get<T: DeserializeOwned>(&self, key: String, id: &str) -> RecordResult<T> {
        let bytes = self
            .backend
            .get(key.as_bytes())
            .await
            .map_err(RecordError::read)?
            .ok_or_else(|| RecordError::not_found(id))?;
        tracing::debug!(len = bytes.len(), "entity read");
        codec::decode(&bytes)
    }

    /// Enumerates users in index order.
    ///
    /// # Errors
    ///
    /// As [`QueryService::list_all`].
    pub async fn list_users(&self) -> RecordResult<Enumeration<User>> {
        self.query.list_all(Collection::Users).await
    }

    /// Enumerates things in index order.
    ///
    /// # Errors
    ///
    /// As [`QueryService::list_all`].
    pub async fn list_things(&self) -> RecordResult<Enumeration<Thing>> {
        self.query.list_all(Collection::Things).await
    }
}

fn reconcile_id(key: &str, embedded: String) -> RecordResult<String> {
    if key.is_empty() {
        return Err(RecordError::invalid_arguments("identifier must not be empty"));
    }
    if !embedded.is_empty() && embedded != key {
        return Err(RecordError::invalid_arguments(format!(
            "document names {embedded}, stored under {key}"
        )));
    }
    Ok(key.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use brokerage_ledger_storage::{MemoryBackend, testutil::FailingBackend};

    use super::*;

    fn directory() -> Directory<MemoryBackend> {
        Directory::new(MemoryBackend::new(), Arc::new(StoreConfig::default()))
    }

    #[tokio::test]
    async fn test_add_and_get_user() {
        let directory = directory();
        directory
            .add_user("alice", br#"{"firstName":"Alice","things":null,"extra":1}"#)
            .await
            .unwrap();

        let user = directory.get_user("alice").await.unwrap();
        assert_eq!(user.user_id, "alice");
        assert_eq!(user.first_name, "Alice");
        assert!(user.things.is_empty());

        let stored = directory.backend.get(b"user/alice").await.unwrap().unwrap();
        assert_eq!(&stored[..], &codec::encode(&user).unwrap()[..]);
    }

    #[tokio::test]
    async fn test_id_mismatch_rejected() {
        let directory = directory();
        let result = directory.add_thing("t1", br#"{"id":"t2","description":"desk"}"#).await;
        assert!(matches!(result, Err(RecordError::InvalidArguments { .. })));
        assert!(directory.backend.get(b"thing/t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_writes_nothing() {
        let directory = directory();
        let result = directory.add_thing("t1", b"{").await;
        assert!(matches!(result, Err(RecordError::Marshal { .. })));
        assert!(directory.backend.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected_atomically() {
        let directory = directory();
        directory.add_thing("t1", br#"{"description":"desk"}"#).await.unwrap();

        let result = directory.add_thing("t1", br#"{"description":"lamp"}"#).await;
        assert!(matches!(result, Err(RecordError::DuplicateKey { .. })));
        assert_eq!(directory.get_thing("t1").await.unwrap().description, "desk");
    }

    #[tokio::test]
    async fn test_list_things() {
        let directory = directory();
        directory.add_thing("t1", br#"{"description":"desk"}"#).await.unwrap();
        directory.add_thing("t2", br#"{"description":"lamp"}"#).await.unwrap();

        let things = directory.list_things().await.unwrap();
        let ids: Vec<_> = things.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t2"]);
        assert!(directory.list_users().await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_user_and_thing_with_same_id_coexist() {
        let directory = directory();
        directory.add_user("alice", br#"{"hash":"h1","firstName":"Alice"}"#).await.unwrap();
        directory.add_thing("alice", br#"{"description":"desk"}"#).await.unwrap();

        let user = directory.get_user("alice").await.unwrap();
        assert_eq!(user.hash, "h1");
        assert_eq!(user.first_name, "Alice");
        assert_eq!(directory.get_thing("alice").await.unwrap().description, "desk");
    }

    #[tokio::test]
    async fn test_id_naming_an_index_leaves_the_index_alone() {
        let directory = directory();
        directory.add_thing("t1", br#"{"description":"desk"}"#).await.unwrap();
        directory.add_user("_things", br#"{"firstName":"Eve"}"#).await.unwrap();
        directory.add_thing("_users", br#"{"description":"lamp"}"#).await.unwrap();

        let things = directory.list_things().await.unwrap();
        let ids: Vec<_> = things.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t1", "_users"]);
        let users = directory.list_users().await.unwrap();
        assert_eq!(users.items.len(), 1);
        assert_eq!(users.items[0].user_id, "_things");
    }

    #[tokio::test]
    async fn test_applications_are_not_blobs() {
        let directory = directory();
        let result = directory.add(Collection::Applications, "R1", &Thing::default()).await;
        assert!(matches!(result, Err(RecordError::InvalidArguments { .. })));
        assert!(directory.backend.is_empty());
    }

    #[tokio::test]
    async fn test_missing_entities() {
        let directory = directory();
        assert!(matches!(directory.get_user("ghost").await, Err(RecordError::NotFound { .. })));
        assert!(matches!(directory.get_thing("ghost").await, Err(RecordError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_commit_failure_is_write_error() {
        let backend = FailingBackend::default();
        let directory = Directory::new(backend.clone(), Arc::new(StoreConfig::default()));
        backend.fail_writes();

        let result = directory.add_thing("t1", br#"{"description":"desk"}"#).await;
        assert!(matches!(result, Err(RecordError::LedgerWrite { .. })));

        backend.heal();
        assert!(matches!(directory.get_thing("t1").await, Err(RecordError::NotFound { .. })));
    }
}
