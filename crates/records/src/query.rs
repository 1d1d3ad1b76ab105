//! Collection enumeration.
//!
//! [`QueryService`] walks a collection's index and fetches every member.
//! Members named by the index but absent from the ledger are handled by the
//! configured [`EnumerationPolicy`]; they are never dropped silently.

use std::{future::Future, sync::Arc};

use brokerage_ledger_storage::StorageBackend;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec,
    config::{Collection, EnumerationPolicy, StoreConfig},
    error::{RecordError, RecordResult},
    index::IndexManager,
    keys,
};

/// Result of enumerating a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enumeration<T> {
    /// Members found, in index order.
    pub items: Vec<T>,
    /// Identifiers named by the index whose member was absent.
    pub missing: Vec<String>,
}

impl<T> Enumeration<T> {
    /// Returns `true` if every indexed member was found.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Returns the items if nothing was missing.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::PartialEnumeration`] naming the missing members.
    pub fn into_complete(self, collection: impl Into<String>) -> RecordResult<Vec<T>> {
        if self.missing.is_empty() {
            Ok(self.items)
        } else {
            Err(RecordError::PartialEnumeration {
                collection: collection.into(),
                missing: self.missing,
            })
        }
    }
}

/// Enumerates collections through their indexes.
#[derive(Clone)]
pub struct QueryService<B> {
    backend: B,
    index: IndexManager<B>,
    config: Arc<StoreConfig>,
}

impl<B: StorageBackend + Clone> QueryService<B> {
    /// Creates a query service over `backend`.
    pub fn new(backend: B, config: Arc<StoreConfig>) -> Self {
        let index = IndexManager::new(backend.clone(), Arc::clone(&config));
        Self { backend, index, config }
    }

    /// Enumerates a collection whose members are JSON blobs keyed by their
    /// identifier.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidArguments`] for a collection not stored as blobs
    /// - [`RecordError::PartialEnumeration`] under [`EnumerationPolicy::FailFast`]
    ///   when a member is absent
    /// - [`RecordError::Marshal`] if a present member cannot be decoded
    /// - [`RecordError::LedgerRead`] on ledger failures
    #[tracing::instrument(skip(self))]
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> RecordResult<Enumeration<T>> {
        if keys::blob_key(collection, "").is_none() {
            return Err(RecordError::invalid_arguments(format!(
                "{collection:?} are not stored as blobs"
            )));
        }
        self.enumerate(collection, |id| async move {
            let Some(key) = keys::blob_key(collection, &id) else {
                return Ok(None);
            };
            match self.backend.get(key.as_bytes()).await {
                Ok(Some(bytes)) => codec::decode::<T>(&bytes).map(Some),
                Ok(None) => Ok(None),
                Err(e) => Err(RecordError::read(e)),
            }
        })
        .await
    }

    /// Enumerates a collection with a caller-supplied member lookup.
    ///
    /// `fetch` returns `Ok(None)` for an absent member; any error it returns
    /// aborts the enumeration.
    ///
    /// # Errors
    ///
    /// As [`list_all`](Self::list_all), plus whatever `fetch` returns.
    pub async fn enumerate<T, F, Fut>(
        &self,
        collection: Collection,
        mut fetch: F,
    ) -> RecordResult<Enumeration<T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = RecordResult<Option<T>>>,
    {
        let key = self.config.collection(collection).key();
        let ids = self.index.list(collection).await?;
        let mut enumeration = Enumeration { items: Vec::with_capacity(ids.len()), missing: Vec::new() };

        for id in ids {
            match fetch(id.clone()).await? {
                Some(item) => enumeration.items.push(item),
                None => {
                    tracing::warn!(index = key, id = %id, "indexed member missing");
                    if self.config.enumeration_policy() == EnumerationPolicy::FailFast {
                        return Err(RecordError::PartialEnumeration {
                            collection: key.to_owned(),
                            missing: vec![id],
                        });
                    }
                    enumeration.missing.push(id);
                },
            }
        }

        tracing::debug!(
            index = key,
            found = enumeration.items.len(),
            missing = enumeration.missing.len(),
            "enumeration finished"
        );
        Ok(enumeration)
    }
}
