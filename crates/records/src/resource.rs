//! Opaque resource paths addressed by owner and content hash.

use brokerage_ledger_storage::StorageBackend;

use crate::{
    error::{RecordError, RecordResult},
    keys::resource_key,
};

/// Stores resource paths.
#[derive(Clone)]
pub struct ResourceStore<B> {
    backend: B,
}

impl<B: StorageBackend> ResourceStore<B> {
    /// Creates a resource store over `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Stores `path` for `(owner, hash)`, replacing any earlier path.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidArguments`] if `owner` or `hash` is empty
    /// - [`RecordError::LedgerWrite`] on ledger failures
    #[tracing::instrument(skip(self, path))]
    pub async fn add_resource(&self, owner: &str, hash: &str, path: &str) -> RecordResult<()> {
        if owner.is_empty() || hash.is_empty() {
            return Err(RecordError::invalid_arguments("resource owner and hash must not be empty"));
        }
        self.backend
            .set(resource_key(owner, hash).into_bytes(), path.as_bytes().to_vec())
            .await
            .map_err(RecordError::write)?;
        tracing::info!("resource stored");
        Ok(())
    }

    /// Returns the path stored for `(owner, hash)`.
    ///
    /// # Errors
    ///
    /// - [`RecordError::NotFound`] if nothing is stored
    /// - [`RecordError::Marshal`] if the stored path is not UTF-8
    /// - [`RecordError::LedgerRead`] on ledger failures
    #[tracing::instrument(skip(self))]
    pub async fn get_resource(&self, owner: &str, hash: &str) -> RecordResult<String> {
        let key = resource_key(owner, hash);
        let bytes = self
            .backend
            .get(key.as_bytes())
            .await
            .map_err(RecordError::read)?
            .ok_or_else(|| RecordError::not_found(&key))?;

        String::from_utf8(bytes.to_vec()).map_err(|_| RecordError::Marshal {
            message: format!("resource {key} is not UTF-8"),
            source: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use brokerage_ledger_storage::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn test_add_and_get() {
        let store = ResourceStore::new(MemoryBackend::new());
        store.add_resource("alice", "abc123", "/docs/passport.pdf").await.unwrap();
        assert_eq!(store.get_resource("alice", "abc123").await.unwrap(), "/docs/passport.pdf");

        store.add_resource("alice", "abc123", "/docs/v2.pdf").await.unwrap();
        assert_eq!(store.get_resource("alice", "abc123").await.unwrap(), "/docs/v2.pdf");
    }

    #[tokio::test]
    async fn test_owner_and_hash_do_not_run_together() {
        let store = ResourceStore::new(MemoryBackend::new());
        store.add_resource("ab", "c", "first").await.unwrap();
        store.add_resource("a", "bc", "second").await.unwrap();
        assert_eq!(store.get_resource("ab", "c").await.unwrap(), "first");
        assert_eq!(store.get_resource("a", "bc").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_slash_inside_owner_or_hash() {
        let store = ResourceStore::new(MemoryBackend::new());
        store.add_resource("a/b", "c", "first").await.unwrap();
        store.add_resource("a", "b/c", "second").await.unwrap();
        assert_eq!(store.get_resource("a/b", "c").await.unwrap(), "first");
        assert_eq!(store.get_resource("a", "b/c").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let store = ResourceStore::new(MemoryBackend::new());
        assert!(matches!(
            store.get_resource("alice", "nope").await,
            Err(RecordError::NotFound { key }) if key == resource_key("alice", "nope")
        ));
        assert!(matches!(
            store.add_resource("", "h", "p").await,
            Err(RecordError::InvalidArguments { .. })
        ));
    }
}
