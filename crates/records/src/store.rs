//! The record store facade.

use std::sync::Arc;

use brokerage_ledger_storage::{StorageBackend, TableLedger, Tables};

use crate::{
    auth::Authenticator,
    codec::TableRecord,
    config::StoreConfig,
    directory::Directory,
    error::{RecordError, RecordResult},
    index::IndexManager,
    lifecycle::RequestLifecycle,
    model::BrokerageRequest,
    resource::ResourceStore,
};

/// All record components over one ledger and one configuration.
///
/// Cloning is cheap; clones share the backend and configuration.
#[derive(Clone)]
pub struct RecordStore<B> {
    backend: B,
    config: Arc<StoreConfig>,
    tables: Tables<B>,
    index: IndexManager<B>,
    lifecycle: RequestLifecycle<B>,
    directory: Directory<B>,
    authenticator: Authenticator<B>,
    resources: ResourceStore<B>,
}

impl<B: StorageBackend + Clone> RecordStore<B> {
    /// Creates a store over `backend`.
    pub fn new(backend: B, config: StoreConfig) -> Self {
        let config = Arc::new(config);
        Self {
            tables: Tables::new(backend.clone()),
            index: IndexManager::new(backend.clone(), Arc::clone(&config)),
            lifecycle: RequestLifecycle::new(backend.clone(), Arc::clone(&config)),
            directory: Directory::new(backend.clone(), Arc::clone(&config)),
            authenticator: Authenticator::new(backend.clone()),
            resources: ResourceStore::new(backend.clone()),
            backend,
            config,
        }
    }

    /// Declares the requests table and empties every index.
    ///
    /// Safe to repeat when the table is already declared with the same
    /// schema. Existing rows and blobs are left in place. The declaration
    /// and the index resets commit together.
    ///
    /// # Errors
    ///
    /// - [`RecordError::SchemaMismatch`] if the table is declared with a
    ///   different schema
    /// - [`RecordError::LedgerRead`] if the current declaration cannot be read
    /// - [`RecordError::LedgerWrite`] if the commit fails
    #[tracing::instrument(skip(self), fields(table = self.config.requests_table()))]
    pub async fn initialize(&self) -> RecordResult<()> {
        let schema = BrokerageRequest::schema(self.config.requests_table());

        let mut txn = self.backend.transaction().await.map_err(RecordError::write)?;
        self.tables.create_table_in(txn.as_mut(), &schema).await.map_err(RecordError::read)?;
        self.index.reset_all_in(txn.as_mut());
        txn.commit().await.map_err(RecordError::write)?;

        tracing::info!("record store initialized");
        Ok(())
    }

    /// Checks that the ledger answers.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::LedgerRead`] if the ledger is unavailable.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> RecordResult<()> {
        self.backend.health_check().await.map_err(RecordError::read)
    }

    /// Overwrites every configured index with an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::LedgerWrite`] on ledger failures.
    pub async fn reset_indexes(&self) -> RecordResult<()> {
        self.index.reset_all().await
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Index maintenance.
    #[must_use]
    pub fn index(&self) -> &IndexManager<B> {
        &self.index
    }

    /// Brokerage request lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> &RequestLifecycle<B> {
        &self.lifecycle
    }

    /// Users and things.
    #[must_use]
    pub fn directory(&self) -> &Directory<B> {
        &self.directory
    }

    /// User existence check.
    #[must_use]
    pub fn authenticator(&self) -> &Authenticator<B> {
        &self.authenticator
    }

    /// Resource paths.
    #[must_use]
    pub fn resources(&self) -> &ResourceStore<B> {
        &self.resources
    }
}
