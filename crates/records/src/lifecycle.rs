//! Brokerage request lifecycle.
//!
//! A request lives only as a row of the requests table. It is created once
//! (row insert and index append in one transaction) and then mutated by
//! partial updates, each touching exactly one field group. Updates are
//! revision-conditional replaces, so two writers racing on the same request
//! never lose each other's change: the slower one gets
//! [`RecordError::Conflict`] and may re-issue.

use std::{fmt, str::FromStr, sync::Arc};

use brokerage_ledger_storage::{StorageBackend, TableLedger, Tables};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    codec::{self, TableRecord},
    config::{Collection, StoreConfig},
    error::{RecordError, RecordResult},
    index::IndexManager,
    model::{BrokerageRequest, TimeStamps},
    query::{Enumeration, QueryService},
};

/// The field group a partial update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// Sets `Meeting` and restamps `TimeStamps`.
    Meeting,
    /// Sets `Video`.
    Video,
    /// Sets `Status`.
    Status,
}

impl UpdateKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meeting => "MEETING",
            Self::Video => "VIDEO",
            Self::Status => "STATUS",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MEETING" => Ok(Self::Meeting),
            "VIDEO" => Ok(Self::Video),
            "STATUS" => Ok(Self::Status),
            other => Err(RecordError::UnknownUpdateKind { kind: other.to_owned() }),
        }
    }
}

/// An update read and applied in memory, not yet written.
///
/// Produced by [`RequestLifecycle::prepare_update`] and written by
/// [`RequestLifecycle::commit_update`]. The write only succeeds if the row
/// is still at `expected_revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Request being updated.
    pub request_id: String,
    /// Revision the update was prepared against.
    pub expected_revision: u64,
    /// The request with the update applied.
    pub request: BrokerageRequest,
    /// Field group changed.
    pub kind: UpdateKind,
}

/// Single-argument update form.
#[derive(Debug, Deserialize)]
struct UpdateEnvelope {
    #[serde(rename = "RequestID", default)]
    request_id: String,
    #[serde(rename = "UpdateType", default)]
    update_type: String,
    #[serde(rename = "Meeting")]
    meeting: Option<String>,
    #[serde(rename = "Video")]
    video: Option<String>,
    #[serde(rename = "Status")]
    status: Option<String>,
}

/// Create, read and partial update of brokerage requests.
#[derive(Clone)]
pub struct RequestLifecycle<B> {
    backend: B,
    tables: Tables<B>,
    index: IndexManager<B>,
    query: QueryService<B>,
    config: Arc<StoreConfig>,
}

impl<B: StorageBackend + Clone> RequestLifecycle<B> {
    /// Creates a lifecycle over `backend`.
    pub fn new(backend: B, config: Arc<StoreConfig>) -> Self {
        Self {
            tables: Tables::new(backend.clone()),
            index: IndexManager::new(backend.clone(), Arc::clone(&config)),
            query: QueryService::new(backend.clone(), Arc::clone(&config)),
            backend,
            config,
        }
    }

    fn table(&self) -> &str {
        self.config.requests_table()
    }

    /// Creates a request from its JSON form and returns its identifier.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Marshal`] if `json` is not a request
    /// - otherwise as [`create_request`](Self::create_request)
    pub async fn create(&self, json: &[u8]) -> RecordResult<String> {
        let request: BrokerageRequest = codec::decode(json)?;
        self.create_request(request).await
    }

    /// Creates a request and returns its identifier.
    ///
    /// Any supplied `TimeStamps` are replaced by a submission stamp. The row
    /// insert and the applications index append commit together.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidArguments`] if `RequestID` is empty
    /// - [`RecordError::DuplicateKey`] if a request with that identifier exists
    /// - [`RecordError::Conflict`] if the request or the index was written
    ///   concurrently
    /// - [`RecordError::LedgerRead`] / [`RecordError::LedgerWrite`] on ledger failures
    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn create_request(&self, mut request: BrokerageRequest) -> RecordResult<String> {
        if request.request_id.is_empty() {
            return Err(RecordError::invalid_arguments("RequestID must not be empty"));
        }
        request.time_stamps = TimeStamps::submitted_at(Utc::now());
        let row = request.to_row()?;

        let mut txn = self.backend.transaction().await.map_err(RecordError::write)?;
        self.tables
            .insert_row_in(txn.as_mut(), self.table(), row)
            .await
            .map_err(RecordError::read)?;
        self.index
            .append_in(txn.as_mut(), Collection::Applications, &request.request_id, false)
            .await?;
        txn.commit().await.map_err(|e| {
            let err = RecordError::write(e);
            if err.is_retryable() {
                tracing::warn!("concurrent create");
            }
            err
        })?;

        tracing::info!("request created");
        Ok(request.request_id)
    }

    /// Reads a request.
    ///
    /// # Errors
    ///
    /// - [`RecordError::NotFound`] if no request has that identifier
    /// - [`RecordError::SchemaMismatch`] if the stored row does not match the schema
    /// - [`RecordError::LedgerRead`] on ledger failures
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, request_id: &str) -> RecordResult<BrokerageRequest> {
        self.fetch(request_id)
            .await?
            .map(|(_, request)| request)
            .ok_or_else(|| RecordError::not_found(request_id))
    }

    async fn fetch(&self, request_id: &str) -> RecordResult<Option<(u64, BrokerageRequest)>> {
        let Some(stored) = self
            .tables
            .get_row(self.table(), request_id.as_bytes())
            .await
            .map_err(RecordError::read)?
        else {
            return Ok(None);
        };
        tracing::debug!(request_id, revision = stored.revision, "request read");
        Ok(Some((stored.revision, BrokerageRequest::from_row(&stored.row)?)))
    }

    /// Reads a request and applies one update in memory.
    ///
    /// `MEETING` stores `payload` as the meeting and replaces the time
    /// stamps with a fresh meeting stamp. `VIDEO` stores the payload bytes.
    /// `STATUS` stores the payload as the status. Nothing else changes.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidArguments`] if `request_id` is empty
    /// - [`RecordError::NotFound`] if no request has that identifier
    /// - as [`get`](Self::get) otherwise
    pub async fn prepare_update(
        &self,
        request_id: &str,
        kind: UpdateKind,
        payload: &str,
    ) -> RecordResult<PendingUpdate> {
        if request_id.is_empty() {
            return Err(RecordError::invalid_arguments("RequestID must not be empty"));
        }
        let (revision, mut request) =
            self.fetch(request_id).await?.ok_or_else(|| RecordError::not_found(request_id))?;

        match kind {
            UpdateKind::Meeting => {
                request.meeting = payload.to_owned();
                request.time_stamps = TimeStamps::meeting_at(Utc::now());
            },
            UpdateKind::Video => request.video = payload.as_bytes().to_vec(),
            UpdateKind::Status => request.status = payload.to_owned(),
        }

        Ok(PendingUpdate {
            request_id: request_id.to_owned(),
            expected_revision: revision,
            request,
            kind,
        })
    }

    /// Writes a prepared update and returns the request's time stamps.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Conflict`] if the request changed since it was prepared
    /// - [`RecordError::NotFound`] if the request no longer exists
    /// - [`RecordError::LedgerRead`] if the current row cannot be read
    /// - [`RecordError::LedgerWrite`] if the replace cannot be committed
    #[tracing::instrument(
        skip(self, pending),
        fields(
            request_id = %pending.request_id,
            kind = %pending.kind,
            expected_revision = pending.expected_revision,
        )
    )]
    pub async fn commit_update(&self, pending: PendingUpdate) -> RecordResult<TimeStamps> {
        let row = pending.request.to_row()?;
        let stale = |err: RecordError| {
            if err.is_retryable() {
                tracing::warn!("request changed since the update was prepared");
            }
            err
        };

        let mut txn = self.backend.transaction().await.map_err(RecordError::write)?;
        let revision = self
            .tables
            .replace_row_if_in(txn.as_mut(), self.table(), row, pending.expected_revision)
            .await
            .map_err(|e| stale(RecordError::read(e)))?;
        txn.commit().await.map_err(|e| stale(RecordError::write(e)))?;

        tracing::info!(revision, "request updated");
        Ok(pending.request.time_stamps)
    }

    /// Applies one partial update and returns the request's time stamps.
    ///
    /// # Errors
    ///
    /// As [`prepare_update`](Self::prepare_update) and
    /// [`commit_update`](Self::commit_update). Conflicts are not retried.
    pub async fn update(
        &self,
        request_id: &str,
        kind: UpdateKind,
        payload: &str,
    ) -> RecordResult<TimeStamps> {
        let pending = self.prepare_update(request_id, kind, payload).await?;
        self.commit_update(pending).await
    }

    /// Applies an update given as
    /// `{"RequestID", "UpdateType", "Meeting" | "Video" | "Status"}`.
    ///
    /// The field named by `UpdateType` carries the payload.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Marshal`] if `json` is malformed
    /// - [`RecordError::UnknownUpdateKind`] for an unrecognized `UpdateType`
    /// - [`RecordError::InvalidArguments`] if the payload field is missing
    /// - as [`update`](Self::update) otherwise
    pub async fn update_from_json(&self, json: &[u8]) -> RecordResult<TimeStamps> {
        let envelope: UpdateEnvelope = codec::decode(json)?;
        let kind: UpdateKind = envelope.update_type.parse()?;
        let payload = match kind {
            UpdateKind::Meeting => envelope.meeting,
            UpdateKind::Video => envelope.video,
            UpdateKind::Status => envelope.status,
        };
        let Some(payload) = payload else {
            return Err(RecordError::invalid_arguments(format!(
                "{kind} update carries no payload"
            )));
        };
        self.update(&envelope.request_id, kind, &payload).await
    }

    /// Enumerates every request named by the applications index.
    ///
    /// # Errors
    ///
    /// As [`QueryService::enumerate`].
    #[tracing::instrument(skip(self))]
    pub async fn list_all(&self) -> RecordResult<Enumeration<BrokerageRequest>> {
        self.query
            .enumerate(Collection::Applications, |id| async move {
                self.fetch(&id).await.map(|found| found.map(|(_, request)| request))
            })
            .await
    }
}
