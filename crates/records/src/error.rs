//! Error types for the record layer.
//!
//! Every failure of a record operation surfaces as a [`RecordError`]. Ledger
//! failures are classified at the call site as reads or writes
//! ([`RecordError::read`], [`RecordError::write`]); the ledger conditions
//! that carry their own meaning (conflicts, missing keys, duplicate inserts,
//! schema mismatches) keep it across the boundary.

use brokerage_ledger_storage::StorageError;
use thiserror::Error;

/// Result type alias for record operations.
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Errors returned by record operations and the command surface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// The entity, row or resource does not exist.
    #[error("Not found: {key}")]
    NotFound {
        /// Key or identifier that was looked up.
        key: String,
    },

    /// An insert or index append targeted an identifier that is already present.
    #[error("Duplicate key: {key}")]
    DuplicateKey {
        /// The duplicate identifier.
        key: String,
    },

    /// A row did not match the declared table schema.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// What did not match.
        message: String,
    },

    /// Another writer committed first. Re-read and re-issue as a new transaction.
    #[error("Conflicting concurrent write")]
    Conflict,

    /// The command name is not part of the command surface.
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The rejected command name.
        name: String,
    },

    /// The update kind is not one of `MEETING`, `VIDEO`, `STATUS`.
    #[error("Unknown update kind: {kind}")]
    UnknownUpdateKind {
        /// The rejected update kind.
        kind: String,
    },

    /// Reading from the ledger failed.
    #[error("Ledger read failed: {source}")]
    LedgerRead {
        /// Underlying ledger error.
        #[source]
        source: StorageError,
    },

    /// Writing to the ledger failed.
    #[error("Ledger write failed: {source}")]
    LedgerWrite {
        /// Underlying ledger error.
        #[source]
        source: StorageError,
    },

    /// Bytes could not be decoded into, or an entity could not be encoded to, JSON.
    #[error("Marshal error: {message}")]
    Marshal {
        /// What was being encoded or decoded.
        message: String,
        /// The underlying serializer error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Wrong argument count or an unusable argument value.
    #[error("Invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },

    /// An index named members that could not be fetched.
    #[error("Partial enumeration of {collection}: missing {missing:?}")]
    PartialEnumeration {
        /// Index key of the enumerated collection.
        collection: String,
        /// Identifiers named by the index but absent from the ledger.
        missing: Vec<String>,
    },
}

impl RecordError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `DuplicateKey` error.
    #[must_use]
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Creates a new `InvalidArguments` error.
    #[must_use]
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments { message: message.into() }
    }

    /// Creates a new `SchemaMismatch` error.
    #[must_use]
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch { message: message.into() }
    }

    /// Creates a new `Marshal` error with a message and serializer error.
    #[must_use]
    pub fn marshal(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Marshal { message: message.into(), source: Some(source) }
    }

    /// Classifies a ledger error raised while reading.
    #[must_use]
    pub fn read(err: StorageError) -> Self {
        Self::classify(err, false)
    }

    /// Classifies a ledger error raised while writing or committing.
    #[must_use]
    pub fn write(err: StorageError) -> Self {
        Self::classify(err, true)
    }

    fn classify(err: StorageError, writing: bool) -> Self {
        match err {
            StorageError::Conflict => Self::Conflict,
            StorageError::NotFound { key } => Self::NotFound { key },
            StorageError::AlreadyExists { key } => Self::DuplicateKey { key },
            StorageError::SchemaMismatch { table, message } => {
                Self::SchemaMismatch { message: format!("{table}: {message}") }
            },
            source if writing => Self::LedgerWrite { source },
            source => Self::LedgerRead { source },
        }
    }

    /// Returns `true` if re-issuing the command as a new transaction may
    /// succeed. Only a lost race qualifies.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
