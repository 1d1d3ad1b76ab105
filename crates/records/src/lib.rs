//! Indexed record store for brokerage (KYC) requests over a ledger.
//!
//! Users, things and resources are blobs keyed by their identifier inside a
//! namespace per kind ([`keys`]).
//! Brokerage requests are rows of a declared table and change through typed
//! partial updates that touch one field group at a time. Every collection
//! is enumerated through an ordered index of identifiers.
//!
//! # Components
//!
//! | Type | Role |
//! |------|------|
//! | [`IndexManager`] | Per-collection identifier lists |
//! | [`codec`] | Entity to blob and entity to row mapping |
//! | [`RequestLifecycle`] | Create, read and partial update of requests |
//! | [`QueryService`] | Collection enumeration |
//! | [`Authenticator`] | User existence check |
//! | [`ResourceStore`] | Resource paths by owner and hash |
//! | [`Directory`] | Users and things |
//! | [`RecordStore`] | All of the above over one ledger |
//! | [`CommandRouter`] | Named commands with string arguments |
//!
//! # Concurrency
//!
//! Nothing here locks. Read-modify-write cycles rely on the ledger's
//! conditional writes: index appends compare-and-set the index bytes,
//! request updates replace only at the revision they read, and creates
//! insert only if absent. A lost race surfaces as
//! [`RecordError::Conflict`]; re-issuing the command is up to the caller.
//!
//! # Example
//!
//! ```no_run
//! use brokerage_ledger_records::{CommandRouter, RecordStore, StoreConfig};
//! use brokerage_ledger_storage::MemoryBackend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = CommandRouter::new(RecordStore::new(MemoryBackend::new(), StoreConfig::default()));
//! router.execute("init", &[]).await?;
//! router
//!     .execute("create_brokerage_request", &[r#"{"RequestID":"R1","Status":"NEW"}"#.to_owned()])
//!     .await?;
//! let request = router.execute("get_brokerage_request", &["R1".to_owned()]).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod codec;
pub mod command;
pub mod config;
pub mod directory;
pub mod error;
pub mod index;
pub mod keys;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod resource;
pub mod store;

pub use auth::{AuthOutcome, Authenticator};
pub use codec::TableRecord;
pub use command::{COMMANDS, CommandRouter};
pub use config::{
    Collection, CollectionConfig, ConfigError, DuplicatePolicy, EnumerationPolicy, StoreConfig,
};
pub use directory::Directory;
pub use error::{RecordError, RecordResult};
pub use index::IndexManager;
pub use lifecycle::{PendingUpdate, RequestLifecycle, UpdateKind};
pub use model::{BrokerageRequest, Thing, TimeStamps, User};
pub use query::{Enumeration, QueryService};
pub use resource::ResourceStore;
pub use store::RecordStore;
