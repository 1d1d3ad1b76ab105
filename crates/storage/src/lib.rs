//! Ledger collaborator contract for the brokerage record store.
//!
//! This crate provides the [`StorageBackend`] trait (the key/value half of
//! the ledger), the [`TableLedger`] trait (the tabular half) and the error
//! taxonomy of the ledger boundary. The record layer is generic over these
//! traits; consensus, signing and transport live behind them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Command Surface                        │
//! │             (command name + string arguments)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       Record Layer                          │
//! │  IndexManager │ RequestLifecycle │ QueryService │ ...       │
//! │         (codecs, indexes, partial updates)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                brokerage-ledger-storage                     │
//! │        StorageBackend trait  │  TableLedger trait           │
//! │  (get, set, compare_and_set, │  (schemas, rows, revisions)  │
//! │   delete, transaction)       │                              │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │    MemoryBackend (development, tests) │ remote ledger       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use brokerage_ledger_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"u1".to_vec(), br#"{"userId":"u1"}"#.to_vec()).await?;
//!     let value = backend.get(b"u1").await?;
//!     assert!(value.is_some());
//!
//!     // Blob and index written atomically
//!     let mut txn = backend.transaction().await?;
//!     txn.compare_and_set(b"_users".to_vec(), None, br#"["u2"]"#.to_vec())?;
//!     txn.set(b"u2".to_vec(), br#"{"userId":"u2"}"#.to_vec());
//!     txn.commit().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait
//! 2. Implement a corresponding [`Transaction`] type
//! 3. Map backend-specific errors to [`StorageError`]
//!
//! Table support comes for free by wrapping the backend in [`Tables`].
//! See the [`memory`] module source for a reference implementation.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with assertion macros and the
//!   failure-injecting `FailingBackend`. Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod table;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod transaction;

pub use backend::StorageBackend;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use table::{Column, ColumnValue, Row, TableLedger, Tables, VersionedRow};
pub use transaction::Transaction;
