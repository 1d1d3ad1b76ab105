//! Ledger key layout of the record layer.
//!
//! Every stored blob lives under a namespace of its own, so no identifier a
//! caller supplies can land on another collection's blob, on a table row or
//! schema, or on an index:
//!
//! | Key | Holds |
//! |-----|-------|
//! | `user/{userId}` | User blob |
//! | `thing/{id}` | Thing blob |
//! | `resource/{hex(owner)}/{hex(hash)}` | Resource path |
//! | `_tables/...` | Table schemas and rows |
//! | configured index keys | Identifier lists |
//!
//! Index keys are validated by [`StoreConfig`](crate::StoreConfig) to stay
//! outside the reserved prefixes.

use brokerage_ledger_storage::table::TABLE_PREFIX;

use crate::config::Collection;

/// Prefix of user blobs.
pub const USER_PREFIX: &str = "user/";

/// Prefix of thing blobs.
pub const THING_PREFIX: &str = "thing/";

/// Prefix of resource paths.
pub const RESOURCE_PREFIX: &str = "resource/";

/// Prefixes no index key may start with.
pub const RESERVED_PREFIXES: [&str; 4] = [TABLE_PREFIX, USER_PREFIX, THING_PREFIX, RESOURCE_PREFIX];

/// Ledger key of a user blob.
#[must_use]
pub fn user_key(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Ledger key of a thing blob.
#[must_use]
pub fn thing_key(id: &str) -> String {
    format!("{THING_PREFIX}{id}")
}

/// Ledger key of the blob of `id` in `collection`.
///
/// Applications are table rows and have no blob key.
#[must_use]
pub fn blob_key(collection: Collection, id: &str) -> Option<String> {
    match collection {
        Collection::Users => Some(user_key(id)),
        Collection::Things => Some(thing_key(id)),
        Collection::Applications => None,
    }
}

/// Ledger key of the resource `hash` owned by `owner`.
///
/// Both components are hex-encoded, so a `/` inside either cannot move the
/// boundary between them.
#[must_use]
pub fn resource_key(owner: &str, hash: &str) -> String {
    format!("{RESOURCE_PREFIX}{}/{}", hex::encode(owner), hex::encode(hash))
}

/// Returns `true` if `key` falls inside a namespace owned by entities or tables.
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}
