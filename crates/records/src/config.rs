//! Configuration for the record store.
//!
//! [`StoreConfig`] names the index key of every collection, the requests
//! table, and the duplicate and enumeration policies. It can be built in
//! code through a validating builder or deserialized from JSON; both paths
//! run the same validation.
//!
//! # Example
//!
//! ```
//! use brokerage_ledger_records::{DuplicatePolicy, StoreConfig};
//!
//! let config = StoreConfig::builder()
//!     .users("_users")
//!     .duplicate_policy(DuplicatePolicy::DedupOnRead)
//!     .build()?;
//! assert_eq!(config.applications().key(), "_applications");
//! # Ok::<(), brokerage_ledger_records::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys;

/// Default index key of the users collection.
pub const DEFAULT_USERS_KEY: &str = "_users";

/// Default index key of the things collection.
pub const DEFAULT_THINGS_KEY: &str = "_things";

/// Default index key of the brokerage applications collection.
pub const DEFAULT_APPLICATIONS_KEY: &str = "_applications";

/// Default name of the brokerage requests table.
pub const DEFAULT_REQUESTS_TABLE: &str = "BrokerageRequests";

/// Configuration validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration document could not be parsed.
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The indexed collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Users, keyed by `userId`.
    Users,
    /// Things, keyed by `id`.
    Things,
    /// Brokerage applications, keyed by `RequestID`.
    Applications,
}

impl Collection {
    /// Every collection, in initialization order.
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Things, Collection::Applications];
}

/// Per-collection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    key: String,
}

impl CollectionConfig {
    /// Creates a collection config with the given index key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The ledger key holding the collection's index.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl From<&str> for CollectionConfig {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// What an index does with an identifier it already contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Appending an identifier already present fails with `DuplicateKey`.
    #[default]
    Reject,
    /// Duplicates are stored; listing returns each identifier once, in
    /// first-occurrence order.
    DedupOnRead,
}

/// What enumeration does with index members missing from the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationPolicy {
    /// Skip missing members and report them alongside the results.
    #[default]
    ContinueAndReport,
    /// Fail the whole enumeration on the first missing member.
    FailFast,
}

/// Record store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_users")]
    users: CollectionConfig,

    #[serde(default = "default_things")]
    things: CollectionConfig,

    #[serde(default = "default_applications")]
    applications: CollectionConfig,

    #[serde(default = "default_requests_table")]
    requests_table: String,

    #[serde(default)]
    duplicate_policy: DuplicatePolicy,

    #[serde(default)]
    enumeration_policy: EnumerationPolicy,
}

fn default_users() -> CollectionConfig {
    CollectionConfig::new(DEFAULT_USERS_KEY)
}

fn default_things() -> CollectionConfig {
    CollectionConfig::new(DEFAULT_THINGS_KEY)
}

fn default_applications() -> CollectionConfig {
    CollectionConfig::new(DEFAULT_APPLICATIONS_KEY)
}

fn default_requests_table() -> String {
    DEFAULT_REQUESTS_TABLE.to_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            things: default_things(),
            applications: default_applications(),
            requests_table: default_requests_table(),
            duplicate_policy: DuplicatePolicy::default(),
            enumeration_policy: EnumerationPolicy::default(),
        }
    }
}

#[bon::bon]
impl StoreConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `users`, `things`, `applications` - index keys (defaults `_users`,
    ///   `_things`, `_applications`)
    /// * `requests_table` - table name (default `BrokerageRequests`)
    /// * `duplicate_policy` - default [`DuplicatePolicy::Reject`]
    /// * `enumeration_policy` - default [`EnumerationPolicy::ContinueAndReport`]
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - An index key is empty
    /// - An index key starts with a prefix reserved for stored entities
    ///   ([`keys::RESERVED_PREFIXES`])
    /// - Two collections share an index key
    /// - The table name is empty
    #[builder]
    pub fn new(
        #[builder(into, default = default_users())] users: CollectionConfig,
        #[builder(into, default = default_things())] things: CollectionConfig,
        #[builder(into, default = default_applications())] applications: CollectionConfig,
        #[builder(into, default = default_requests_table())] requests_table: String,
        #[builder(default)] duplicate_policy: DuplicatePolicy,
        #[builder(default)] enumeration_policy: EnumerationPolicy,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            users,
            things,
            applications,
            requests_table,
            duplicate_policy,
            enumeration_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration document. Absent fields
    /// take their defaults; unknown fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by the builder.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for collection in Collection::ALL {
            let key = self.collection(collection).key();
            if key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "index key of {collection:?} cannot be empty"
                )));
            }
            if keys::is_reserved(key) {
                return Err(ConfigError::Invalid(format!(
                    "index key {key} of {collection:?} is inside a reserved namespace"
                )));
            }
        }

        let keys = [self.users.key(), self.things.key(), self.applications.key()];
        for (i, a) in keys.iter().enumerate() {
            if keys.iter().skip(i + 1).any(|b| b == a) {
                return Err(ConfigError::Invalid(format!("index key {a} is used twice")));
            }
        }

        if self.requests_table.is_empty() {
            return Err(ConfigError::Invalid("requests_table cannot be empty".into()));
        }

        Ok(())
    }

    /// Settings of one collection.
    #[must_use]
    pub fn collection(&self, collection: Collection) -> &CollectionConfig {
        match collection {
            Collection::Users => &self.users,
            Collection::Things => &self.things,
            Collection::Applications => &self.applications,
        }
    }

    /// Users collection settings.
    #[must_use]
    pub fn users(&self) -> &CollectionConfig {
        &self.users
    }

    /// Things collection settings.
    #[must_use]
    pub fn things(&self) -> &CollectionConfig {
        &self.things
    }

    /// Applications collection settings.
    #[must_use]
    pub fn applications(&self) -> &CollectionConfig {
        &self.applications
    }

    /// Name of the brokerage requests table.
    #[must_use]
    pub fn requests_table(&self) -> &str {
        &self.requests_table
    }

    /// Index duplicate policy.
    #[must_use]
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Enumeration policy.
    #[must_use]
    pub fn enumeration_policy(&self) -> EnumerationPolicy {
        self.enumeration_policy
    }
}
