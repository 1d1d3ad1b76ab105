use serde::{Deserialize, Serialize};

use super::null_as_default;

/// A registered user.
///
/// `salt` and `hash` are stored as given; nothing in this crate compares
/// secrets against them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Natural key; the blob is stored under `user/{userId}`.
    #[serde(default)]
    pub user_id: String,
    /// Password salt.
    #[serde(default)]
    pub salt: String,
    /// Password hash.
    #[serde(default)]
    pub hash: String,
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// Identifiers of owned things.
    #[serde(default, deserialize_with = "null_as_default")]
    pub things: Vec<String>,
    /// Postal address.
    #[serde(default)]
    pub address: String,
    /// Contact phone number.
    #[serde(default)]
    pub phone_number: String,
    /// Contact email.
    #[serde(default)]
    pub email_address: String,
}
