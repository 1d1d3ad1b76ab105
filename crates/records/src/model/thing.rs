use serde::{Deserialize, Serialize};

/// An item owned by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thing {
    /// Natural key; the blob is stored under `thing/{id}`.
    #[serde(default)]
    pub id: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}
