//! Entities stored by the record layer.
//!
//! Field names on the wire follow the ledger's established JSON layout:
//! camelCase for users, lowercase for things and PascalCase for brokerage
//! requests. Binary fields travel as standard base64 strings.

mod request;
mod thing;
mod user;

pub use request::{BrokerageRequest, TimeStamps, UNIX_DATE_FORMAT};
use serde::{Deserialize, Deserializer};
pub use thing::Thing;
pub use user::User;

/// Serde adapter for binary fields: base64 text on the wire, zero-length
/// bytes when the field is absent, `null` or empty.
pub(crate) mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(encoded) => STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom),
        }
    }
}

/// Deserializes `null` as the type's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
