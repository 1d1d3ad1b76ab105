//! Entity encoding.
//!
//! Simple entities are JSON blobs ([`encode`], [`decode`]). Brokerage
//! requests are table rows ([`TableRecord`]); the row is both ordered and
//! named, and [`TableRecord::from_row`] refuses any row whose column count,
//! names or types deviate from the declared schema.
//!
//! # Requests table, schema version 2
//!
//! | # | Column | Type |
//! |---|--------|------|
//! | 0 | RequestID (key) | string |
//! | 1 | Submitter | string |
//! | 2 | Approver | string |
//! | 3 | Documents | bytes |
//! | 4 | PersonalDetails | bytes |
//! | 5 | KYCDetails | bytes |
//! | 6 | Status | string |
//! | 7 | DocValidationReport | bytes |
//! | 8 | FacialValidation | bytes |
//! | 9 | Video | bytes |
//! | 10 | TimeStamps | bytes (JSON) |
//! | 11 | Meeting | string |

use brokerage_ledger_storage::{
    ColumnValue, Row,
    table::{ColumnDefinition, ColumnType, TableSchema},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{RecordError, RecordResult},
    model::{BrokerageRequest, TimeStamps},
};

/// Encodes an entity as its canonical JSON blob.
///
/// # Errors
///
/// Returns [`RecordError::Marshal`] if serialization fails.
pub fn encode<T: Serialize>(entity: &T) -> RecordResult<Vec<u8>> {
    serde_json::to_vec(entity).map_err(|e| RecordError::marshal("encode entity", e))
}

/// Decodes an entity from a JSON blob.
///
/// # Errors
///
/// Returns [`RecordError::Marshal`] on malformed input.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> RecordResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| RecordError::marshal(format!("decode {}", short_type_name::<T>()), e))
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Mapping between an entity and a table row.
pub trait TableRecord: Sized {
    /// Version recorded with every stored row.
    const SCHEMA_VERSION: u32;

    /// Column declarations in positional order.
    fn columns() -> Vec<ColumnDefinition>;

    /// Declared schema under the given table name.
    fn schema(table: &str) -> TableSchema {
        TableSchema::new(table, Self::SCHEMA_VERSION, Self::columns())
    }

    /// Builds the row. The result always validates against [`Self::schema`].
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Marshal`] if a structured column cannot be encoded.
    fn to_row(&self) -> RecordResult<Row>;

    /// Reads an entity back from a row.
    ///
    /// # Errors
    ///
    /// - [`RecordError::SchemaMismatch`] if the row's shape deviates from the schema
    /// - [`RecordError::Marshal`] if a structured column cannot be decoded
    fn from_row(row: &Row) -> RecordResult<Self>;
}

const REQUEST_COLUMNS: [(&str, ColumnType); 12] = [
    ("RequestID", ColumnType::String),
    ("Submitter", ColumnType::String),
    ("Approver", ColumnType::String),
    ("Documents", ColumnType::Bytes),
    ("PersonalDetails", ColumnType::Bytes),
    ("KYCDetails", ColumnType::Bytes),
    ("Status", ColumnType::String),
    ("DocValidationReport", ColumnType::Bytes),
    ("FacialValidation", ColumnType::Bytes),
    ("Video", ColumnType::Bytes),
    ("TimeStamps", ColumnType::Bytes),
    ("Meeting", ColumnType::String),
];

impl TableRecord for BrokerageRequest {
    const SCHEMA_VERSION: u32 = 2;

    fn columns() -> Vec<ColumnDefinition> {
        REQUEST_COLUMNS
            .iter()
            .enumerate()
            .map(|(idx, (name, column_type))| {
                if idx == 0 {
                    ColumnDefinition::key(*name, *column_type)
                } else {
                    ColumnDefinition::new(*name, *column_type)
                }
            })
            .collect()
    }

    fn to_row(&self) -> RecordResult<Row> {
        let time_stamps = encode(&self.time_stamps)?;
        Ok(Row::new()
            .with_string("RequestID", self.request_id.as_str())
            .with_string("Submitter", self.submitter.as_str())
            .with_string("Approver", self.approver.as_str())
            .with_bytes("Documents", self.documents.as_slice())
            .with_bytes("PersonalDetails", self.personal_details.as_slice())
            .with_bytes("KYCDetails", self.kyc_details.as_slice())
            .with_string("Status", self.status.as_str())
            .with_bytes("DocValidationReport", self.doc_validation_report.as_slice())
            .with_bytes("FacialValidation", self.facial_validation.as_slice())
            .with_bytes("Video", self.video.as_slice())
            .with_bytes("TimeStamps", time_stamps)
            .with_string("Meeting", self.meeting.as_str()))
    }

    fn from_row(row: &Row) -> RecordResult<Self> {
        let reader = RowReader::new(row, &REQUEST_COLUMNS)?;

        let time_stamps = reader.bytes(10)?;
        let time_stamps = if time_stamps.is_empty() {
            TimeStamps::default()
        } else {
            decode(time_stamps)?
        };

        Ok(Self {
            request_id: reader.string(0)?.to_owned(),
            submitter: reader.string(1)?.to_owned(),
            approver: reader.string(2)?.to_owned(),
            documents: reader.bytes(3)?.to_vec(),
            personal_details: reader.bytes(4)?.to_vec(),
            kyc_details: reader.bytes(5)?.to_vec(),
            status: reader.string(6)?.to_owned(),
            doc_validation_report: reader.bytes(7)?.to_vec(),
            facial_validation: reader.bytes(8)?.to_vec(),
            video: reader.bytes(9)?.to_vec(),
            time_stamps,
            meeting: reader.string(11)?.to_owned(),
        })
    }
}

/// Positional, name-checked access to a row.
struct RowReader<'a> {
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    /// Checks count, then name and type at every position.
    fn new(row: &'a Row, layout: &[(&str, ColumnType)]) -> RecordResult<Self> {
        if row.len() != layout.len() {
            return Err(RecordError::schema_mismatch(format!(
                "expected {} columns, got {}",
                layout.len(),
                row.len()
            )));
        }
        for (idx, (column, (name, column_type))) in row.columns.iter().zip(layout).enumerate() {
            if column.name != *name {
                return Err(RecordError::schema_mismatch(format!(
                    "column {idx}: expected {name}, got {}",
                    column.name
                )));
            }
            if column.value.column_type() != *column_type {
                return Err(RecordError::schema_mismatch(format!(
                    "column {name}: expected {column_type}, got {}",
                    column.value.column_type()
                )));
            }
        }
        Ok(Self { row })
    }

    fn value(&self, idx: usize) -> RecordResult<&'a ColumnValue> {
        self.row
            .columns
            .get(idx)
            .map(|c| &c.value)
            .ok_or_else(|| RecordError::schema_mismatch(format!("column {idx} is missing")))
    }

    fn string(&self, idx: usize) -> RecordResult<&'a str> {
        match self.value(idx)? {
            ColumnValue::String(s) => Ok(s),
            ColumnValue::Bytes(_) => {
                Err(RecordError::schema_mismatch(format!("column {idx}: expected string")))
            },
        }
    }

    fn bytes(&self, idx: usize) -> RecordResult<&'a [u8]> {
        match self.value(idx)? {
            ColumnValue::Bytes(b) => Ok(b),
            ColumnValue::String(_) => {
                Err(RecordError::schema_mismatch(format!("column {idx}: expected bytes")))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::model::{Thing, User};

    fn sample_request() -> BrokerageRequest {
        BrokerageRequest {
            request_id: "R1".into(),
            submitter: "alice".into(),
            approver: "bob".into(),
            documents: b"passport.pdf".to_vec(),
            status: "NEW".into(),
            time_stamps: TimeStamps { submit: Some("Mon Jan  2 15:04:05 UTC 2006".into()), ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn test_row_validates_against_schema() {
        let row = sample_request().to_row().unwrap();
        let schema = BrokerageRequest::schema("BrokerageRequests");
        schema.validate(&row).unwrap();
        assert_eq!(schema.version, 2);
        assert_eq!(schema.key_position(), Some(0));
        assert_eq!(row.len(), 12);
    }

    #[test]
    fn test_row_round_trip() {
        let request = sample_request();
        let decoded = BrokerageRequest::from_row(&request.to_row().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_short_row_rejected() {
        let mut row = sample_request().to_row().unwrap();
        row.columns.pop();
        assert!(matches!(BrokerageRequest::from_row(&row), Err(RecordError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_long_row_rejected() {
        let row = sample_request().to_row().unwrap().with_string("Extra", "x");
        assert!(matches!(BrokerageRequest::from_row(&row), Err(RecordError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_swapped_columns_rejected() {
        let mut row = sample_request().to_row().unwrap();
        row.columns.swap(1, 2);
        assert!(matches!(BrokerageRequest::from_row(&row), Err(RecordError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_mistyped_column_rejected() {
        let mut row = sample_request().to_row().unwrap();
        row.columns[6].value = ColumnValue::Bytes(b"NEW".to_vec());
        assert!(matches!(BrokerageRequest::from_row(&row), Err(RecordError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_empty_time_stamps_column_decodes_default() {
        let mut row = sample_request().to_row().unwrap();
        row.columns[10].value = ColumnValue::Bytes(Vec::new());
        let decoded = BrokerageRequest::from_row(&row).unwrap();
        assert_eq!(decoded.time_stamps, TimeStamps::default());
    }

    #[test]
    fn test_corrupt_time_stamps_column_is_marshal_error() {
        let mut row = sample_request().to_row().unwrap();
        row.columns[10].value = ColumnValue::Bytes(b"{not json".to_vec());
        assert!(matches!(BrokerageRequest::from_row(&row), Err(RecordError::Marshal { .. })));
    }

    #[test]
    fn test_decode_malformed_blob() {
        let result: RecordResult<Thing> = decode(b"not json");
        assert!(matches!(result, Err(RecordError::Marshal { message, .. }) if message == "decode Thing"));
    }

    fn bytes() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 0..32)
    }

    fn time_stamps() -> impl Strategy<Value = TimeStamps> {
        (proptest::option::of(".*"), proptest::option::of(".*"), proptest::option::of(".*"))
            .prop_map(|(submit, meeting, final_status)| TimeStamps { submit, meeting, final_status })
    }

    prop_compose! {
        fn request()(
            strings in proptest::collection::vec(".*", 5),
            binaries in proptest::collection::vec(bytes(), 6),
            time_stamps in time_stamps(),
        ) -> BrokerageRequest {
            BrokerageRequest {
                request_id: strings[0].clone(),
                submitter: strings[1].clone(),
                approver: strings[2].clone(),
                status: strings[3].clone(),
                meeting: strings[4].clone(),
                documents: binaries[0].clone(),
                personal_details: binaries[1].clone(),
                kyc_details: binaries[2].clone(),
                doc_validation_report: binaries[3].clone(),
                facial_validation: binaries[4].clone(),
                video: binaries[5].clone(),
                time_stamps,
            }
        }
    }

    prop_compose! {
        fn user()(
            strings in proptest::collection::vec(".*", 8),
            things in proptest::collection::vec("[a-z0-9]{1,8}", 0..4),
        ) -> User {
            User {
                user_id: strings[0].clone(),
                salt: strings[1].clone(),
                hash: strings[2].clone(),
                first_name: strings[3].clone(),
                last_name: strings[4].clone(),
                things,
                address: strings[5].clone(),
                phone_number: strings[6].clone(),
                email_address: strings[7].clone(),
            }
        }
    }

    proptest! {
        #[test]
        fn request_blob_and_row_round_trip(request in request()) {
            let blob: BrokerageRequest = decode(&encode(&request).unwrap()).unwrap();
            prop_assert_eq!(&blob, &request);

            let row = request.to_row().unwrap();
            prop_assert!(BrokerageRequest::schema("BrokerageRequests").validate(&row).is_ok());
            prop_assert_eq!(BrokerageRequest::from_row(&row).unwrap(), request);
        }

        #[test]
        fn user_blob_round_trip(user in user()) {
            let decoded: User = decode(&encode(&user).unwrap()).unwrap();
            prop_assert_eq!(decoded, user);
        }

        #[test]
        fn thing_blob_round_trip(id in ".*", description in ".*") {
            let thing = Thing { id, description };
            let decoded: Thing = decode(&encode(&thing).unwrap()).unwrap();
            prop_assert_eq!(decoded, thing);
        }
    }
}
