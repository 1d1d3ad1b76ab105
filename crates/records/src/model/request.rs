use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{base64_bytes, null_as_default};

/// `chrono` rendering of the Unix `date` layout, e.g.
/// `Mon Jan  2 15:04:05 UTC 2006`.
pub const UNIX_DATE_FORMAT: &str = "%a %b %e %H:%M:%S UTC %Y";

/// Transition timestamps of a brokerage request.
///
/// Every update that stamps time replaces the whole record; earlier stamps
/// are not carried over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeStamps {
    /// When the request was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<String>,
    /// When the meeting was last set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting: Option<String>,
    /// When a final status was reached. Nothing in this crate sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<String>,
}

impl TimeStamps {
    /// Record stamped at submission.
    #[must_use]
    pub fn submitted_at(at: DateTime<Utc>) -> Self {
        Self { submit: Some(format_unix_date(at)), ..Self::default() }
    }

    /// Record stamped when a meeting is set.
    #[must_use]
    pub fn meeting_at(at: DateTime<Utc>) -> Self {
        Self { meeting: Some(format_unix_date(at)), ..Self::default() }
    }
}

fn format_unix_date(at: DateTime<Utc>) -> String {
    at.format(UNIX_DATE_FORMAT).to_string()
}

/// A brokerage / KYC application.
///
/// Stored only as a row of the requests table; see
/// [`TableRecord`](crate::codec::TableRecord).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerageRequest {
    /// Unique key.
    #[serde(rename = "RequestID", default)]
    pub request_id: String,
    /// Who submitted the application.
    #[serde(rename = "Submitter", default)]
    pub submitter: String,
    /// Who approves it.
    #[serde(rename = "Approver", default)]
    pub approver: String,
    /// Identity documents.
    #[serde(rename = "Documents", default, with = "base64_bytes")]
    pub documents: Vec<u8>,
    /// Applicant's personal details.
    #[serde(rename = "PersonalDetails", default, with = "base64_bytes")]
    pub personal_details: Vec<u8>,
    /// KYC check results.
    #[serde(rename = "KYCDetails", default, with = "base64_bytes")]
    pub kyc_details: Vec<u8>,
    /// Free-form status, set by `STATUS` updates.
    #[serde(rename = "Status", default)]
    pub status: String,
    /// Document validation report.
    #[serde(rename = "DocValidationReport", default, with = "base64_bytes")]
    pub doc_validation_report: Vec<u8>,
    /// Facial validation result.
    #[serde(rename = "FacialValidation", default, with = "base64_bytes")]
    pub facial_validation: Vec<u8>,
    /// Recorded video, set by `VIDEO` updates.
    #[serde(rename = "Video", default, with = "base64_bytes")]
    pub video: Vec<u8>,
    /// Transition timestamps.
    #[serde(rename = "TimeStamps", default, deserialize_with = "null_as_default")]
    pub time_stamps: TimeStamps,
    /// Meeting slot, set by `MEETING` updates.
    #[serde(rename = "Meeting", default)]
    pub meeting: String,
}
