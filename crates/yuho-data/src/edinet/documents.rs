//! Document-list payloads and the normalized filing candidate.
//!
//! The EDINET `documents.json` endpoint returns one list per calendar day.
//! Each entry is kept verbatim as a [`DocumentRecord`]; [`Candidate`] adds
//! the parsed dates, consolidation scope and withdrawal status that the
//! selector works with.

use crate::error::{DataError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use derive_more::{Display, From};
use serde::{Deserialize, Deserializer, Serialize};

/// Document type code of the annual securities report (yuho).
pub const DOC_TYPE_YUHO: &str = "120";

/// JST offset applied to submission times that carry no zone.
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Opaque EDINET document identifier (e.g. `S100TR7I`).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Create a document id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Response metadata block.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    /// API status as a string (`"200"` on success)
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    /// Status message
    #[serde(default)]
    pub message: Option<String>,
    /// Server-side processing time
    #[serde(default)]
    pub process_date_time: Option<String>,
}

/// Raw `documents.json` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentListResponse {
    /// Metadata block; absent on gateway-level errors
    #[serde(default)]
    pub metadata: Option<ListMetadata>,
    /// Gateway-level status (returned instead of `metadata` on key errors)
    #[serde(rename = "StatusCode", alias = "statusCode", default)]
    pub status_code: Option<u16>,
    /// Gateway-level message
    #[serde(default)]
    pub message: Option<String>,
    /// Documents submitted on the requested day
    #[serde(default)]
    pub results: Vec<DocumentRecord>,
}

/// One entry of a daily document list, as returned by the API.
///
/// Every field is optional; flag fields accept strings, numbers or booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocumentRecord {
    /// Document ID
    #[serde(rename = "docID", default, deserialize_with = "lenient_string")]
    pub doc_id: Option<String>,
    /// EDINET code of the filer
    #[serde(rename = "edinetCode", default, deserialize_with = "lenient_string")]
    pub edinet_code: Option<String>,
    /// Securities code
    #[serde(rename = "secCode", default, deserialize_with = "lenient_string")]
    pub sec_code: Option<String>,
    /// Corporate number
    #[serde(rename = "JCN", default, deserialize_with = "lenient_string")]
    pub jcn: Option<String>,
    /// Filer name
    #[serde(rename = "filerName", default, deserialize_with = "lenient_string")]
    pub filer_name: Option<String>,
    /// Ordinance code
    #[serde(rename = "ordinanceCode", default, deserialize_with = "lenient_string")]
    pub ordinance_code: Option<String>,
    /// Form code
    #[serde(rename = "formCode", default, deserialize_with = "lenient_string")]
    pub form_code: Option<String>,
    /// Document type code (`120` for yuho)
    #[serde(rename = "docTypeCode", default, deserialize_with = "lenient_string")]
    pub doc_type_code: Option<String>,
    /// Period start
    #[serde(rename = "periodStart", default, deserialize_with = "lenient_string")]
    pub period_start: Option<String>,
    /// Period end
    #[serde(rename = "periodEnd", default, deserialize_with = "lenient_string")]
    pub period_end: Option<String>,
    /// Submission date and time (JST)
    #[serde(rename = "submitDateTime", default, deserialize_with = "lenient_string")]
    pub submit_date_time: Option<String>,
    /// Human-readable description
    #[serde(rename = "docDescription", default, deserialize_with = "lenient_string")]
    pub doc_description: Option<String>,
    /// Parent document for corrections
    #[serde(rename = "parentDocID", default, deserialize_with = "lenient_string")]
    pub parent_doc_id: Option<String>,
    /// `1` withdrawal notice, `2` withdrawn document, `0` otherwise
    #[serde(rename = "withdrawalStatus", default, deserialize_with = "lenient_string")]
    pub withdrawal_status: Option<String>,
    /// Document info edit status
    #[serde(rename = "docInfoEditStatus", default, deserialize_with = "lenient_string")]
    pub doc_info_edit_status: Option<String>,
    /// Consolidated scope flag, when the list carries one
    #[serde(rename = "consolidatedFlag", default, deserialize_with = "lenient_string")]
    pub consolidated_flag: Option<String>,
    /// Amendment flag
    #[serde(rename = "amendFlag", default, deserialize_with = "lenient_string")]
    pub amend_flag: Option<String>,
    /// XBRL availability
    #[serde(rename = "xbrlFlag", default, deserialize_with = "lenient_string")]
    pub xbrl_flag: Option<String>,
    /// PDF availability
    #[serde(rename = "pdfFlag", default, deserialize_with = "lenient_string")]
    pub pdf_flag: Option<String>,
    /// Attachment availability
    #[serde(rename = "attachDocFlag", default, deserialize_with = "lenient_string")]
    pub attach_doc_flag: Option<String>,
    /// English document availability
    #[serde(rename = "englishFlag", default, deserialize_with = "lenient_string")]
    pub english_flag: Option<String>,
}

/// Accounting scope of a filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Consolidation {
    /// Group-wide figures
    #[display("consolidated")]
    Consolidated,
    /// Single-entity figures
    #[display("separate")]
    Separate,
    /// The list did not say
    #[display("unknown")]
    Unknown,
}

impl Consolidation {
    /// Normalize the many spellings seen in list payloads.
    pub fn from_flag(flag: Option<&str>) -> Self {
        let Some(text) = flag.map(|f| f.trim().to_lowercase()) else {
            return Self::Unknown;
        };
        match text.as_str() {
            "1" | "true" | "t" | "consolidated" | "c" => Self::Consolidated,
            "0" | "false" | "f" | "separate" | "s" => Self::Separate,
            _ => Self::Unknown,
        }
    }
}

/// A filing candidate extracted from a daily list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Document ID
    pub doc_id: DocId,
    /// Filer EDINET code
    pub filer_code: String,
    /// Document type code
    pub doc_type_code: String,
    /// Parsed period start
    pub period_start: Option<NaiveDate>,
    /// Parsed period end
    pub period_end: Option<NaiveDate>,
    /// Consolidated/separate scope
    pub consolidation: Consolidation,
    /// Submission time with offset (JST when the payload has none)
    pub submitted_at: Option<DateTime<FixedOffset>>,
    /// Withdrawn or a withdrawal notice
    pub withdrawn: bool,
    /// The record this candidate was built from
    pub record: DocumentRecord,
}

impl Candidate {
    /// Build a candidate from a raw record. Records without a document ID
    /// cannot be downloaded and yield `None`.
    pub fn from_record(record: DocumentRecord) -> Option<Self> {
        let doc_id = record.doc_id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;

        Some(Self {
            doc_id: DocId::new(doc_id),
            filer_code: record
                .edinet_code
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_uppercase(),
            doc_type_code: record
                .doc_type_code
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string(),
            period_start: parse_date(record.period_start.as_deref()),
            period_end: parse_date(record.period_end.as_deref()),
            consolidation: Consolidation::from_flag(record.consolidated_flag.as_deref()),
            submitted_at: parse_submit_time(record.submit_date_time.as_deref()),
            withdrawn: matches!(record.withdrawal_status.as_deref().map(str::trim), Some("1" | "2")),
            record,
        })
    }

    /// Whether this candidate is an annual securities report.
    pub fn is_yuho(&self) -> bool {
        self.doc_type_code == DOC_TYPE_YUHO
    }
}

/// A decoded daily document list.
#[derive(Debug, Clone, Default)]
pub struct DocumentList {
    /// Metadata block, when present
    pub metadata: Option<ListMetadata>,
    /// All records of the day
    pub results: Vec<DocumentRecord>,
}

impl DocumentList {
    /// Decode a raw `documents.json` payload.
    ///
    /// Errors embedded in the JSON body are mapped onto the same taxonomy as
    /// HTTP statuses. `url` is only used in error messages.
    pub fn from_slice(payload: &[u8], url: &str) -> Result<Self> {
        let body = payload.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(payload);
        let response: DocumentListResponse =
            serde_json::from_slice(body).map_err(|e| DataError::MalformedResponse {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(code) = response.status_code
            && code != 200
        {
            return Err(DataError::from_status(
                code,
                url,
                response.message.unwrap_or_default(),
            ));
        }

        let metadata = response.metadata;
        match metadata.as_ref().and_then(|m| m.status.as_deref()) {
            None | Some("200") => {}
            Some(status) => {
                let message = metadata
                    .as_ref()
                    .and_then(|m| m.message.clone())
                    .unwrap_or_default();
                return Err(match status.parse::<u16>() {
                    Ok(code) => DataError::from_status(code, url, message),
                    Err(_) => DataError::MalformedResponse {
                        url: url.to_string(),
                        reason: format!("unexpected metadata status {status:?}"),
                    },
                });
            }
        }

        Ok(Self {
            metadata,
            results: response.results,
        })
    }

    /// Candidates of one filer and document type.
    pub fn candidates_for(&self, filer_code: &str, doc_type_code: &str) -> Vec<Candidate> {
        self.results
            .iter()
            .filter(|r| {
                r.edinet_code
                    .as_deref()
                    .is_some_and(|code| code.trim().eq_ignore_ascii_case(filer_code))
                    && r.doc_type_code.as_deref().map(str::trim) == Some(doc_type_code)
            })
            .cloned()
            .filter_map(Candidate::from_record)
            .collect()
    }
}

/// Parse a period date in any of the layouts the API has used.
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let text = value?.trim();
    if text.is_empty() || matches!(text, "-" | "null" | "None") {
        return None;
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Parse a submission timestamp; zone-less values are taken as JST.
pub fn parse_submit_time(value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let text = value?.trim().replace('/', "-");
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed);
    }

    let jst = FixedOffset::east_opt(JST_OFFSET_SECS)?;
    [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
    .and_then(|naive| jst.from_local_datetime(&naive).single())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Bool(b)) => Some(if b { "1" } else { "0" }.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Whether an availability flag is set (`"1"`, `"true"`, `"yes"`, ...).
pub fn is_flag_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_lowercase().as_str(),
            "1" | "true" | "t" | "yes" | "y" | "on"
        )
    })
}
