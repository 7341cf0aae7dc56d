//! Published export document
//!
//! Field names are camelCase and timestamps are fixed-format strings; mobile
//! clients parse this file directly, so the layout is a wire contract.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub clients: Vec<ExportClient>,
    pub payments: Vec<ExportPayment>,
    pub workplaces: Vec<ExportWorkplace>,
    pub jobs: Vec<ExportJob>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    #[serde(serialize_with = "timestamp::millis")]
    pub export_time: DateTime<Utc>,
    pub version: String,
    pub record_count: RecordCounts,
}

/// Per-collection sizes of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub clients: usize,
    /// Sum of the nested cession arrays across all clients
    pub cessions: usize,
    pub payments: usize,
    pub workplaces: usize,
    pub jobs: usize,
}

impl RecordCounts {
    pub fn total(&self) -> usize {
        self.clients + self.cessions + self.payments + self.workplaces + self.jobs
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportClient {
    pub id: Uuid,
    pub client_number: u32,
    pub full_name: String,
    pub cin: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub worker_number: Option<String>,
    pub workplace: Option<ExportWorkplace>,
    pub job: Option<ExportJob>,
    pub cessions: Vec<ExportCession>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCession {
    pub id: Uuid,
    pub monthly_payment: f64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub expected_payoff_date: Option<NaiveDate>,
    pub remaining_balance: f64,
    pub total_loan_amount: f64,
    pub current_progress: f64,
    pub months_remaining: u32,
    pub bank_or_agency: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayment {
    pub id: Uuid,
    pub cession_id: Uuid,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
    #[serde(serialize_with = "timestamp::seconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportWorkplace {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: Uuid,
    pub name: String,
    pub workplace_id: Option<Uuid>,
}

/// Offset-qualified timestamp strings; the document is always built in UTC
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub fn millis<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format("%Y-%m-%dT%H:%M:%S%.3f+00:00"))
    }

    pub fn seconds<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format("%Y-%m-%dT%H:%M:%S+00:00"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_metadata_layout() {
        let metadata = ExportMetadata {
            export_time: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 5).unwrap()
                + chrono::Duration::milliseconds(42),
            version: FORMAT_VERSION.to_string(),
            record_count: RecordCounts {
                clients: 2,
                cessions: 3,
                ..RecordCounts::default()
            },
        };

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            value,
            json!({
                "exportTime": "2024-06-01T10:00:05.042+00:00",
                "version": "1.0",
                "recordCount": {"clients": 2, "cessions": 3, "payments": 0, "workplaces": 0, "jobs": 0}
            })
        );
    }

    #[test]
    fn test_payment_dates_are_strings() {
        let payment = ExportPayment {
            id: Uuid::nil(),
            cession_id: Uuid::nil(),
            amount: 150.5,
            payment_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            notes: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 7, 0).unwrap(),
        };

        let value = serde_json::to_value(&payment).unwrap();
        assert_eq!(value["paymentDate"], "2024-03-09");
        assert_eq!(value["createdAt"], "2024-03-09T14:07:00+00:00");
        assert_eq!(value["cessionId"], Uuid::nil().to_string());
    }
}
