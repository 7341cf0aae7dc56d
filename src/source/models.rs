use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workplace {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub workplace_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CessionStatus {
    Active,
    Finished,
    Expired,
}

impl CessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CessionStatus::Active => "ACTIVE",
            CessionStatus::Finished => "FINISHED",
            CessionStatus::Expired => "EXPIRED",
        }
    }
}

/// A salary-assignment loan attached to one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cession {
    pub id: Uuid,
    pub monthly_payment: f64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub expected_payoff_date: Option<NaiveDate>,
    pub remaining_balance: f64,
    pub total_loan_amount: f64,
    /// Percentage repaid, 0..=100
    pub current_progress: f64,
    pub months_remaining: u32,
    pub bank_or_agency: Option<String>,
    pub status: CessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub client_number: u32,
    pub full_name: String,
    pub cin: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub worker_number: Option<String>,
    pub workplace: Option<Workplace>,
    pub job: Option<Job>,
    #[serde(default)]
    pub cessions: Vec<Cession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Missing when the owning cession was deleted
    pub cession_id: Option<Uuid>,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything the snapshot reads, in one place. Also the seed file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub workplaces: Vec<Workplace>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}
