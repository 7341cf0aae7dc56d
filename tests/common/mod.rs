#![allow(dead_code)]

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

use exportbox::source::{Cession, CessionStatus, Client, Payment, Workplace};

pub const TEST_KEY: &str = "service-role-test-key";

/// Stand-in for the storage REST API. Answers each upload with the next
/// scripted status (200 once the script runs out) and keeps the last body
/// written under each object name.
#[derive(Default)]
pub struct MockStorage {
    calls: AtomicU32,
    script: Mutex<VecDeque<u16>>,
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MockStorage {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn object(&self, name: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn object_json(&self, name: &str) -> Option<serde_json::Value> {
        self.object(name)
            .map(|bytes| serde_json::from_slice(&bytes).expect("uploaded body is JSON"))
    }
}

async fn upload(
    State(mock): State<Arc<MockStorage>>,
    Path((_bucket, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    mock.calls.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .is_some_and(|value| value == format!("Bearer {TEST_KEY}").as_str());
    if !authorized {
        return StatusCode::UNAUTHORIZED;
    }

    let scripted = mock.script.lock().unwrap().pop_front().unwrap_or(200);
    let status = StatusCode::from_u16(scripted).unwrap();
    if status.is_success() {
        mock.objects.lock().unwrap().insert(name, body);
    }
    status
}

/// Start the mock on an ephemeral port; returns it with its base URL
pub async fn start_mock_storage(script: &[u16]) -> (Arc<MockStorage>, String) {
    let mock = Arc::new(MockStorage {
        script: Mutex::new(script.iter().copied().collect()),
        ..MockStorage::default()
    });

    let app = Router::new()
        .route("/storage/v1/object/{bucket}/{name}", post(upload))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (mock, format!("http://{addr}"))
}

/// Poll `condition` every few milliseconds for up to five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

pub fn workplace(name: &str) -> Workplace {
    Workplace {
        id: Uuid::now_v7(),
        name: name.to_string(),
    }
}

pub fn cession(monthly: f64) -> Cession {
    Cession {
        id: Uuid::now_v7(),
        monthly_payment: monthly,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        expected_payoff_date: None,
        remaining_balance: monthly * 12.0,
        total_loan_amount: monthly * 24.0,
        current_progress: 50.0,
        months_remaining: 12,
        bank_or_agency: None,
        status: CessionStatus::Active,
    }
}

pub fn client(number: u32, name: &str, cessions: Vec<Cession>) -> Client {
    Client {
        id: Uuid::now_v7(),
        client_number: number,
        full_name: name.to_string(),
        cin: None,
        phone_number: Some("0600000000".to_string()),
        address: None,
        worker_number: None,
        workplace: None,
        job: None,
        cessions,
    }
}

pub fn payment(cession_id: Option<Uuid>, amount: f64) -> Payment {
    Payment {
        id: Uuid::now_v7(),
        cession_id,
        amount,
        payment_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        notes: None,
        created_at: Utc.with_ymd_and_hms(2024, 6, 5, 9, 30, 0).unwrap(),
    }
}
