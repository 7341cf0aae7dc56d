//! Point-in-time export document
//!
//! [`SnapshotBuilder`] reads the full business dataset through a
//! [`DataSource`], projects every record into its published shape and
//! serializes the result. Clients are mandatory: if they cannot be read the
//! build fails. Payments, workplaces and jobs degrade to empty collections
//! with a warning. Individual records that cannot be projected are dropped
//! and the counts reflect only what was written.

pub mod models;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::humanize::ByteSize;
use crate::source::{Cession, Client, DataSource, Job, Payment, SourceError, Workplace};
use models::{
    ExportCession, ExportClient, ExportDocument, ExportJob, ExportMetadata, ExportPayment,
    ExportWorkplace, FORMAT_VERSION, RecordCounts,
};

/// Why a single record was left out of the document
#[derive(Debug, Error)]
enum ProjectionError {
    #[error("client {0} has a blank name")]
    BlankName(Uuid),
    #[error("{entity} {id} has a non-finite {field}")]
    NonFinite {
        entity: &'static str,
        id: Uuid,
        field: &'static str,
    },
    #[error("payment {0} is not attached to a cession")]
    OrphanPayment(Uuid),
}

/// Serialized snapshot ready for upload
#[derive(Debug, Clone)]
pub struct BuiltSnapshot {
    pub bytes: Bytes,
    pub counts: RecordCounts,
    pub compact: bool,
    pub export_time: DateTime<Utc>,
}

impl BuiltSnapshot {
    pub fn size(&self) -> ByteSize {
        ByteSize::of(&self.bytes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotHealth {
    pub healthy: bool,
    pub source_reachable: bool,
    pub client_count: Option<usize>,
    pub serialization_ok: bool,
    pub message: Option<String>,
}

pub struct SnapshotBuilder {
    source: Arc<dyn DataSource>,
    version: String,
    max_bytes: ByteSize,
}

impl SnapshotBuilder {
    pub fn new(source: Arc<dyn DataSource>, config: &ExportConfig) -> Self {
        Self {
            source,
            version: config.format_version.clone(),
            max_bytes: config.max_snapshot_bytes,
        }
    }

    /// Fetch, project and serialize the current dataset
    pub async fn build(&self, compact: bool) -> Result<BuiltSnapshot, ExportError> {
        let clients = self
            .source
            .clients()
            .await
            .map_err(|err| fetch_failed("clients", err))?;
        let payments = degrade("payments", self.source.payments().await);
        let workplaces = degrade("workplaces", self.source.workplaces().await);
        let jobs = degrade("jobs", self.source.jobs().await);

        let document = self.assemble(&clients, &payments, &workplaces, &jobs, Utc::now());
        let counts = document.metadata.record_count;

        let bytes = if compact {
            serde_json::to_vec(&document)
        } else {
            serde_json::to_vec_pretty(&document)
        }
        .map_err(|err| ExportError::data_generation(format!("failed to serialize snapshot: {err}")))?;

        if bytes.is_empty() {
            return Err(ExportError::data_generation("snapshot serialization produced no output"));
        }

        let size = ByteSize::of(&bytes);
        if size > self.max_bytes {
            return Err(ExportError::data_generation(format!(
                "snapshot is {size}, above the {} limit",
                self.max_bytes
            )));
        }

        info!(
            clients = counts.clients,
            cessions = counts.cessions,
            payments = counts.payments,
            workplaces = counts.workplaces,
            jobs = counts.jobs,
            size = %size,
            compact,
            "Snapshot built"
        );

        Ok(BuiltSnapshot {
            bytes: Bytes::from(bytes),
            counts,
            compact,
            export_time: document.metadata.export_time,
        })
    }

    /// Project raw records into the published document. Counts are taken
    /// from the projected collections, never from the inputs.
    pub fn assemble(
        &self,
        clients: &[Client],
        payments: &[Payment],
        workplaces: &[Workplace],
        jobs: &[Job],
        export_time: DateTime<Utc>,
    ) -> ExportDocument {
        let clients = project_all("client", clients, project_client);
        let payments = project_all("payment", payments, project_payment);
        let workplaces = project_all("workplace", workplaces, |w| Ok(project_workplace(w)));
        let jobs = project_all("job", jobs, |j| Ok(project_job(j)));

        let record_count = RecordCounts {
            clients: clients.len(),
            cessions: clients.iter().map(|client| client.cessions.len()).sum(),
            payments: payments.len(),
            workplaces: workplaces.len(),
            jobs: jobs.len(),
        };

        ExportDocument {
            metadata: ExportMetadata {
                export_time,
                version: self.version.clone(),
                record_count,
            },
            clients,
            payments,
            workplaces,
            jobs,
        }
    }

    /// Check the source and the serializer without building a full snapshot
    pub async fn health(&self) -> SnapshotHealth {
        let (source_reachable, client_count, source_error) = match self.source.count().await {
            Ok(count) => (true, Some(count), None),
            Err(err) => (false, None, Some(err.to_string())),
        };

        let sample = ExportMetadata {
            export_time: Utc::now(),
            version: FORMAT_VERSION.to_string(),
            record_count: RecordCounts::default(),
        };
        let serialization_ok = serde_json::to_vec(&sample).is_ok_and(|bytes| !bytes.is_empty());

        let healthy = source_reachable && serialization_ok;
        let message = match (source_error, serialization_ok) {
            (Some(err), _) => Some(err),
            (None, false) => Some("serializer check failed".to_string()),
            (None, true) => None,
        };

        SnapshotHealth {
            healthy,
            source_reachable,
            client_count,
            serialization_ok,
            message,
        }
    }
}

fn fetch_failed(collection: &str, err: SourceError) -> ExportError {
    let transient = matches!(err, SourceError::Unavailable(_));
    let message = format!("failed to fetch {collection}: {err}");
    if transient {
        ExportError::data_generation_transient(message)
    } else {
        ExportError::data_generation(message)
    }
}

fn degrade<T>(collection: &str, result: Result<Vec<T>, SourceError>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        warn!(collection, error = %err, "Failed to fetch collection, exporting it empty");
        Vec::new()
    })
}

fn project_all<T, U>(
    entity: &str,
    items: &[T],
    project: impl Fn(&T) -> Result<U, ProjectionError>,
) -> Vec<U> {
    let mut projected = Vec::with_capacity(items.len());
    for item in items {
        match project(item) {
            Ok(value) => projected.push(value),
            Err(err) => warn!(entity, error = %err, "Dropping record from snapshot"),
        }
    }
    if projected.len() != items.len() {
        debug!(entity, kept = projected.len(), total = items.len(), "Records dropped");
    }
    projected
}

fn finite(entity: &'static str, id: Uuid, field: &'static str, value: f64) -> Result<f64, ProjectionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProjectionError::NonFinite { entity, id, field })
    }
}

fn project_client(client: &Client) -> Result<ExportClient, ProjectionError> {
    if client.full_name.trim().is_empty() {
        return Err(ProjectionError::BlankName(client.id));
    }

    // A bad cession costs only itself, not the client
    let cessions = project_all("cession", &client.cessions, project_cession);

    Ok(ExportClient {
        id: client.id,
        client_number: client.client_number,
        full_name: client.full_name.clone(),
        cin: client.cin.clone(),
        phone_number: client.phone_number.clone(),
        address: client.address.clone(),
        worker_number: client.worker_number.clone(),
        workplace: client.workplace.as_ref().map(project_workplace),
        job: client.job.as_ref().map(project_job),
        cessions,
    })
}

fn project_cession(cession: &Cession) -> Result<ExportCession, ProjectionError> {
    let id = cession.id;
    Ok(ExportCession {
        id,
        monthly_payment: finite("cession", id, "monthly payment", cession.monthly_payment)?,
        start_date: cession.start_date,
        end_date: cession.end_date,
        expected_payoff_date: cession.expected_payoff_date,
        remaining_balance: finite("cession", id, "remaining balance", cession.remaining_balance)?,
        total_loan_amount: finite("cession", id, "total loan amount", cession.total_loan_amount)?,
        current_progress: finite("cession", id, "progress", cession.current_progress)?,
        months_remaining: cession.months_remaining,
        bank_or_agency: cession.bank_or_agency.clone(),
        status: cession.status.as_str(),
    })
}

fn project_payment(payment: &Payment) -> Result<ExportPayment, ProjectionError> {
    let cession_id = payment
        .cession_id
        .ok_or(ProjectionError::OrphanPayment(payment.id))?;

    Ok(ExportPayment {
        id: payment.id,
        cession_id,
        amount: finite("payment", payment.id, "amount", payment.amount)?,
        payment_date: payment.payment_date,
        notes: payment.notes.clone(),
        created_at: payment.created_at,
    })
}

fn project_workplace(workplace: &Workplace) -> ExportWorkplace {
    ExportWorkplace {
        id: workplace.id,
        name: workplace.name.clone(),
    }
}

fn project_job(job: &Job) -> ExportJob {
    ExportJob {
        id: job.id,
        name: job.name.clone(),
        workplace_id: job.workplace_id,
    }
}
