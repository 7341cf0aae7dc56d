use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{Cession, Client, Dataset, Job, Payment, Workplace};
use super::{DataSource, SourceError};
use crate::config::SourceConfig;
use crate::events::{DataChangeEvent, EntityKind, EventBus, Operation, TransactionEvent};

/// One entity written through a [`Transaction`]
#[derive(Debug, Clone)]
pub enum Record {
    Client(Client),
    Cession { client_id: Uuid, cession: Cession },
    Payment(Payment),
    Workplace(Workplace),
    Job(Job),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Client(_) => EntityKind::Client,
            Record::Cession { .. } => EntityKind::Cession,
            Record::Payment(_) => EntityKind::Payment,
            Record::Workplace(_) => EntityKind::Workplace,
            Record::Job(_) => EntityKind::Job,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::Client(client) => client.id,
            Record::Cession { cession, .. } => cession.id,
            Record::Payment(payment) => payment.id,
            Record::Workplace(workplace) => workplace.id,
            Record::Job(job) => job.id,
        }
    }
}

impl From<Client> for Record {
    fn from(value: Client) -> Self {
        Record::Client(value)
    }
}

impl From<Payment> for Record {
    fn from(value: Payment) -> Self {
        Record::Payment(value)
    }
}

impl From<Workplace> for Record {
    fn from(value: Workplace) -> Self {
        Record::Workplace(value)
    }
}

impl From<Job> for Record {
    fn from(value: Job) -> Self {
        Record::Job(value)
    }
}

#[derive(Debug)]
enum Mutation {
    Put(Operation, Record),
    Delete(EntityKind, Uuid),
}

impl Mutation {
    fn event(&self) -> DataChangeEvent {
        match self {
            Mutation::Put(operation, record) => {
                DataChangeEvent::new(record.kind(), *operation, record.id())
            }
            Mutation::Delete(kind, id) => DataChangeEvent::new(*kind, Operation::Delete, *id),
        }
    }
}

/// In-process transactional store
///
/// Reads clone out of a shared [`Dataset`]. Writes are staged on a
/// [`Transaction`] and applied all-or-nothing on commit, after which one
/// `Committed` event per mutation is published. Rolled back or dropped
/// transactions publish `RolledBack` instead and leave the data untouched.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<Dataset>>,
    bus: EventBus,
}

impl MemoryStore {
    pub fn new(bus: EventBus) -> Self {
        Self::with_dataset(Dataset::default(), bus)
    }

    pub fn with_dataset(dataset: Dataset, bus: EventBus) -> Self {
        Self {
            data: Arc::new(RwLock::new(dataset)),
            bus,
        }
    }

    /// Load a JSON [`Dataset`] from disk
    pub fn load_seed(path: impl AsRef<Path>, bus: EventBus) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        let dataset: Dataset = serde_json::from_slice(&raw)?;
        info!(
            path = %path.display(),
            clients = dataset.clients.len(),
            payments = dataset.payments.len(),
            "Loaded seed dataset"
        );
        Ok(Self::with_dataset(dataset, bus))
    }

    /// Seeded store when `source.seed_path` is set, empty otherwise
    pub fn from_config(config: &SourceConfig, bus: EventBus) -> Result<Self, SourceError> {
        match &config.seed_path {
            Some(path) => Self::load_seed(path, bus),
            None => {
                warn!("No seed dataset configured, starting with an empty store");
                Ok(Self::new(bus))
            }
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn transaction(&self) -> Transaction {
        Transaction {
            store: self.clone(),
            staged: Vec::new(),
            resolved: false,
        }
    }

    /// Copy of the current committed state
    pub async fn dataset(&self) -> Dataset {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl DataSource for MemoryStore {
    async fn clients(&self) -> Result<Vec<Client>, SourceError> {
        Ok(self.data.read().await.clients.clone())
    }

    async fn payments(&self) -> Result<Vec<Payment>, SourceError> {
        Ok(self.data.read().await.payments.clone())
    }

    async fn workplaces(&self) -> Result<Vec<Workplace>, SourceError> {
        Ok(self.data.read().await.workplaces.clone())
    }

    async fn jobs(&self) -> Result<Vec<Job>, SourceError> {
        Ok(self.data.read().await.jobs.clone())
    }

    async fn count(&self) -> Result<usize, SourceError> {
        Ok(self.data.read().await.clients.len())
    }
}

/// Staged writes against a [`MemoryStore`]
#[derive(Debug)]
pub struct Transaction {
    store: MemoryStore,
    staged: Vec<Mutation>,
    resolved: bool,
}

impl Transaction {
    pub fn create(&mut self, record: impl Into<Record>) -> &mut Self {
        self.staged.push(Mutation::Put(Operation::Create, record.into()));
        self
    }

    pub fn update(&mut self, record: impl Into<Record>) -> &mut Self {
        self.staged.push(Mutation::Put(Operation::Update, record.into()));
        self
    }

    pub fn delete(&mut self, kind: EntityKind, id: Uuid) -> &mut Self {
        self.staged.push(Mutation::Delete(kind, id));
        self
    }

    /// Apply every staged mutation atomically and notify subscribers.
    /// Returns the number of mutations applied.
    pub async fn commit(mut self) -> Result<usize, SourceError> {
        self.resolved = true;
        let staged = std::mem::take(&mut self.staged);

        let mut guard = self.store.data.write().await;
        let mut next = guard.clone();
        for mutation in &staged {
            if let Err(err) = apply(&mut next, mutation) {
                drop(guard);
                warn!(error = %err, "Transaction failed, rolling back");
                publish_all(&self.store.bus, &staged, TransactionEvent::RolledBack);
                return Err(err);
            }
        }
        *guard = next;
        drop(guard);

        debug!(mutations = staged.len(), "Transaction committed");
        publish_all(&self.store.bus, &staged, TransactionEvent::Committed);
        Ok(staged.len())
    }

    pub fn rollback(mut self) {
        self.resolve_rolled_back();
    }

    fn resolve_rolled_back(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        let staged = std::mem::take(&mut self.staged);
        if !staged.is_empty() {
            debug!(mutations = staged.len(), "Transaction rolled back");
            publish_all(&self.store.bus, &staged, TransactionEvent::RolledBack);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.resolve_rolled_back();
    }
}

fn publish_all(
    bus: &EventBus,
    staged: &[Mutation],
    wrap: fn(DataChangeEvent) -> TransactionEvent,
) {
    for mutation in staged {
        bus.publish(wrap(mutation.event()));
    }
}

fn upsert_by_id<T>(items: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> Uuid) {
    let id = id_of(&item);
    match items.iter_mut().find(|existing| id_of(existing) == id) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

fn orphan_payments(data: &mut Dataset, cession_ids: &[Uuid]) {
    for payment in &mut data.payments {
        if payment.cession_id.is_some_and(|id| cession_ids.contains(&id)) {
            payment.cession_id = None;
        }
    }
}

fn apply(data: &mut Dataset, mutation: &Mutation) -> Result<(), SourceError> {
    match mutation {
        Mutation::Put(_, record) => match record.clone() {
            Record::Client(client) => upsert_by_id(&mut data.clients, client, |c| c.id),
            Record::Cession { client_id, cession } => {
                let client = data
                    .clients
                    .iter_mut()
                    .find(|client| client.id == client_id)
                    .ok_or_else(|| {
                        SourceError::Invalid(format!(
                            "cession {} references missing client {client_id}",
                            cession.id
                        ))
                    })?;
                upsert_by_id(&mut client.cessions, cession, |c| c.id);
            }
            Record::Payment(payment) => upsert_by_id(&mut data.payments, payment, |p| p.id),
            Record::Workplace(workplace) => {
                for client in &mut data.clients {
                    if client.workplace.as_ref().is_some_and(|w| w.id == workplace.id) {
                        client.workplace = Some(workplace.clone());
                    }
                }
                upsert_by_id(&mut data.workplaces, workplace, |w| w.id);
            }
            Record::Job(job) => {
                for client in &mut data.clients {
                    if client.job.as_ref().is_some_and(|j| j.id == job.id) {
                        client.job = Some(job.clone());
                    }
                }
                upsert_by_id(&mut data.jobs, job, |j| j.id);
            }
        },
        Mutation::Delete(kind, id) => match kind {
            EntityKind::Client => {
                let mut removed = Vec::new();
                data.clients.retain(|client| {
                    if client.id == *id {
                        removed.extend(client.cessions.iter().map(|c| c.id));
                        false
                    } else {
                        true
                    }
                });
                orphan_payments(data, &removed);
            }
            EntityKind::Cession => {
                for client in &mut data.clients {
                    client.cessions.retain(|cession| cession.id != *id);
                }
                orphan_payments(data, &[*id]);
            }
            EntityKind::Payment => data.payments.retain(|payment| payment.id != *id),
            EntityKind::Workplace => {
                data.workplaces.retain(|workplace| workplace.id != *id);
                for client in &mut data.clients {
                    if client.workplace.as_ref().is_some_and(|w| w.id == *id) {
                        client.workplace = None;
                    }
                }
            }
            EntityKind::Job => {
                data.jobs.retain(|job| job.id != *id);
                for client in &mut data.clients {
                    if client.job.as_ref().is_some_and(|j| j.id == *id) {
                        client.job = None;
                    }
                }
            }
        },
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_commit_applies_and_publishes() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let store = MemoryStore::new(bus);

        let client = client(1, "Amina Benali", vec![cession(500.0)]);
        let mut tx = store.transaction();
        tx.create(client.clone());
        assert_eq!(tx.commit().await.unwrap(), 1);

        assert_eq!(store.count().await.unwrap(), 1);
        match events.recv().await.unwrap() {
            TransactionEvent::Committed(event) => {
                assert_eq!(event.entity_kind, EntityKind::Client);
                assert_eq!(event.operation, Operation::Create);
                assert_eq!(event.entity_id, client.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rollback_leaves_data_untouched() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let store = MemoryStore::new(bus);

        let mut tx = store.transaction();
        tx.create(workplace("Hospital"));
        tx.rollback();

        assert!(store.workplaces().await.unwrap().is_empty());
        assert!(matches!(events.recv().await.unwrap(), TransactionEvent::RolledBack(_)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let store = MemoryStore::new(bus);

        {
            let mut tx = store.transaction();
            tx.create(payment(None, 100.0));
        }

        assert!(store.payments().await.unwrap().is_empty());
        assert!(matches!(events.recv().await.unwrap(), TransactionEvent::RolledBack(_)));
    }

    #[tokio::test]
    async fn test_failed_commit_is_atomic() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let store = MemoryStore::new(bus);

        let mut tx = store.transaction();
        tx.create(workplace("School"));
        tx.create(Record::Cession {
            client_id: Uuid::now_v7(),
            cession: cession(300.0),
        });
        assert!(matches!(tx.commit().await, Err(SourceError::Invalid(_))));

        assert!(store.workplaces().await.unwrap().is_empty());
        for _ in 0..2 {
            assert!(matches!(events.recv().await.unwrap(), TransactionEvent::RolledBack(_)));
        }
    }

    #[tokio::test]
    async fn test_deleting_cession_orphans_payments() {
        let store = MemoryStore::new(EventBus::default());
        let loan = cession(400.0);
        let owner = client(7, "Youssef Alaoui", vec![loan.clone()]);
        let paid = payment(Some(loan.id), 400.0);

        let mut tx = store.transaction();
        tx.create(owner).create(paid.clone());
        tx.commit().await.unwrap();

        let mut tx = store.transaction();
        tx.delete(EntityKind::Cession, loan.id);
        tx.commit().await.unwrap();

        let data = store.dataset().await;
        assert!(data.clients[0].cessions.is_empty());
        assert_eq!(data.payments[0].id, paid.id);
        assert_eq!(data.payments[0].cession_id, None);
    }

    #[tokio::test]
    async fn test_load_seed() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("seed.json");
        let dataset = Dataset {
            clients: vec![client(1, "Seed Client", vec![cession(250.0)])],
            workplaces: vec![workplace("Town Hall")],
            ..Dataset::default()
        };
        std::fs::write(&path, serde_json::to_vec(&dataset).unwrap()).unwrap();

        let store = MemoryStore::load_seed(&path, EventBus::default()).unwrap();
        assert_eq!(store.dataset().await, dataset);
    }
}
