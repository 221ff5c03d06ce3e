mod durable;

pub use durable::WalStore;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::limits::MAX_RESERVATIONS;
use crate::model::*;

/// Keyed persistence for reservation records.
///
/// Each call is atomic on its own; nothing here spans a check-then-insert.
/// Callers that need that serialize above the store.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Assign a fresh id, persist, and return the id.
    async fn insert(&self, record: NewReservation) -> Result<ReservationId, StoreError>;

    /// Every reservation, ordered by arrival time (ties by id).
    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError>;

    /// Arrival times booked on one table, ascending.
    async fn list_by_table(&self, table_id: &str) -> Result<Vec<Timestamp>, StoreError>;

    /// Remove a reservation. Returns whether a row existed; absent ids are not an error.
    async fn delete(&self, id: ReservationId) -> Result<bool, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Full,
    Wal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Full => write!(f, "store full: {MAX_RESERVATIONS} reservations"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// In-memory reservation table. Also the state layer under [`WalStore`].
pub struct MemoryStore {
    rows: DashMap<ReservationId, Reservation>,
    next_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: ReservationId) -> bool {
        self.rows.contains_key(&id)
    }

    /// The id the next insert will receive.
    pub fn next_id(&self) -> ReservationId {
        self.next_id.load(Ordering::SeqCst)
    }

    pub(crate) fn allocate_id(&self) -> ReservationId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn ensure_capacity(&self) -> Result<(), StoreError> {
        if self.rows.len() >= MAX_RESERVATIONS {
            return Err(StoreError::Full);
        }
        Ok(())
    }

    /// Apply a WAL event. Replaying the same log twice yields the same state.
    pub fn apply(&self, event: &Event) {
        match event {
            Event::ReservationCreated { reservation } => {
                self.next_id.fetch_max(reservation.id + 1, Ordering::SeqCst);
                self.rows.insert(reservation.id, reservation.clone());
            }
            Event::ReservationDeleted { id } => {
                self.rows.remove(id);
            }
            Event::SequenceAdvanced { next_id } => {
                self.next_id.fetch_max(*next_id, Ordering::SeqCst);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self.rows.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.arrival_time.cmp(&b.arrival_time).then(a.id.cmp(&b.id)));
        all
    }

    pub fn arrival_times(&self, table_id: &str) -> Vec<Timestamp> {
        let mut times: Vec<Timestamp> = self
            .rows
            .iter()
            .filter(|e| e.value().table_id == table_id)
            .map(|e| e.value().arrival_time)
            .collect();
        times.sort();
        times
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert(&self, record: NewReservation) -> Result<ReservationId, StoreError> {
        self.ensure_capacity()?;
        let id = self.allocate_id();
        self.rows.insert(id, Reservation::new(id, record));
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.snapshot())
    }

    async fn list_by_table(&self, table_id: &str) -> Result<Vec<Timestamp>, StoreError> {
        Ok(self.arrival_times(table_id))
    }

    async fn delete(&self, id: ReservationId) -> Result<bool, StoreError> {
        Ok(self.rows.remove(&id).is_some())
    }
}
