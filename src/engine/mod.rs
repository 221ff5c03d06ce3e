mod admission;
mod availability;
mod error;

pub use admission::{
    evaluate, first_conflict, now_local, parse_arrival_time, precheck, within_gap, Admission,
    Policy, Rejection, DEFAULT_GAP_MINUTES, DEFAULT_MAX_DAYS_AHEAD,
};
pub use availability::tables_conflicting_at;
pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::model::*;
use crate::store::ReservationStore;

use admission::validate_request_limits;

/// Result of a booking attempt that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Confirmed(Reservation),
    Rejected(Rejection),
}

/// Booking front door: admission policy in front of an injected store.
pub struct Engine {
    store: Arc<dyn ReservationStore>,
    policy: Policy,
    /// One lock per table id; held across the conflict read and the insert.
    table_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn ReservationStore>, policy: Policy) -> Self {
        Self {
            store,
            policy,
            table_locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    async fn lock_table(&self, table_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .table_locks
            .entry(table_id.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop the table's lock entry unless another task still holds or waits on it.
    fn release_table(&self, table_id: &str) {
        self.table_locks
            .remove_if(table_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub(crate) fn table_lock_count(&self) -> usize {
        self.table_locks.len()
    }

    /// Admit and persist a booking request.
    ///
    /// Stateless checks run first. Only a request that passes them takes the
    /// table lock for the conflict read and the insert.
    pub async fn reserve(
        &self,
        request: ReservationRequest,
        now: Timestamp,
    ) -> Result<ReserveOutcome, EngineError> {
        validate_request_limits(&request)?;

        let record = match precheck(&request, now, &self.policy) {
            Ok(record) => record,
            Err(rejection) => return Ok(self.rejected(&request.table_id, rejection)),
        };

        let table_id = record.table_id.clone();
        let guard = self.lock_table(&table_id).await;
        let outcome = self.admit_locked(record).await;
        drop(guard);
        self.release_table(&table_id);
        outcome
    }

    async fn admit_locked(&self, record: NewReservation) -> Result<ReserveOutcome, EngineError> {
        let existing = self.store.list_by_table(&record.table_id).await?;
        if let Some(existing) = first_conflict(&existing, record.arrival_time, self.policy.gap) {
            return Ok(self.rejected(&record.table_id, Rejection::Conflict { existing }));
        }

        let id = self.store.insert(record.clone()).await?;
        let reservation = Reservation::new(id, record);
        info!(
            "reservation {id} confirmed: table {} at {}",
            reservation.table_id,
            format_timestamp(&reservation.arrival_time)
        );
        metrics::counter!(crate::observability::RESERVATIONS_ACCEPTED_TOTAL).increment(1);
        Ok(ReserveOutcome::Confirmed(reservation))
    }

    fn rejected(&self, table_id: &str, rejection: Rejection) -> ReserveOutcome {
        debug!("rejected booking for table {:?}: {rejection}", table_id.trim());
        metrics::counter!(
            crate::observability::RESERVATIONS_REJECTED_TOTAL,
            "reason" => rejection.code()
        )
        .increment(1);
        ReserveOutcome::Rejected(rejection)
    }

    /// Tables already booked within the gap of `raw_time`. An unparsable
    /// time yields no tables rather than an error.
    pub async fn taken_tables(&self, raw_time: &str) -> Result<Vec<String>, EngineError> {
        let Some(candidate) = parse_arrival_time(raw_time) else {
            return Ok(Vec::new());
        };
        let all = self.store.list_all().await?;
        Ok(tables_conflicting_at(candidate, &all, self.policy.gap)
            .into_iter()
            .collect())
    }

    pub async fn table_bookings(&self, table_id: &str) -> Result<Vec<Timestamp>, EngineError> {
        Ok(self.store.list_by_table(table_id.trim()).await?)
    }

    /// Dashboard listing, ordered by arrival time.
    pub async fn list_reservations(&self, access: Access) -> Result<Vec<Reservation>, EngineError> {
        if !access.is_admin() {
            return Err(EngineError::Unauthorized("listing reservations"));
        }
        Ok(self.store.list_all().await?)
    }

    /// Unconditional delete by id. Unknown ids are a no-op; returns whether
    /// a reservation was removed.
    pub async fn delete_reservation(
        &self,
        access: Access,
        id: ReservationId,
    ) -> Result<bool, EngineError> {
        if !access.is_admin() {
            return Err(EngineError::Unauthorized("deleting reservations"));
        }
        let removed = self.store.delete(id).await?;
        if removed {
            info!("reservation {id} deleted");
            metrics::counter!(crate::observability::RESERVATIONS_DELETED_TOTAL).increment(1);
        } else {
            debug!("delete of unknown reservation {id} ignored");
        }
        Ok(removed)
    }
}
