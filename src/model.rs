use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Naive local wall-clock time. No timezone is ever attached.
pub type Timestamp = NaiveDateTime;

/// Store-assigned surrogate key. Monotonic, never reused.
pub type ReservationId = u64;

/// Wire/display format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_timestamp(t: &Timestamp) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// A booking request exactly as the presentation layer collected it.
/// Nothing here has been trimmed or parsed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationRequest {
    pub table_id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub arrival_time: String,
}

/// A request that passed admission: trimmed, parsed, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub table_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub arrival_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub table_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub arrival_time: Timestamp,
}

impl Reservation {
    pub fn new(id: ReservationId, record: NewReservation) -> Self {
        Self {
            id,
            table_id: record.table_id,
            name: record.name,
            phone: record.phone,
            email: record.email,
            arrival_time: record.arrival_time,
        }
    }
}

/// Authorization decision made at the boundary and handed to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Admin,
}

impl Access {
    pub fn is_admin(self) -> bool {
        matches!(self, Access::Admin)
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationDeleted {
        id: ReservationId,
    },
    /// Written first by compaction so ids of deleted rows stay retired.
    SequenceAdvanced {
        next_id: ReservationId,
    },
}
