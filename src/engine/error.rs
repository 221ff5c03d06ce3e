use crate::store::StoreError;

/// Hard failures. Rejected bookings are not errors; see `Rejection`.
#[derive(Debug)]
pub enum EngineError {
    /// Operation needs an admin session.
    Unauthorized(&'static str),
    LimitExceeded(&'static str),
    Storage(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unauthorized(op) => write!(f, "not authorized: {op} requires admin login"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Full => EngineError::LimitExceeded("too many reservations"),
            StoreError::Wal(msg) => EngineError::Storage(msg),
        }
    }
}
