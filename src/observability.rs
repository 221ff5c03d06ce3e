use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "cafebook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "cafebook_query_duration_seconds";

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: confirmed reservations.
pub const RESERVATIONS_ACCEPTED_TOTAL: &str = "cafebook_reservations_accepted_total";

/// Counter: turned-away requests. Labels: reason.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "cafebook_reservations_rejected_total";

/// Counter: reservations removed by an admin.
pub const RESERVATIONS_DELETED_TOTAL: &str = "cafebook_reservations_deleted_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "cafebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "cafebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "cafebook_connections_rejected_total";

/// Gauge: reservations currently held.
pub const RESERVATIONS_STORED: &str = "cafebook_reservations_stored";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "cafebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "cafebook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertReservation { .. } => "insert_reservation",
        Command::SelectReservations => "select_reservations",
        Command::SelectTableBookings { .. } => "select_table_bookings",
        Command::SelectTakenTables { .. } => "select_taken_tables",
        Command::DeleteReservation { .. } => "delete_reservation",
    }
}
