use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "innkeep_bookings_total";

/// Histogram: `book` latency in seconds, lock wait included.
pub const BOOK_DURATION_SECONDS: &str = "innkeep_book_duration_seconds";

/// Counter: committed lifecycle transitions. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "innkeep_transitions_total";

/// Counter: store conflicts. Labels: outcome (retried, surfaced, unavailable).
pub const STORE_CONFLICTS_TOTAL: &str = "innkeep_store_conflicts_total";

/// Counter: store or payment calls that hit the persist timeout. Labels: op.
pub const TIMEOUTS_TOTAL: &str = "innkeep_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms in the inventory that accept bookings.
pub const ROOMS_ACTIVE: &str = "innkeep_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "innkeep_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a booking outcome.
pub fn outcome_label(result: &Result<(), &EngineError>) -> &'static str {
    match result {
        Ok(()) => "booked",
        Err(EngineError::DuplicateRoom(_)) => "duplicate_room",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::InvalidRange { .. }) => "invalid_range",
        Err(EngineError::RoomUnavailable { .. }) => "unavailable",
        Err(EngineError::InvalidTransition { .. }) => "invalid_transition",
        Err(EngineError::Timeout(_)) => "timeout",
        Err(EngineError::PersistenceConflict(_)) => "conflict",
        Err(EngineError::RoomInactive(_)) => "inactive",
        Err(EngineError::RoomInUse { .. }) => "in_use",
        Err(EngineError::CapacityExceeded { .. }) => "capacity",
        Err(EngineError::PaymentDeclined(_)) => "payment_declined",
        Err(EngineError::LimitExceeded(_)) => "limit",
        Err(EngineError::Storage(_)) => "storage",
    }
}
