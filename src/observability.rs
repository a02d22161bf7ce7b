use std::net::SocketAddr;

use crate::engine::{EngineError, ErrorKind};
use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: console statements executed. Labels: command, status.
pub const STATEMENTS_TOTAL: &str = "timetable_statements_total";

/// Counter: schedule entry adds. Labels: outcome (ok, validation, conflict, storage).
pub const ADD_TOTAL: &str = "timetable_add_total";

/// Counter: rejected adds by the dimension that collided. Labels: dimension.
pub const CONFLICTS_TOTAL: &str = "timetable_conflicts_total";

/// Histogram: add latency in seconds, lane wait included.
pub const ADD_DURATION_SECONDS: &str = "timetable_add_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: schedule entries currently stored.
pub const ENTRIES: &str = "timetable_entries";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "timetable_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "timetable_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Outcome label for `ADD_TOTAL`.
pub fn outcome_label(result: &Result<u64, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => error_label(e.kind()),
    }
}

pub fn error_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Storage => "storage",
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertTeacher { .. } => "insert_teacher",
        Command::InsertClass { .. } => "insert_class",
        Command::InsertSubject { .. } => "insert_subject",
        Command::InsertClassSubject { .. } => "insert_class_subject",
        Command::DeleteClassSubject { .. } => "delete_class_subject",
        Command::InsertEntry { .. } => "insert_entry",
        Command::SelectClassSchedule { .. } => "select_class_schedule",
        Command::SelectTeacherSchedule { .. } => "select_teacher_schedule",
        Command::SelectEntry { .. } => "select_entry",
        Command::SelectClassSubjects => "select_class_subjects",
    }
}
