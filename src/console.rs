use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_STATEMENT_LEN;
use crate::observability::{command_label, error_label, STATEMENTS_TOTAL};
use crate::sql::{parse_sql, Command, SqlError};

/// Parse and run one statement, returning the JSON response line.
pub async fn handle_line(engine: &Engine, line: &str) -> Value {
    if line.len() > MAX_STATEMENT_LEN {
        return syntax_error(&SqlError::Unsupported("statement too long".into()));
    }
    let cmd = match parse_sql(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::debug!(error = %e, "statement rejected");
            metrics::counter!(STATEMENTS_TOTAL, "command" => "unparsed", "status" => "syntax")
                .increment(1);
            return syntax_error(&e);
        }
    };

    let label = command_label(&cmd);
    let started = Instant::now();
    let response = execute(engine, cmd).await;
    let status = match &response {
        Ok(_) => "ok",
        Err(e) => error_label(e.kind()),
    };
    metrics::counter!(STATEMENTS_TOTAL, "command" => label, "status" => status).increment(1);
    tracing::debug!(command = label, status, elapsed_us = started.elapsed().as_micros() as u64, "statement done");

    response.unwrap_or_else(|e| engine_error(&e))
}

pub async fn execute(engine: &Engine, cmd: Command) -> Result<Value, EngineError> {
    match cmd {
        Command::InsertTeacher {
            id,
            first_name,
            last_name,
        } => {
            engine.add_teacher(id, first_name, last_name).await?;
            Ok(json!({ "ok": true, "id": id }))
        }
        Command::InsertClass { id, name } => {
            engine.add_class(id, name).await?;
            Ok(json!({ "ok": true, "id": id }))
        }
        Command::InsertSubject {
            id,
            name,
            teacher_id,
        } => {
            engine.add_subject(id, name, teacher_id).await?;
            Ok(json!({ "ok": true, "id": id }))
        }
        Command::InsertClassSubject {
            class_id,
            subject_id,
        } => {
            engine.link_class_subject(class_id, subject_id).await?;
            Ok(json!({ "ok": true }))
        }
        Command::DeleteClassSubject {
            class_id,
            subject_id,
        } => {
            let removed = engine.unlink_class_subject(class_id, subject_id).await?;
            Ok(json!({ "ok": true, "removed": removed }))
        }
        Command::InsertEntry {
            class_id,
            subject_id,
            day,
            start,
            end,
            room,
        } => {
            let id = engine
                .add_schedule_entry(class_id, subject_id, day, start, end, room)
                .await?;
            Ok(json!({ "ok": true, "id": id }))
        }
        Command::SelectClassSchedule { class_id } => {
            Ok(rows(&engine.schedule_for_class(class_id).await))
        }
        Command::SelectTeacherSchedule { teacher_id } => {
            Ok(rows(&engine.schedule_for_teacher(teacher_id).await))
        }
        Command::SelectEntry { id } => {
            let found: Vec<_> = engine.get_entry(id).await.into_iter().collect();
            Ok(rows(&found))
        }
        Command::SelectClassSubjects => Ok(rows(&engine.list_class_subjects().await)),
    }
}

fn rows<T: Serialize>(items: &[T]) -> Value {
    json!({ "ok": true, "rows": items })
}

fn engine_error(e: &EngineError) -> Value {
    json!({
        "ok": false,
        "status": e.status_code(),
        "kind": error_label(e.kind()),
        "error": e.to_string(),
    })
}

fn syntax_error(e: &SqlError) -> Value {
    let kind = match e {
        SqlError::Invalid(_) => "validation",
        _ => "syntax",
    };
    json!({ "ok": false, "status": 400, "kind": kind, "error": e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine(name: &str) -> Engine {
        let dir = std::env::temp_dir().join("timetable_test_console");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}.wal"));
        let _ = std::fs::remove_file(&path);
        Engine::new(path).unwrap()
    }

    async fn run(engine: &Engine, lines: &[&str]) -> Vec<Value> {
        let mut out = Vec::new();
        for line in lines {
            out.push(handle_line(engine, line).await);
        }
        out
    }

    #[tokio::test]
    async fn insert_and_select_round() {
        let engine = engine("insert_and_select").await;
        let out = run(
            &engine,
            &[
                "INSERT INTO teachers VALUES (1, 'John', 'Doe')",
                "INSERT INTO classes VALUES (1, 'Class A')",
                "INSERT INTO subjects VALUES (1, 'Math', 1)",
                "INSERT INTO class_subjects VALUES (1, 1)",
                "INSERT INTO schedule VALUES (1, 1, 1, '08:00', '09:00', '101')",
                "SELECT * FROM schedule WHERE class_id = 1",
            ],
        )
        .await;

        assert!(out.iter().all(|v| v["ok"] == true), "{out:?}");
        assert_eq!(out[4]["id"], 1);
        let row = &out[5]["rows"][0];
        assert_eq!(row["teacher_name"], "John Doe");
        assert_eq!(row["day"], "Monday");
        assert_eq!(row["start"], "08:00:00");
        assert_eq!(row["room"], "101");
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let engine = engine("conflict_409").await;
        let out = run(
            &engine,
            &[
                "INSERT INTO classes VALUES (1, 'Class A')",
                "INSERT INTO subjects VALUES (1, 'Math', NULL)",
                "INSERT INTO class_subjects VALUES (1, 1)",
                "INSERT INTO schedule VALUES (1, 1, 1, '08:00', '09:00')",
                "INSERT INTO schedule VALUES (1, 1, 1, '08:30', '09:30')",
            ],
        )
        .await;

        let last = &out[4];
        assert_eq!(last["ok"], false);
        assert_eq!(last["status"], 409);
        assert_eq!(last["kind"], "conflict");
        assert!(last["error"].as_str().unwrap().starts_with("scheduling conflict: class 1"));
    }

    #[tokio::test]
    async fn errors_are_400() {
        let engine = engine("errors_400").await;
        let out = run(
            &engine,
            &[
                "SELEC nonsense",
                "INSERT INTO schedule VALUES (1, 1, 9, '08:00', '09:00')",
                "INSERT INTO schedule VALUES (1, 1, 1, '09:00', '08:00')",
            ],
        )
        .await;

        assert_eq!(out[0]["kind"], "syntax");
        assert_eq!(out[1]["kind"], "validation");
        assert_eq!(out[2]["kind"], "validation");
        assert!(out.iter().all(|v| v["status"] == 400));
    }

    #[tokio::test]
    async fn overlong_statement_rejected() {
        let engine = engine("overlong").await;
        let line = format!("SELECT * FROM schedule WHERE class_id = {}", "1".repeat(MAX_STATEMENT_LEN));
        let out = handle_line(&engine, &line).await;
        assert_eq!(out["kind"], "syntax");
    }
}
