use chrono::NaiveTime;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::engine::ValidationError;
use crate::model::*;

/// Parsed command from a console statement.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertTeacher {
        id: TeacherId,
        first_name: String,
        last_name: String,
    },
    InsertClass {
        id: ClassId,
        name: String,
    },
    InsertSubject {
        id: SubjectId,
        name: String,
        teacher_id: Option<TeacherId>,
    },
    InsertClassSubject {
        class_id: ClassId,
        subject_id: SubjectId,
    },
    DeleteClassSubject {
        class_id: ClassId,
        subject_id: SubjectId,
    },
    InsertEntry {
        class_id: ClassId,
        subject_id: SubjectId,
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
        room: Option<String>,
    },
    SelectClassSchedule {
        class_id: ClassId,
    },
    SelectTeacherSchedule {
        teacher_id: TeacherId,
    },
    SelectEntry {
        id: EntryId,
    },
    SelectClassSubjects,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "teachers" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("teachers", 3, values.len()));
            }
            Ok(Command::InsertTeacher {
                id: parse_u32(&values[0])?,
                first_name: parse_string(&values[1])?,
                last_name: parse_string(&values[2])?,
            })
        }
        "classes" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("classes", 2, values.len()));
            }
            Ok(Command::InsertClass {
                id: parse_u32(&values[0])?,
                name: parse_string(&values[1])?,
            })
        }
        "subjects" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("subjects", 2, values.len()));
            }
            let teacher_id = if values.len() >= 3 {
                parse_u32_or_null(&values[2])?
            } else {
                None
            };
            Ok(Command::InsertSubject {
                id: parse_u32(&values[0])?,
                name: parse_string(&values[1])?,
                teacher_id,
            })
        }
        "class_subjects" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("class_subjects", 2, values.len()));
            }
            Ok(Command::InsertClassSubject {
                class_id: parse_u32(&values[0])?,
                subject_id: parse_u32(&values[1])?,
            })
        }
        "schedule" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("schedule", 5, values.len()));
            }
            let room = if values.len() >= 6 {
                parse_string_or_null(&values[5])?
            } else {
                None
            };
            Ok(Command::InsertEntry {
                class_id: parse_u32(&values[0])?,
                subject_id: parse_u32(&values[1])?,
                day: parse_day(&values[2])?,
                start: parse_time(&values[3])?,
                end: parse_time(&values[4])?,
                room,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "class_subjects" {
        return Err(SqlError::UnknownTable(table));
    }

    let mut filters = Vec::new();
    if let Some(selection) = &delete.selection {
        collect_eq_filters(selection, &mut filters);
    }
    Ok(Command::DeleteClassSubject {
        class_id: parse_u32(find_filter(&filters, "class_id")?)?,
        subject_id: parse_u32(find_filter(&filters, "subject_id")?)?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters);
    }

    match table.as_str() {
        "class_subjects" => Ok(Command::SelectClassSubjects),
        "schedule" => {
            if let Ok(expr) = find_filter(&filters, "id") {
                Ok(Command::SelectEntry {
                    id: parse_u64(expr)?,
                })
            } else if let Ok(expr) = find_filter(&filters, "class_id") {
                Ok(Command::SelectClassSchedule {
                    class_id: parse_u32(expr)?,
                })
            } else if let Ok(expr) = find_filter(&filters, "teacher_id") {
                Ok(Command::SelectTeacherSchedule {
                    teacher_id: parse_u32(expr)?,
                })
            } else {
                Err(SqlError::MissingFilter("class_id or teacher_id"))
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Collect `column = value` pairs joined by AND. Other predicates are ignored.
fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out);
            collect_eq_filters(right, out);
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if let Some(col) = expr_column_name(left) {
                out.push((col, &**right));
            }
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        _ => {}
    }
}

fn find_filter<'a>(filters: &[(String, &'a Expr)], column: &'static str) -> Result<&'a Expr, SqlError> {
    filters
        .iter()
        .find(|(col, _)| col == column)
        .map(|(_, expr)| *expr)
        .ok_or(SqlError::MissingFilter(column))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u64 range")))
}

fn parse_u32_or_null(expr: &Expr) -> Result<Option<u32>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_u32(expr).map(Some)
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

/// `0`–`6` with Sunday = 0, or a day name such as `'Monday'` / `'mon'`.
fn parse_day(expr: &Expr) -> Result<DayOfWeek, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr)
        && let Some(day) = DayOfWeek::parse_name(s)
    {
        return Ok(day);
    }
    let n = parse_i64(expr)?;
    u8::try_from(n)
        .ok()
        .and_then(DayOfWeek::from_index)
        .ok_or(SqlError::Invalid(ValidationError::InvalidDay(n)))
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_string(expr)?;
    NaiveTime::parse_from_str(&s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
        .map_err(|_| SqlError::Parse(format!("bad time of day: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    /// Well-formed statement carrying a value the engine would reject.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
