use crate::grades::{create_grade, update_grade, GradeDraft};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup::load_grade_rules;
use crate::ipc::helpers::{db_conn, required_i64, required_str, respond, with_write_tx};
use crate::ipc::types::{AppState, Request};
use crate::store::{GradeStore, SqliteStore};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

fn parse_draft(params: &Value) -> Result<GradeDraft, HandlerErr> {
    let comment = match params.get("comment") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| HandlerErr::bad_params("comment must be string or null"))?
                .to_string(),
        ),
    };
    Ok(GradeDraft {
        value: required_i64(params, "value")?,
        comment,
    })
}

fn grades_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let lesson_id = required_str(params, "lessonId")?;
    let draft = parse_draft(params)?;
    let rules = load_grade_rules(conn)?;
    let grade = with_write_tx(conn, |tx| {
        Ok(create_grade(
            &SqliteStore::new(tx),
            &rules,
            &student_id,
            &lesson_id,
            draft,
        )?)
    })?;
    Ok(json!({ "gradeId": grade.id, "grade": grade }))
}

fn grades_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let grade_id = required_str(params, "gradeId")?;
    let draft = parse_draft(params)?;
    let rules = load_grade_rules(conn)?;
    let grade = update_grade(&SqliteStore::new(conn), &rules, &grade_id, draft)?;
    Ok(json!({ "grade": grade }))
}

fn grades_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let grade_id = required_str(params, "gradeId")?;
    let grade = SqliteStore::new(conn)
        .find_grade(&grade_id)?
        .ok_or_else(|| HandlerErr::not_found("grade"))?;
    Ok(json!({ "grade": grade }))
}

fn grades_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let grade_id = required_str(params, "gradeId")?;
    if !SqliteStore::new(conn).delete_grade(&grade_id)? {
        return Err(HandlerErr::not_found("grade"));
    }
    info!(grade_id = %grade_id, "grade deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "grades.create" => db_conn(state).and_then(|c| grades_create(c, p)),
        "grades.update" => db_conn(state).and_then(|c| grades_update(c, p)),
        "grades.open" => db_conn(state).and_then(|c| grades_open(c, p)),
        "grades.delete" => db_conn(state).and_then(|c| grades_delete(c, p)),
        _ => return None,
    };
    Some(respond(req, result))
}
