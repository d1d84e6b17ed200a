use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, opt_date, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::journal::{build_journal, summarize_student};
use crate::store::{CatalogStore, SqliteStore, StudentStore};
use rusqlite::Connection;
use serde_json::{json, Value};

fn journal_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let group_id = required_str(params, "groupId")?;
    let subject_id = required_str(params, "subjectId")?;
    let from = opt_date(params, "fromDate")?;
    let to = opt_date(params, "toDate")?;

    let store = SqliteStore::new(conn);
    let group = store
        .find_group(&group_id)?
        .ok_or_else(|| HandlerErr::not_found("group"))?;
    let subject = store
        .find_subject(&subject_id)?
        .ok_or_else(|| HandlerErr::not_found("subject"))?;
    let students = store.students_in_group(&group.id)?;

    let matrix = build_journal(&store, group, subject, from, to, students)?;
    Ok(json!({
        "group": matrix.group,
        "subject": matrix.subject,
        "fromDate": params.get("fromDate").cloned().unwrap_or(Value::Null),
        "toDate": params.get("toDate").cloned().unwrap_or(Value::Null),
        "lessons": matrix.lessons,
        "students": matrix.students,
        "rows": matrix.rows(),
        "gradeCount": matrix.ledger.len(),
    }))
}

fn student_performance(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let store = SqliteStore::new(conn);
    let student = store
        .find_student(&student_id)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    let perf = summarize_student(&store, &student.id)?;
    let subjects: Vec<Value> = perf
        .subjects
        .iter()
        .map(|s| {
            json!({
                "subject": s.subject,
                "count": s.count,
                "sum": s.sum,
                "average": s.average(),
            })
        })
        .collect();
    Ok(json!({
        "student": student,
        "grades": perf.grades,
        "subjects": subjects,
        "overallAverage": perf.overall_average,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "journal.open" => db_conn(state).and_then(|c| journal_open(c, p)),
        "students.performance" => db_conn(state).and_then(|c| student_performance(c, p)),
        _ => return None,
    };
    Some(respond(req, result))
}
