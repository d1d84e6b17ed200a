use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, respond};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use rusqlite::Connection;
use serde_json::{json, Value};

fn reports_overview(conn: &Connection) -> Result<Value, HandlerErr> {
    Ok(json!({ "overview": reports::overview(conn)? }))
}

fn reports_groups(conn: &Connection) -> Result<Value, HandlerErr> {
    Ok(json!({ "groups": reports::group_rows(conn)? }))
}

fn reports_subjects(conn: &Connection) -> Result<Value, HandlerErr> {
    Ok(json!({ "subjects": reports::subject_rows(conn)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.overview" => db_conn(state).and_then(reports_overview),
        "reports.groups" => db_conn(state).and_then(reports_groups),
        "reports.subjects" => db_conn(state).and_then(reports_subjects),
        _ => return None,
    };
    Some(respond(req, result))
}
