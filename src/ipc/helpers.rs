use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_date, parse_time};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::Value;

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank strings all read as `None`.
pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key)))?
                .trim()
                .to_string();
            Ok(if s.is_empty() { None } else { Some(s) })
        }
    }
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key)))
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = required_str(params, key)?;
    parse_date(&raw).ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn opt_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match opt_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn required_time(params: &Value, key: &str) -> Result<NaiveTime, HandlerErr> {
    let raw = required_str(params, key)?;
    parse_time(&raw).ok_or_else(|| HandlerErr::bad_params(format!("{} must be HH:MM", key)))
}

pub fn input_object<'a>(params: &'a Value) -> Result<&'a Value, HandlerErr> {
    params
        .get("input")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing input"))
}

/// Runs `f` inside `BEGIN IMMEDIATE`, committing only when it succeeds.
pub fn with_write_tx<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, HandlerErr>,
) -> Result<T, HandlerErr> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let out = f(&tx)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(out)
}
