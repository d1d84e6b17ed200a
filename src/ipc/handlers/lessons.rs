use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup::load_schedule_config;
use crate::ipc::helpers::{
    db_conn, input_object, opt_str, required_date, required_str, required_time, respond,
    with_write_tx,
};
use crate::ipc::types::{AppState, Request};
use crate::lessons::{create_lesson, update_lesson, LessonDraft, LessonRefs};
use crate::store::{LessonStore, SqliteStore};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

const TYPE_MAX_CHARS: usize = 64;
const NOTES_MAX_CHARS: usize = 1000;

fn bounded(input: &Value, key: &str, max: usize) -> Result<Option<String>, HandlerErr> {
    let v = opt_str(input, key)?;
    if v.as_ref().is_some_and(|s| s.chars().count() > max) {
        return Err(HandlerErr::bad_params(format!(
            "input.{} length must be <= {}",
            key, max
        )));
    }
    Ok(v)
}

fn parse_lesson_input(params: &Value) -> Result<(LessonDraft, LessonRefs), HandlerErr> {
    let input = input_object(params)?;
    let draft = LessonDraft {
        date: required_date(input, "date")?,
        start_time: required_time(input, "startTime")?,
        end_time: required_time(input, "endTime")?,
        lesson_type: bounded(input, "type", TYPE_MAX_CHARS)?,
        notes: bounded(input, "notes", NOTES_MAX_CHARS)?,
    };
    let refs = LessonRefs {
        subject_id: required_str(input, "subjectId")?,
        group_id: required_str(input, "groupId")?,
        teacher_id: required_str(input, "teacherId")?,
        room_id: required_str(input, "roomId")?,
    };
    Ok((draft, refs))
}

fn lessons_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let (draft, refs) = parse_lesson_input(params)?;
    let lesson = with_write_tx(conn, |tx| {
        let cfg = load_schedule_config(tx)?;
        Ok(create_lesson(&SqliteStore::new(tx), &cfg, draft, refs)?)
    })?;
    Ok(json!({ "lessonId": lesson.id, "lesson": lesson }))
}

fn lessons_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let lesson_id = required_str(params, "lessonId")?;
    let (draft, refs) = parse_lesson_input(params)?;
    let lesson = with_write_tx(conn, |tx| {
        let cfg = load_schedule_config(tx)?;
        Ok(update_lesson(&SqliteStore::new(tx), &cfg, &lesson_id, draft, refs)?)
    })?;
    Ok(json!({ "lesson": lesson }))
}

fn lessons_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let lesson_id = required_str(params, "lessonId")?;
    let lesson = SqliteStore::new(conn)
        .find_lesson(&lesson_id)?
        .ok_or_else(|| HandlerErr::not_found("lesson"))?;
    Ok(json!({ "lesson": lesson }))
}

fn lessons_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let lesson_id = required_str(params, "lessonId")?;
    if !SqliteStore::new(conn).delete_lesson(&lesson_id)? {
        return Err(HandlerErr::not_found("lesson"));
    }
    info!(lesson_id = %lesson_id, "lesson deleted");
    Ok(json!({ "ok": true }))
}

fn lessons_list_by_date(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = required_date(params, "date")?;
    let lessons = SqliteStore::new(conn).lessons_on(date)?;
    Ok(json!({ "lessons": lessons }))
}

fn lessons_list_range(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let from = required_date(params, "fromDate")?;
    let to = required_date(params, "toDate")?;
    if from > to {
        return Err(HandlerErr::bad_params("fromDate must not be after toDate"));
    }
    let lessons = SqliteStore::new(conn).lessons_between(from, to)?;
    Ok(json!({ "lessons": lessons }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "lessons.create" => db_conn(state).and_then(|c| lessons_create(c, p)),
        "lessons.update" => db_conn(state).and_then(|c| lessons_update(c, p)),
        "lessons.open" => db_conn(state).and_then(|c| lessons_open(c, p)),
        "lessons.delete" => db_conn(state).and_then(|c| lessons_delete(c, p)),
        "lessons.listByDate" => db_conn(state).and_then(|c| lessons_list_by_date(c, p)),
        "lessons.listRange" => db_conn(state).and_then(|c| lessons_list_range(c, p)),
        _ => return None,
    };
    Some(respond(req, result))
}
