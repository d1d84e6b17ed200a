use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, opt_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{Group, Room, Student, Subject, Teacher};
use crate::store::{CatalogStore, SqliteStore, StudentStore};
use rusqlite::{ffi, params, Connection, ErrorCode};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Only UNIQUE failures are reported as duplicates; NOT NULL and foreign-key
/// failures stay generic insert errors.
fn insert_err(e: rusqlite::Error, what: &str) -> HandlerErr {
    if let rusqlite::Error::SqliteFailure(f, _) = &e {
        if f.code == ErrorCode::ConstraintViolation
            && f.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return HandlerErr::new("duplicate_code", format!("{} code already exists", what));
        }
    }
    HandlerErr::new("db_insert_failed", e.to_string())
}

fn list<T, F>(conn: &Connection, sql: &str, map: F) -> Result<Vec<T>, HandlerErr>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;
    stmt.query_map([], map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)
}

fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        code: required_str(params, "code")?,
        name: required_str(params, "name")?,
    };
    conn.execute(
        "INSERT INTO subjects(id, code, name) VALUES(?, ?, ?)",
        params![subject.id, subject.code, subject.name],
    )
    .map_err(|e| insert_err(e, "subject"))?;
    info!(subject_id = %subject.id, "subject created");
    Ok(json!({ "subjectId": subject.id, "subject": subject }))
}

fn subjects_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let rows = list(conn, "SELECT id, code, name FROM subjects ORDER BY code", |r| {
        Ok(Subject {
            id: r.get(0)?,
            code: r.get(1)?,
            name: r.get(2)?,
        })
    })?;
    Ok(json!({ "subjects": rows }))
}

fn groups_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let group = Group {
        id: Uuid::new_v4().to_string(),
        code: required_str(params, "code")?,
        name: required_str(params, "name")?,
    };
    conn.execute(
        "INSERT INTO study_groups(id, code, name) VALUES(?, ?, ?)",
        params![group.id, group.code, group.name],
    )
    .map_err(|e| insert_err(e, "group"))?;
    info!(group_id = %group.id, "group created");
    Ok(json!({ "groupId": group.id, "group": group }))
}

fn groups_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let rows = list(conn, "SELECT id, code, name FROM study_groups ORDER BY code", |r| {
        Ok(Group {
            id: r.get(0)?,
            code: r.get(1)?,
            name: r.get(2)?,
        })
    })?;
    Ok(json!({ "groups": rows }))
}

fn teachers_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teacher = Teacher {
        id: Uuid::new_v4().to_string(),
        full_name: required_str(params, "fullName")?,
    };
    conn.execute(
        "INSERT INTO teachers(id, full_name) VALUES(?, ?)",
        params![teacher.id, teacher.full_name],
    )
    .map_err(|e| insert_err(e, "teacher"))?;
    info!(teacher_id = %teacher.id, "teacher created");
    Ok(json!({ "teacherId": teacher.id, "teacher": teacher }))
}

fn teachers_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let rows = list(
        conn,
        "SELECT id, full_name FROM teachers ORDER BY full_name",
        |r| {
            Ok(Teacher {
                id: r.get(0)?,
                full_name: r.get(1)?,
            })
        },
    )?;
    Ok(json!({ "teachers": rows }))
}

fn rooms_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let capacity = match params.get("capacity") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .filter(|n| *n > 0)
                .ok_or_else(|| HandlerErr::bad_params("capacity must be a positive integer"))?,
        ),
    };
    let room = Room {
        id: Uuid::new_v4().to_string(),
        code: required_str(params, "code")?,
        capacity,
    };
    conn.execute(
        "INSERT INTO rooms(id, code, capacity) VALUES(?, ?, ?)",
        params![room.id, room.code, room.capacity],
    )
    .map_err(|e| insert_err(e, "room"))?;
    info!(room_id = %room.id, "room created");
    Ok(json!({ "roomId": room.id, "room": room }))
}

fn rooms_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let rows = list(conn, "SELECT id, code, capacity FROM rooms ORDER BY code", |r| {
        Ok(Room {
            id: r.get(0)?,
            code: r.get(1)?,
            capacity: r.get(2)?,
        })
    })?;
    Ok(json!({ "rooms": rows }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let full_name = required_str(params, "fullName")?;
    let group_id = opt_str(params, "groupId")?;
    if let Some(gid) = &group_id {
        if SqliteStore::new(conn).find_group(gid)?.is_none() {
            return Err(HandlerErr::not_found("group"));
        }
    }
    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE COALESCE(group_id, '') = COALESCE(?, '')",
            [&group_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    let student = Student {
        id: Uuid::new_v4().to_string(),
        group_id,
        full_name,
        sort_order,
    };
    conn.execute(
        "INSERT INTO students(id, group_id, full_name, sort_order) VALUES(?, ?, ?, ?)",
        params![student.id, student.group_id, student.full_name, student.sort_order],
    )
    .map_err(|e| insert_err(e, "student"))?;
    info!(student_id = %student.id, "student created");
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let rows = match opt_str(params, "groupId")? {
        Some(gid) => SqliteStore::new(conn).students_in_group(&gid)?,
        None => list(
            conn,
            "SELECT id, group_id, full_name, sort_order FROM students ORDER BY full_name",
            |r| {
                Ok(Student {
                    id: r.get(0)?,
                    group_id: r.get(1)?,
                    full_name: r.get(2)?,
                    sort_order: r.get(3)?,
                })
            },
        )?,
    };
    Ok(json!({ "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "subjects.create" => db_conn(state).and_then(|c| subjects_create(c, p)),
        "subjects.list" => db_conn(state).and_then(subjects_list),
        "groups.create" => db_conn(state).and_then(|c| groups_create(c, p)),
        "groups.list" => db_conn(state).and_then(groups_list),
        "teachers.create" => db_conn(state).and_then(|c| teachers_create(c, p)),
        "teachers.list" => db_conn(state).and_then(teachers_list),
        "rooms.create" => db_conn(state).and_then(|c| rooms_create(c, p)),
        "rooms.list" => db_conn(state).and_then(rooms_list),
        "students.create" => db_conn(state).and_then(|c| students_create(c, p)),
        "students.list" => db_conn(state).and_then(|c| students_list(c, p)),
        _ => return None,
    };
    Some(respond(req, result))
}
