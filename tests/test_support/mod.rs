#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

/// Returns the `error` object of a response that must have failed.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

pub fn error_code(error: &Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

/// Ids of one group with its subject, teacher and room, ready for lessons.
pub struct Fixture {
    pub subject_id: String,
    pub group_id: String,
    pub teacher_id: String,
    pub room_id: String,
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}

pub fn seed_fixture(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    tag: &str,
) -> Fixture {
    let subject = request_ok(
        stdin,
        reader,
        "seed-subject",
        "subjects.create",
        json!({ "code": format!("SUB-{}", tag), "name": format!("Subject {}", tag) }),
    );
    let group = request_ok(
        stdin,
        reader,
        "seed-group",
        "groups.create",
        json!({ "code": format!("GRP-{}", tag), "name": format!("Group {}", tag) }),
    );
    let teacher = request_ok(
        stdin,
        reader,
        "seed-teacher",
        "teachers.create",
        json!({ "fullName": format!("Teacher {}", tag) }),
    );
    let room = request_ok(
        stdin,
        reader,
        "seed-room",
        "rooms.create",
        json!({ "code": format!("R-{}", tag), "capacity": 30 }),
    );
    Fixture {
        subject_id: str_field(&subject, "subjectId"),
        group_id: str_field(&group, "groupId"),
        teacher_id: str_field(&teacher, "teacherId"),
        room_id: str_field(&room, "roomId"),
    }
}

pub fn lesson_input(fx: &Fixture, date: &str, start: &str, end: &str) -> Value {
    json!({
        "date": date,
        "startTime": start,
        "endTime": end,
        "subjectId": fx.subject_id,
        "groupId": fx.group_id,
        "teacherId": fx.teacher_id,
        "roomId": fx.room_id,
    })
}
