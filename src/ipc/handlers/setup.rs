use crate::db;
use crate::grades::GradeRules;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{format_time, parse_time};
use crate::schedule::ScheduleConfig;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

#[derive(Clone, Copy)]
enum SetupSection {
    Schedule,
    Grades,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Self::Schedule),
            "grades" => Some(Self::Grades),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Schedule => "setup.schedule",
            Self::Grades => "setup.grades",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Schedule => {
            let cfg = ScheduleConfig::default();
            json!({
                "lessonDurationMinutes": cfg.lesson_minutes,
                "breakStart": format_time(cfg.break_start),
                "breakEnd": format_time(cfg.break_end),
            })
        }
        SetupSection::Grades => json!({
            "commentMaxChars": GradeRules::default().comment_max_chars,
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_clock(v: &Value, key: &str) -> Result<String, String> {
    v.as_str()
        .and_then(parse_time)
        .map(format_time)
        .ok_or_else(|| format!("{} must be HH:MM", key))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Schedule => match k.as_str() {
                "lessonDurationMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 15, 240)?));
                }
                "breakStart" | "breakEnd" => {
                    obj.insert(k.clone(), Value::String(parse_clock(v, k)?));
                }
                _ => return Err(format!("unknown schedule field: {}", k)),
            },
            SetupSection::Grades => match k.as_str() {
                "commentMaxChars" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 5000)?));
                }
                _ => return Err(format!("unknown grades field: {}", k)),
            },
        }
    }
    if let SetupSection::Schedule = section {
        let start = obj.get("breakStart").and_then(|v| v.as_str()).and_then(parse_time);
        let end = obj.get("breakEnd").and_then(|v| v.as_str()).and_then(parse_time);
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err("breakStart must be before breakEnd".into());
            }
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            let mut merged = current.clone();
            match merge_section_patch(section, &mut merged, saved_obj) {
                Ok(()) => current = merged,
                Err(msg) => warn!(key = section.key(), "ignoring stored setup: {}", msg),
            }
        }
    }
    Ok(current)
}

pub fn load_schedule_config(conn: &Connection) -> anyhow::Result<ScheduleConfig> {
    let obj = load_section(conn, SetupSection::Schedule)?;
    let defaults = ScheduleConfig::default();
    let clock = |key: &str| obj.get(key).and_then(|v| v.as_str()).and_then(parse_time);
    Ok(ScheduleConfig {
        lesson_minutes: obj
            .get("lessonDurationMinutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(defaults.lesson_minutes),
        break_start: clock("breakStart").unwrap_or(defaults.break_start),
        break_end: clock("breakEnd").unwrap_or(defaults.break_end),
    })
}

pub fn load_grade_rules(conn: &Connection) -> anyhow::Result<GradeRules> {
    let obj = load_section(conn, SetupSection::Grades)?;
    let defaults = GradeRules::default();
    Ok(GradeRules {
        comment_max_chars: obj
            .get("commentMaxChars")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(defaults.comment_max_chars),
        ..defaults
    })
}

fn setup_get(conn: &Connection) -> Result<Value, HandlerErr> {
    Ok(json!({
        "schedule": load_section(conn, SetupSection::Schedule)?,
        "grades": load_section(conn, SetupSection::Grades)?,
    }))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let section_raw = params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section = SetupSection::parse(section_raw)
        .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    info!(key = section.key(), "setup updated");
    Ok(json!({ "ok": true }))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    respond(req, db_conn(state).and_then(setup_get))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    respond(req, db_conn(state).and_then(|c| setup_update(c, &req.params)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
