use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Serialize, Serializer};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Accepts `HH:MM`, or `HH:MM:SS` when the seconds are `00`. Lessons are
/// stored at minute precision, so anything finer is refused here.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .ok()
        .filter(|v| v.second() == 0)
}

/// Drops seconds and sub-second parts.
pub fn whole_minutes(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(t)
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn format_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn ser_date<S: Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_date(*d))
}

fn ser_time<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_time(*t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Subject,
    Group,
    Teacher,
    Room,
    Student,
    Lesson,
    Grade,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Group => "group",
            Self::Teacher => "teacher",
            Self::Room => "room",
            Self::Student => "student",
            Self::Lesson => "lesson",
            Self::Grade => "grade",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub code: String,
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub group_id: Option<String>,
    pub full_name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    #[serde(serialize_with = "ser_date")]
    pub date: NaiveDate,
    #[serde(serialize_with = "ser_time")]
    pub start_time: NaiveTime,
    #[serde(serialize_with = "ser_time")]
    pub end_time: NaiveTime,
    pub subject_id: String,
    pub group_id: String,
    pub teacher_id: String,
    pub room_id: String,
    #[serde(rename = "type")]
    pub lesson_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub lesson_id: String,
    pub value: i64,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A grade together with the lesson it was given on and that lesson's subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub grade: Grade,
    pub lesson: Lesson,
    pub subject: Subject,
}
