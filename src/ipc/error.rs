use crate::grades::GradeError;
use crate::lessons::LessonError;
use serde_json::json;
use tracing::warn;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// A failed handler step, rendered into an error response at the handler edge.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(entity: &str) -> Self {
        Self {
            code: "not_found",
            message: format!("{} not found", entity),
            details: Some(json!({ "entity": entity })),
        }
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        warn!("storage query failed: {}", e);
        Self::new("db_query_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<LessonError> for HandlerErr {
    fn from(e: LessonError) -> Self {
        match e {
            LessonError::NotFound(kind) => Self::not_found(kind.as_str()),
            LessonError::Schedule(v) => Self {
                code: v.code(),
                message: v.to_string(),
                details: Some(v.details()),
            },
            LessonError::Store(e) => Self::query(e),
        }
    }
}

impl From<GradeError> for HandlerErr {
    fn from(e: GradeError) -> Self {
        let message = e.to_string();
        match e {
            GradeError::NotFound(kind) => Self::not_found(kind.as_str()),
            GradeError::StudentNotInGroup => Self::new("student_not_in_group", message),
            GradeError::AlreadyGraded { grade_id } => Self {
                code: "already_graded",
                message,
                details: Some(json!({ "gradeId": grade_id })),
            },
            GradeError::ValueOutOfRange { min, max } => Self {
                code: "bad_params",
                message,
                details: Some(json!({ "min": min, "max": max })),
            },
            GradeError::CommentTooLong { max } => Self {
                code: "bad_params",
                message,
                details: Some(json!({ "maxChars": max })),
            },
            GradeError::Store(e) => Self::query(e),
        }
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        Self::query(e)
    }
}
