use crate::model::{EntityKind, Grade};
use crate::store::{GradeStore, LessonStore, StudentStore};
use chrono::Local;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeRules {
    pub min_value: i64,
    pub max_value: i64,
    pub comment_max_chars: usize,
}

impl Default for GradeRules {
    fn default() -> Self {
        Self {
            min_value: 1,
            max_value: 5,
            comment_max_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeDraft {
    pub value: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("{0} not found")]
    NotFound(EntityKind),
    #[error("student does not belong to the lesson's group")]
    StudentNotInGroup,
    #[error("student already has a grade for this lesson")]
    AlreadyGraded { grade_id: String },
    #[error("grade must be between {min} and {max}")]
    ValueOutOfRange { min: i64, max: i64 },
    #[error("comment must be at most {max} characters")]
    CommentTooLong { max: usize },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn now_stamp() -> String {
    Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Checks the value range and normalizes the comment (trimmed, blank becomes none).
fn checked(rules: &GradeRules, draft: GradeDraft) -> Result<GradeDraft, GradeError> {
    if !(rules.min_value..=rules.max_value).contains(&draft.value) {
        return Err(GradeError::ValueOutOfRange {
            min: rules.min_value,
            max: rules.max_value,
        });
    }
    let comment = draft
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(c) = &comment {
        if c.chars().count() > rules.comment_max_chars {
            return Err(GradeError::CommentTooLong {
                max: rules.comment_max_chars,
            });
        }
    }
    Ok(GradeDraft {
        value: draft.value,
        comment,
    })
}

pub fn create_grade<S>(
    store: &S,
    rules: &GradeRules,
    student_id: &str,
    lesson_id: &str,
    draft: GradeDraft,
) -> Result<Grade, GradeError>
where
    S: GradeStore + LessonStore + StudentStore,
{
    let student = store
        .find_student(student_id)?
        .ok_or(GradeError::NotFound(EntityKind::Student))?;
    let lesson = store
        .find_lesson(lesson_id)?
        .ok_or(GradeError::NotFound(EntityKind::Lesson))?;
    if student.group_id.as_deref() != Some(lesson.group_id.as_str()) {
        return Err(GradeError::StudentNotInGroup);
    }
    if let Some(existing) = store.grade_for_student_lesson(&student.id, &lesson.id)? {
        return Err(GradeError::AlreadyGraded {
            grade_id: existing.id,
        });
    }
    let draft = checked(rules, draft)?;
    let stamp = now_stamp();
    let grade = Grade {
        id: Uuid::new_v4().to_string(),
        student_id: student.id,
        lesson_id: lesson.id,
        value: draft.value,
        comment: draft.comment,
        created_at: stamp.clone(),
        updated_at: stamp,
    };
    store.save_grade(&grade)?;
    info!(grade_id = %grade.id, lesson_id = %grade.lesson_id, "grade recorded");
    Ok(grade)
}

/// Only value and comment are mutable; student and lesson stay fixed.
pub fn update_grade<S: GradeStore>(
    store: &S,
    rules: &GradeRules,
    id: &str,
    draft: GradeDraft,
) -> Result<Grade, GradeError> {
    let mut grade = store
        .find_grade(id)?
        .ok_or(GradeError::NotFound(EntityKind::Grade))?;
    let draft = checked(rules, draft)?;
    grade.value = draft.value;
    grade.comment = draft.comment;
    grade.updated_at = now_stamp();
    store.save_grade(&grade)?;
    info!(grade_id = %grade.id, "grade updated");
    Ok(grade)
}
