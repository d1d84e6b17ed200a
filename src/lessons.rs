use crate::model::{whole_minutes, EntityKind, Lesson};
use crate::schedule::{validate, ScheduleConfig, ScheduleViolation};
use crate::store::{CatalogStore, LessonStore};
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Caller-supplied mutable fields of a lesson.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonDraft {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub lesson_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonRefs {
    pub subject_id: String,
    pub group_id: String,
    pub teacher_id: String,
    pub room_id: String,
}

#[derive(Debug, Error)]
pub enum LessonError {
    #[error("{0} not found")]
    NotFound(EntityKind),
    #[error(transparent)]
    Schedule(#[from] ScheduleViolation),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn resolve_refs<S: CatalogStore>(store: &S, refs: &LessonRefs) -> Result<(), LessonError> {
    if store.find_subject(&refs.subject_id)?.is_none() {
        return Err(LessonError::NotFound(EntityKind::Subject));
    }
    if store.find_group(&refs.group_id)?.is_none() {
        return Err(LessonError::NotFound(EntityKind::Group));
    }
    if store.find_teacher(&refs.teacher_id)?.is_none() {
        return Err(LessonError::NotFound(EntityKind::Teacher));
    }
    if store.find_room(&refs.room_id)?.is_none() {
        return Err(LessonError::NotFound(EntityKind::Room));
    }
    Ok(())
}

/// Clock values are cut to whole minutes here, so the validated candidate is
/// exactly the row that gets stored.
fn assemble(id: String, draft: LessonDraft, refs: LessonRefs) -> Lesson {
    Lesson {
        id,
        date: draft.date,
        start_time: whole_minutes(draft.start_time),
        end_time: whole_minutes(draft.end_time),
        subject_id: refs.subject_id,
        group_id: refs.group_id,
        teacher_id: refs.teacher_id,
        room_id: refs.room_id,
        lesson_type: draft.lesson_type,
        notes: draft.notes,
    }
}

fn check_and_save<S: LessonStore>(
    store: &S,
    cfg: &ScheduleConfig,
    candidate: &Lesson,
    exclude_id: Option<&str>,
) -> Result<(), LessonError> {
    let same_day = store.lessons_on(candidate.date)?;
    if let Err(violation) = validate(cfg, candidate, &same_day, exclude_id) {
        debug!(
            lesson_id = %candidate.id,
            date = %candidate.date,
            code = violation.code(),
            "lesson rejected: {}",
            violation
        );
        return Err(violation.into());
    }
    store.save_lesson(candidate)?;
    Ok(())
}

/// Validates and persists a new lesson.
///
/// The same-day read and the write are not atomic on their own; callers that
/// need them serialized must run this inside a write transaction.
pub fn create_lesson<S>(
    store: &S,
    cfg: &ScheduleConfig,
    draft: LessonDraft,
    refs: LessonRefs,
) -> Result<Lesson, LessonError>
where
    S: CatalogStore + LessonStore,
{
    resolve_refs(store, &refs)?;
    let candidate = assemble(Uuid::new_v4().to_string(), draft, refs);
    check_and_save(store, cfg, &candidate, None)?;
    info!(lesson_id = %candidate.id, date = %candidate.date, "lesson created");
    Ok(candidate)
}

/// Replaces every mutable field of lesson `id`. Nothing is written unless the
/// replacement passes validation against the other lessons of its (new) date.
pub fn update_lesson<S>(
    store: &S,
    cfg: &ScheduleConfig,
    id: &str,
    draft: LessonDraft,
    refs: LessonRefs,
) -> Result<Lesson, LessonError>
where
    S: CatalogStore + LessonStore,
{
    let existing = store
        .find_lesson(id)?
        .ok_or(LessonError::NotFound(EntityKind::Lesson))?;
    resolve_refs(store, &refs)?;
    let candidate = assemble(existing.id, draft, refs);
    check_and_save(store, cfg, &candidate, Some(id))?;
    info!(lesson_id = %candidate.id, date = %candidate.date, "lesson updated");
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SqliteStore;
    use rusqlite::Connection;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO subjects(id, code, name) VALUES('S1', 'PNT-101', 'Painting');
             INSERT INTO study_groups(id, code, name) VALUES('G1', 'A-1', 'Group A');
             INSERT INTO study_groups(id, code, name) VALUES('G2', 'B-1', 'Group B');
             INSERT INTO teachers(id, full_name) VALUES('T1', 'Anna Petrova');
             INSERT INTO teachers(id, full_name) VALUES('T2', 'Ivan Orlov');
             INSERT INTO rooms(id, code, capacity) VALUES('R1', '101', 12);
             INSERT INTO rooms(id, code, capacity) VALUES('R2', '102', NULL);",
        )
        .unwrap();
    }

    fn draft(start: NaiveTime, end: NaiveTime) -> LessonDraft {
        LessonDraft {
            date: day(),
            start_time: start,
            end_time: end,
            lesson_type: Some("practice".into()),
            notes: None,
        }
    }

    fn refs(group: &str, teacher: &str, room: &str) -> LessonRefs {
        LessonRefs {
            subject_id: "S1".into(),
            group_id: group.into(),
            teacher_id: teacher.into(),
            room_id: room.into(),
        }
    }

    #[test]
    fn create_rejects_unknown_references_in_order() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = ScheduleConfig::default();

        let mut bad = refs("G1", "T1", "R1");
        bad.subject_id = "nope".into();
        bad.room_id = "nope".into();
        let err = create_lesson(&store, &cfg, draft(t(9, 0), t(10, 30)), bad).unwrap_err();
        assert!(matches!(err, LessonError::NotFound(EntityKind::Subject)));

        let err = create_lesson(&store, &cfg, draft(t(9, 0), t(10, 30)), refs("G1", "T1", "R9"))
            .unwrap_err();
        assert!(matches!(err, LessonError::NotFound(EntityKind::Room)));
        assert!(store.lessons_on(day()).unwrap().is_empty());
    }

    #[test]
    fn create_persists_then_blocks_overlapping_teacher() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = ScheduleConfig::default();

        let a = create_lesson(&store, &cfg, draft(t(9, 0), t(10, 30)), refs("G1", "T1", "R1"))
            .unwrap();
        assert_eq!(store.find_lesson(&a.id).unwrap(), Some(a.clone()));

        let err = create_lesson(&store, &cfg, draft(t(10, 0), t(11, 30)), refs("G2", "T1", "R2"))
            .unwrap_err();
        assert!(matches!(
            err,
            LessonError::Schedule(ScheduleViolation::TeacherConflict(_))
        ));

        let c = create_lesson(&store, &cfg, draft(t(10, 30), t(12, 0)), refs("G2", "T1", "R2"));
        assert!(c.is_ok());
        assert_eq!(store.lessons_on(day()).unwrap().len(), 2);
    }

    #[test]
    fn update_excludes_itself_and_is_all_or_nothing() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = ScheduleConfig::default();

        let a = create_lesson(&store, &cfg, draft(t(9, 0), t(10, 30)), refs("G1", "T1", "R1"))
            .unwrap();
        let b = create_lesson(&store, &cfg, draft(t(11, 0), t(12, 30)), refs("G2", "T2", "R2"))
            .unwrap();

        // Shifting A by 30 minutes overlaps its own stored version only.
        let moved = update_lesson(
            &store,
            &cfg,
            &a.id,
            draft(t(9, 30), t(11, 0)),
            refs("G1", "T1", "R1"),
        )
        .unwrap();
        assert_eq!(moved.start_time, t(9, 30));

        // Moving A into B's room at B's time fails and leaves A untouched.
        let err = update_lesson(
            &store,
            &cfg,
            &a.id,
            draft(t(11, 0), t(12, 30)),
            refs("G1", "T1", "R2"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LessonError::Schedule(ScheduleViolation::RoomConflict(ref c)) if c.lesson_id == b.id
        ));
        let stored = store.find_lesson(&a.id).unwrap().unwrap();
        assert_eq!(stored.start_time, t(9, 30));
        assert_eq!(stored.room_id, "R1");
    }

    #[test]
    fn update_unknown_lesson_is_not_found() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let err = update_lesson(
            &store,
            &ScheduleConfig::default(),
            "missing",
            draft(t(9, 0), t(10, 30)),
            refs("G1", "T1", "R1"),
        )
        .unwrap_err();
        assert!(matches!(err, LessonError::NotFound(EntityKind::Lesson)));
    }

    #[test]
    fn update_can_move_to_another_date() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = ScheduleConfig::default();
        let a = create_lesson(&store, &cfg, draft(t(9, 0), t(10, 30)), refs("G1", "T1", "R1"))
            .unwrap();
        let mut next = draft(t(9, 0), t(10, 30));
        next.date = NaiveDate::from_ymd_opt(2024, 9, 3).unwrap();
        update_lesson(&store, &cfg, &a.id, next, refs("G1", "T1", "R1")).unwrap();
        assert!(store.lessons_on(day()).unwrap().is_empty());
        let moved_to = NaiveDate::from_ymd_opt(2024, 9, 3).unwrap();
        assert_eq!(store.lessons_on(moved_to).unwrap().len(), 1);
    }

    #[test]
    fn seconds_are_dropped_before_validation() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        let store = SqliteStore::new(&conn);
        let cfg = ScheduleConfig::default();
        create_lesson(&store, &cfg, draft(t(10, 30), t(12, 0)), refs("G1", "T1", "R1")).unwrap();

        // 09:00:30-10:30:30 is stored as 09:00-10:30, which only touches the lesson above.
        let start = NaiveTime::from_hms_opt(9, 0, 30).unwrap();
        let end = NaiveTime::from_hms_opt(10, 30, 30).unwrap();
        let created =
            create_lesson(&store, &cfg, draft(start, end), refs("G2", "T1", "R2")).unwrap();
        assert_eq!(created.start_time, t(9, 0));
        assert_eq!(created.end_time, t(10, 30));
        let stored = store.find_lesson(&created.id).unwrap().unwrap();
        assert_eq!(stored, created);
    }
}
