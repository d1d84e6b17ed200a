use crate::model::{format_time, Lesson};
use chrono::{Duration, NaiveTime};
use serde_json::json;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_LESSON_MINUTES: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub lesson_minutes: i64,
    pub break_start: NaiveTime,
    pub break_end: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            lesson_minutes: DEFAULT_LESSON_MINUTES,
            break_start: NaiveTime::MIN + Duration::hours(13),
            break_end: NaiveTime::MIN + Duration::hours(14),
        }
    }
}

impl ScheduleConfig {
    pub fn break_window(&self) -> TimeWindow {
        TimeWindow {
            start: self.break_start,
            end: self.break_end,
        }
    }
}

/// Half-open overlap: `[a_start, a_end)` and `[b_start, b_end)` share at least one instant.
/// Windows that only touch (`a_end == b_start`) do not overlap.
pub fn overlaps(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn of(lesson: &Lesson) -> Self {
        Self {
            start: lesson.start_time,
            end: lesson.end_time,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_time(self.start), format_time(self.end))
    }
}

/// The existing lesson a candidate collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub lesson_id: String,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleViolation {
    #[error("lesson must last exactly {expected} minutes, got {actual}")]
    InvalidDuration { expected: i64, actual: i64 },
    #[error("lesson overlaps the break ({0})")]
    BreakWindowConflict(TimeWindow),
    #[error("teacher is already busy at this time ({})", .0.window)]
    TeacherConflict(Conflict),
    #[error("group already has a lesson at this time ({})", .0.window)]
    GroupConflict(Conflict),
    #[error("room is already occupied at this time ({})", .0.window)]
    RoomConflict(Conflict),
}

impl ScheduleViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDuration { .. } => "invalid_duration",
            Self::BreakWindowConflict(_) => "break_window_conflict",
            Self::TeacherConflict(_) => "teacher_conflict",
            Self::GroupConflict(_) => "group_conflict",
            Self::RoomConflict(_) => "room_conflict",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::InvalidDuration { expected, actual } => json!({
                "expectedMinutes": expected,
                "actualMinutes": actual,
            }),
            Self::BreakWindowConflict(w) => json!({
                "breakStart": format_time(w.start),
                "breakEnd": format_time(w.end),
            }),
            Self::TeacherConflict(c) | Self::GroupConflict(c) | Self::RoomConflict(c) => json!({
                "conflictLessonId": c.lesson_id,
                "conflictStart": format_time(c.window.start),
                "conflictEnd": format_time(c.window.end),
            }),
        }
    }
}

/// Decides whether `candidate` may be scheduled next to `same_day`.
///
/// Rules run in order and stop at the first failure: exact duration, break
/// window, then a linear scan of `same_day` in the order given. For each
/// overlapping lesson the resource axes are checked teacher, group, room.
/// `exclude_id` skips the candidate's own stored version on update.
pub fn validate(
    cfg: &ScheduleConfig,
    candidate: &Lesson,
    same_day: &[Lesson],
    exclude_id: Option<&str>,
) -> Result<(), ScheduleViolation> {
    let duration = candidate.end_time - candidate.start_time;
    if duration != Duration::minutes(cfg.lesson_minutes) {
        return Err(ScheduleViolation::InvalidDuration {
            expected: cfg.lesson_minutes,
            actual: duration.num_minutes(),
        });
    }

    if overlaps(
        candidate.start_time,
        candidate.end_time,
        cfg.break_start,
        cfg.break_end,
    ) {
        return Err(ScheduleViolation::BreakWindowConflict(cfg.break_window()));
    }

    for other in same_day {
        if exclude_id == Some(other.id.as_str()) {
            continue;
        }
        if !overlaps(
            candidate.start_time,
            candidate.end_time,
            other.start_time,
            other.end_time,
        ) {
            continue;
        }
        let conflict = || Conflict {
            lesson_id: other.id.clone(),
            window: TimeWindow::of(other),
        };
        if other.teacher_id == candidate.teacher_id {
            return Err(ScheduleViolation::TeacherConflict(conflict()));
        }
        if other.group_id == candidate.group_id {
            return Err(ScheduleViolation::GroupConflict(conflict()));
        }
        if other.room_id == candidate.room_id {
            return Err(ScheduleViolation::RoomConflict(conflict()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn lesson(
        id: &str,
        start: NaiveTime,
        end: NaiveTime,
        teacher: &str,
        group: &str,
        room: &str,
    ) -> Lesson {
        Lesson {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            start_time: start,
            end_time: end,
            subject_id: "math".to_string(),
            group_id: group.to_string(),
            teacher_id: teacher.to_string(),
            room_id: room.to_string(),
            lesson_type: None,
            notes: None,
        }
    }

    #[test]
    fn default_config_is_ninety_minutes_with_one_pm_break() {
        let cfg = ScheduleConfig::default();
        assert_eq!(cfg.lesson_minutes, 90);
        assert_eq!(cfg.break_start, t(13, 0));
        assert_eq!(cfg.break_end, t(14, 0));
        assert_eq!(cfg.break_window().to_string(), "13:00-14:00");
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps(t(9, 0), t(10, 30), t(10, 0), t(11, 30)));
        assert!(overlaps(t(10, 0), t(11, 30), t(9, 0), t(10, 30)));
        assert!(!overlaps(t(9, 0), t(10, 30), t(10, 30), t(12, 0)));
        assert!(!overlaps(t(10, 30), t(12, 0), t(9, 0), t(10, 30)));
        assert!(overlaps(t(9, 0), t(12, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn rejects_any_duration_other_than_configured() {
        let cfg = ScheduleConfig::default();
        for (start, end, actual) in [
            (t(9, 0), t(10, 29), 89),
            (t(9, 0), t(10, 31), 91),
            (t(9, 0), t(9, 0), 0),
            (t(10, 30), t(9, 0), -90),
        ] {
            let c = lesson("new", start, end, "T1", "G1", "R1");
            assert_eq!(
                validate(&cfg, &c, &[], None),
                Err(ScheduleViolation::InvalidDuration {
                    expected: 90,
                    actual
                })
            );
        }
        let ok = lesson("new", t(9, 0), t(10, 30), "T1", "G1", "R1");
        assert_eq!(validate(&cfg, &ok, &[], None), Ok(()));
    }

    #[test]
    fn duration_checked_before_break_and_conflicts() {
        let cfg = ScheduleConfig::default();
        let existing = vec![lesson("a", t(12, 0), t(13, 30), "T1", "G1", "R1")];
        let c = lesson("new", t(12, 30), t(13, 30), "T1", "G1", "R1");
        assert!(matches!(
            validate(&cfg, &c, &existing, None),
            Err(ScheduleViolation::InvalidDuration { .. })
        ));
    }

    #[test]
    fn break_window_rejected_even_without_other_lessons() {
        let cfg = ScheduleConfig::default();
        let d = lesson("d", t(12, 30), t(14, 0), "T1", "G1", "R1");
        let err = validate(&cfg, &d, &[], None).unwrap_err();
        assert_eq!(err, ScheduleViolation::BreakWindowConflict(cfg.break_window()));
        assert_eq!(err.code(), "break_window_conflict");

        let inside = lesson("i", t(13, 15), t(14, 45), "T1", "G1", "R1");
        assert!(validate(&cfg, &inside, &[], None).is_err());

        let before = lesson("b", t(11, 30), t(13, 0), "T1", "G1", "R1");
        let after = lesson("c", t(14, 0), t(15, 30), "T1", "G1", "R1");
        assert_eq!(validate(&cfg, &before, &[], None), Ok(()));
        assert_eq!(validate(&cfg, &after, &[], None), Ok(()));
    }

    #[test]
    fn teacher_overlap_reports_existing_window() {
        let cfg = ScheduleConfig::default();
        let a = lesson("a", t(9, 0), t(10, 30), "T1", "G1", "R1");
        let b = lesson("b", t(10, 0), t(11, 30), "T1", "G2", "R2");
        let err = validate(&cfg, &b, &[a.clone()], None).unwrap_err();
        assert_eq!(
            err,
            ScheduleViolation::TeacherConflict(Conflict {
                lesson_id: "a".into(),
                window: TimeWindow::of(&a),
            })
        );
        assert_eq!(err.to_string(), "teacher is already busy at this time (09:00-10:30)");
        assert_eq!(err.details()["conflictStart"], "09:00");
        assert_eq!(err.details()["conflictEnd"], "10:30");
    }

    #[test]
    fn conflict_is_symmetric() {
        let cfg = ScheduleConfig::default();
        let a = lesson("a", t(9, 0), t(10, 30), "T1", "G1", "R1");
        let b = lesson("b", t(10, 0), t(11, 30), "T1", "G2", "R2");
        assert!(matches!(
            validate(&cfg, &a, &[b.clone()], Some("a")),
            Err(ScheduleViolation::TeacherConflict(_))
        ));
        assert!(matches!(
            validate(&cfg, &b, &[a], Some("b")),
            Err(ScheduleViolation::TeacherConflict(_))
        ));
    }

    #[test]
    fn touching_lessons_never_conflict() {
        let cfg = ScheduleConfig::default();
        let a = lesson("a", t(9, 0), t(10, 30), "T1", "G1", "R1");
        let c = lesson("c", t(10, 30), t(12, 0), "T1", "G1", "R1");
        assert_eq!(validate(&cfg, &c, &[a.clone()], None), Ok(()));
        let before = lesson("e", t(7, 30), t(9, 0), "T1", "G1", "R1");
        assert_eq!(validate(&cfg, &before, &[a], None), Ok(()));
    }

    #[test]
    fn axes_checked_teacher_then_group_then_room() {
        let cfg = ScheduleConfig::default();
        let a = lesson("a", t(9, 0), t(10, 30), "T1", "G1", "R1");

        let all_same = lesson("x", t(9, 0), t(10, 30), "T1", "G1", "R1");
        assert!(matches!(
            validate(&cfg, &all_same, &[a.clone()], None),
            Err(ScheduleViolation::TeacherConflict(_))
        ));

        let group_and_room = lesson("x", t(9, 30), t(11, 0), "T2", "G1", "R1");
        assert!(matches!(
            validate(&cfg, &group_and_room, &[a.clone()], None),
            Err(ScheduleViolation::GroupConflict(_))
        ));

        let room_only = lesson("x", t(9, 30), t(11, 0), "T2", "G2", "R1");
        assert!(matches!(
            validate(&cfg, &room_only, &[a.clone()], None),
            Err(ScheduleViolation::RoomConflict(_))
        ));

        let disjoint = lesson("x", t(9, 0), t(10, 30), "T2", "G2", "R2");
        assert_eq!(validate(&cfg, &disjoint, &[a], None), Ok(()));
    }

    #[test]
    fn excluded_lesson_is_skipped() {
        let cfg = ScheduleConfig::default();
        let stored = lesson("a", t(9, 0), t(10, 30), "T1", "G1", "R1");
        let moved = lesson("a", t(9, 30), t(11, 0), "T1", "G1", "R1");
        assert_eq!(validate(&cfg, &moved, &[stored.clone()], Some("a")), Ok(()));
        assert!(validate(&cfg, &moved, &[stored], None).is_err());
    }

    #[test]
    fn first_conflicting_lesson_in_input_order_wins() {
        let cfg = ScheduleConfig::default();
        let room_clash = lesson("r", t(9, 0), t(10, 30), "T9", "G9", "R1");
        let teacher_clash = lesson("t", t(10, 0), t(11, 30), "T1", "G8", "R8");
        let c = lesson("c", t(9, 30), t(11, 0), "T1", "G1", "R1");
        let err = validate(&cfg, &c, &[room_clash, teacher_clash], None).unwrap_err();
        match err {
            ScheduleViolation::RoomConflict(conflict) => assert_eq!(conflict.lesson_id, "r"),
            other => panic!("unexpected violation: {other:?}"),
        }
    }

    #[test]
    fn custom_config_moves_break_and_duration() {
        let cfg = ScheduleConfig {
            lesson_minutes: 45,
            break_start: t(12, 0),
            break_end: t(12, 30),
        };
        let ok = lesson("a", t(13, 0), t(13, 45), "T1", "G1", "R1");
        assert_eq!(validate(&cfg, &ok, &[], None), Ok(()));
        let lunch = lesson("b", t(11, 30), t(12, 15), "T1", "G1", "R1");
        assert!(matches!(
            validate(&cfg, &lunch, &[], None),
            Err(ScheduleViolation::BreakWindowConflict(_))
        ));
    }
}
