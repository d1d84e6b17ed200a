//! Persistence seams consumed by the scheduling and journal services, and
//! their SQLite implementation over a borrowed workspace connection.

use crate::model::{
    format_date, format_time, parse_date, parse_time, Grade, GradeEntry, Group, Lesson, Room,
    Student, Subject, Teacher,
};
use anyhow::anyhow;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub trait CatalogStore {
    fn find_subject(&self, id: &str) -> anyhow::Result<Option<Subject>>;
    fn find_group(&self, id: &str) -> anyhow::Result<Option<Group>>;
    fn find_teacher(&self, id: &str) -> anyhow::Result<Option<Teacher>>;
    fn find_room(&self, id: &str) -> anyhow::Result<Option<Room>>;
}

pub trait LessonStore {
    fn find_lesson(&self, id: &str) -> anyhow::Result<Option<Lesson>>;
    fn lessons_on(&self, date: NaiveDate) -> anyhow::Result<Vec<Lesson>>;
    fn lessons_between(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<Vec<Lesson>>;
    /// Ordered by date, then start time. `range` bounds both ends inclusively.
    fn lessons_for_group_subject(
        &self,
        group_id: &str,
        subject_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> anyhow::Result<Vec<Lesson>>;
    /// Inserts or fully replaces the row with `lesson.id`.
    fn save_lesson(&self, lesson: &Lesson) -> anyhow::Result<()>;
    fn delete_lesson(&self, id: &str) -> anyhow::Result<bool>;
}

pub trait GradeStore {
    fn find_grade(&self, id: &str) -> anyhow::Result<Option<Grade>>;
    fn grades_for_group_subject(
        &self,
        group_id: &str,
        subject_id: &str,
    ) -> anyhow::Result<Vec<Grade>>;
    fn grades_for_student(&self, student_id: &str) -> anyhow::Result<Vec<GradeEntry>>;
    fn grade_for_student_lesson(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> anyhow::Result<Option<Grade>>;
    fn save_grade(&self, grade: &Grade) -> anyhow::Result<()>;
    fn delete_grade(&self, id: &str) -> anyhow::Result<bool>;
}

pub trait StudentStore {
    fn find_student(&self, id: &str) -> anyhow::Result<Option<Student>>;
    /// Membership order: `sort_order`, then name.
    fn students_in_group(&self, group_id: &str) -> anyhow::Result<Vec<Student>>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const LESSON_COLS: &str =
    "id, date, start_time, end_time, subject_id, group_id, teacher_id, room_id, type, notes";

const GRADE_COLS: &str = "id, student_id, lesson_id, value, comment, created_at, updated_at";

fn bad_column(col: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        anyhow!("unparseable clock value {:?}", raw).into(),
    )
}

fn lesson_from_row(r: &Row<'_>) -> rusqlite::Result<Lesson> {
    let date_raw: String = r.get(1)?;
    let start_raw: String = r.get(2)?;
    let end_raw: String = r.get(3)?;
    Ok(Lesson {
        id: r.get(0)?,
        date: parse_date(&date_raw).ok_or_else(|| bad_column(1, &date_raw))?,
        start_time: parse_time(&start_raw).ok_or_else(|| bad_column(2, &start_raw))?,
        end_time: parse_time(&end_raw).ok_or_else(|| bad_column(3, &end_raw))?,
        subject_id: r.get(4)?,
        group_id: r.get(5)?,
        teacher_id: r.get(6)?,
        room_id: r.get(7)?,
        lesson_type: r.get(8)?,
        notes: r.get(9)?,
    })
}

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: r.get(0)?,
        student_id: r.get(1)?,
        lesson_id: r.get(2)?,
        value: r.get(3)?,
        comment: r.get(4)?,
        created_at: r.get(5)?,
        updated_at: r.get(6)?,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        group_id: r.get(1)?,
        full_name: r.get(2)?,
        sort_order: r.get(3)?,
    })
}

impl CatalogStore for SqliteStore<'_> {
    fn find_subject(&self, id: &str) -> anyhow::Result<Option<Subject>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, name FROM subjects WHERE id = ?",
                [id],
                |r| {
                    Ok(Subject {
                        id: r.get(0)?,
                        code: r.get(1)?,
                        name: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_group(&self, id: &str) -> anyhow::Result<Option<Group>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, name FROM study_groups WHERE id = ?",
                [id],
                |r| {
                    Ok(Group {
                        id: r.get(0)?,
                        code: r.get(1)?,
                        name: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_teacher(&self, id: &str) -> anyhow::Result<Option<Teacher>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, full_name FROM teachers WHERE id = ?",
                [id],
                |r| {
                    Ok(Teacher {
                        id: r.get(0)?,
                        full_name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_room(&self, id: &str) -> anyhow::Result<Option<Room>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, capacity FROM rooms WHERE id = ?",
                [id],
                |r| {
                    Ok(Room {
                        id: r.get(0)?,
                        code: r.get(1)?,
                        capacity: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}

impl LessonStore for SqliteStore<'_> {
    fn find_lesson(&self, id: &str) -> anyhow::Result<Option<Lesson>> {
        let sql = format!("SELECT {} FROM lessons WHERE id = ?", LESSON_COLS);
        Ok(self.conn.query_row(&sql, [id], lesson_from_row).optional()?)
    }

    fn lessons_on(&self, date: NaiveDate) -> anyhow::Result<Vec<Lesson>> {
        let sql = format!(
            "SELECT {} FROM lessons WHERE date = ? ORDER BY start_time, rowid",
            LESSON_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([format_date(date)], lesson_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lessons_between(&self, from: NaiveDate, to: NaiveDate) -> anyhow::Result<Vec<Lesson>> {
        let sql = format!(
            "SELECT {} FROM lessons WHERE date BETWEEN ? AND ? ORDER BY date, start_time, rowid",
            LESSON_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![format_date(from), format_date(to)], lesson_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lessons_for_group_subject(
        &self,
        group_id: &str,
        subject_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> anyhow::Result<Vec<Lesson>> {
        let rows = match range {
            Some((from, to)) => {
                let sql = format!(
                    "SELECT {} FROM lessons
                     WHERE group_id = ? AND subject_id = ? AND date BETWEEN ? AND ?
                     ORDER BY date, start_time, rowid",
                    LESSON_COLS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        params![group_id, subject_id, format_date(from), format_date(to)],
                        lesson_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM lessons
                     WHERE group_id = ? AND subject_id = ?
                     ORDER BY date, start_time, rowid",
                    LESSON_COLS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![group_id, subject_id], lesson_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn save_lesson(&self, lesson: &Lesson) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO lessons(id, date, start_time, end_time, subject_id, group_id, teacher_id, room_id, type, notes)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               date = excluded.date,
               start_time = excluded.start_time,
               end_time = excluded.end_time,
               subject_id = excluded.subject_id,
               group_id = excluded.group_id,
               teacher_id = excluded.teacher_id,
               room_id = excluded.room_id,
               type = excluded.type,
               notes = excluded.notes",
            params![
                lesson.id,
                format_date(lesson.date),
                format_time(lesson.start_time),
                format_time(lesson.end_time),
                lesson.subject_id,
                lesson.group_id,
                lesson.teacher_id,
                lesson.room_id,
                lesson.lesson_type,
                lesson.notes,
            ],
        )?;
        Ok(())
    }

    fn delete_lesson(&self, id: &str) -> anyhow::Result<bool> {
        let n = self.conn.execute("DELETE FROM lessons WHERE id = ?", [id])?;
        Ok(n > 0)
    }
}

impl GradeStore for SqliteStore<'_> {
    fn find_grade(&self, id: &str) -> anyhow::Result<Option<Grade>> {
        let sql = format!("SELECT {} FROM grades WHERE id = ?", GRADE_COLS);
        Ok(self.conn.query_row(&sql, [id], grade_from_row).optional()?)
    }

    fn grades_for_group_subject(
        &self,
        group_id: &str,
        subject_id: &str,
    ) -> anyhow::Result<Vec<Grade>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.student_id, g.lesson_id, g.value, g.comment, g.created_at, g.updated_at
             FROM grades g
             JOIN lessons l ON l.id = g.lesson_id
             WHERE l.group_id = ? AND l.subject_id = ?",
        )?;
        let rows = stmt
            .query_map(params![group_id, subject_id], grade_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn grades_for_student(&self, student_id: &str) -> anyhow::Result<Vec<GradeEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.student_id, g.lesson_id, g.value, g.comment, g.created_at, g.updated_at,
                    l.id, l.date, l.start_time, l.end_time, l.subject_id, l.group_id, l.teacher_id, l.room_id, l.type, l.notes,
                    s.id, s.code, s.name
             FROM grades g
             JOIN lessons l ON l.id = g.lesson_id
             JOIN subjects s ON s.id = l.subject_id
             WHERE g.student_id = ?
             ORDER BY g.rowid",
        )?;
        let rows = stmt
            .query_map([student_id], |r| {
                let grade = grade_from_row(r)?;
                let date_raw: String = r.get(8)?;
                let start_raw: String = r.get(9)?;
                let end_raw: String = r.get(10)?;
                let lesson = Lesson {
                    id: r.get(7)?,
                    date: parse_date(&date_raw).ok_or_else(|| bad_column(8, &date_raw))?,
                    start_time: parse_time(&start_raw).ok_or_else(|| bad_column(9, &start_raw))?,
                    end_time: parse_time(&end_raw).ok_or_else(|| bad_column(10, &end_raw))?,
                    subject_id: r.get(11)?,
                    group_id: r.get(12)?,
                    teacher_id: r.get(13)?,
                    room_id: r.get(14)?,
                    lesson_type: r.get(15)?,
                    notes: r.get(16)?,
                };
                let subject = Subject {
                    id: r.get(17)?,
                    code: r.get(18)?,
                    name: r.get(19)?,
                };
                Ok(GradeEntry {
                    grade,
                    lesson,
                    subject,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn grade_for_student_lesson(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> anyhow::Result<Option<Grade>> {
        let sql = format!(
            "SELECT {} FROM grades WHERE student_id = ? AND lesson_id = ?",
            GRADE_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, params![student_id, lesson_id], grade_from_row)
            .optional()?)
    }

    fn save_grade(&self, grade: &Grade) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO grades(id, student_id, lesson_id, value, comment, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               value = excluded.value,
               comment = excluded.comment,
               updated_at = excluded.updated_at",
            params![
                grade.id,
                grade.student_id,
                grade.lesson_id,
                grade.value,
                grade.comment,
                grade.created_at,
                grade.updated_at,
            ],
        )?;
        Ok(())
    }

    fn delete_grade(&self, id: &str) -> anyhow::Result<bool> {
        let n = self.conn.execute("DELETE FROM grades WHERE id = ?", [id])?;
        Ok(n > 0)
    }
}

impl StudentStore for SqliteStore<'_> {
    fn find_student(&self, id: &str) -> anyhow::Result<Option<Student>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, group_id, full_name, sort_order FROM students WHERE id = ?",
                [id],
                student_from_row,
            )
            .optional()?)
    }

    fn students_in_group(&self, group_id: &str) -> anyhow::Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, group_id, full_name, sort_order
             FROM students
             WHERE group_id = ?
             ORDER BY sort_order, full_name",
        )?;
        let rows = stmt
            .query_map([group_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
