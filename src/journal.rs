//! Read-side views over grades: the student x lesson journal for one
//! group/subject and per-student performance summaries. Everything here is
//! rebuilt per request and never written back.

use crate::model::{Grade, GradeEntry, Group, Lesson, Student, Subject};
use crate::store::{GradeStore, LessonStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// Two-level index `student id -> lesson id -> grade`.
#[derive(Debug, Clone, Default)]
pub struct GradeLedger {
    by_student: HashMap<String, HashMap<String, Grade>>,
}

impl GradeLedger {
    pub fn index<I>(grades: I) -> Self
    where
        I: IntoIterator<Item = Grade>,
    {
        let mut by_student: HashMap<String, HashMap<String, Grade>> = HashMap::new();
        for g in grades {
            by_student
                .entry(g.student_id.clone())
                .or_default()
                .insert(g.lesson_id.clone(), g);
        }
        Self { by_student }
    }

    /// `None` is the ordinary case for an ungraded cell.
    pub fn lookup(&self, student_id: &str, lesson_id: &str) -> Option<&Grade> {
        self.by_student.get(student_id)?.get(lesson_id)
    }

    pub fn len(&self) -> usize {
        self.by_student.values().map(HashMap::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct JournalMatrix {
    pub group: Group,
    pub subject: Subject,
    pub lessons: Vec<Lesson>,
    pub students: Vec<Student>,
    pub ledger: GradeLedger,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRow<'a> {
    pub student_id: &'a str,
    pub cells: Vec<Option<&'a Grade>>,
}

impl JournalMatrix {
    pub fn grade_for(&self, student_id: &str, lesson_id: &str) -> Option<&Grade> {
        self.ledger.lookup(student_id, lesson_id)
    }

    /// One row per student, cells aligned with `lessons`.
    pub fn rows(&self) -> Vec<JournalRow<'_>> {
        self.students
            .iter()
            .map(|s| JournalRow {
                student_id: &s.id,
                cells: self
                    .lessons
                    .iter()
                    .map(|l| self.grade_for(&s.id, &l.id))
                    .collect(),
            })
            .collect()
    }
}

/// The date-bounded lesson query is used only when both ends are given.
pub fn build_journal<S>(
    store: &S,
    group: Group,
    subject: Subject,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    students: Vec<Student>,
) -> anyhow::Result<JournalMatrix>
where
    S: LessonStore + GradeStore,
{
    let range = match (from, to) {
        (Some(f), Some(t)) => Some((f, t)),
        _ => None,
    };
    let lessons = store.lessons_for_group_subject(&group.id, &subject.id, range)?;
    let grades = store.grades_for_group_subject(&group.id, &subject.id)?;
    Ok(JournalMatrix {
        ledger: GradeLedger::index(grades),
        group,
        subject,
        lessons,
        students,
    })
}

#[derive(Debug, Clone)]
pub struct SubjectStats {
    pub subject: Subject,
    pub count: u64,
    pub sum: i64,
}

impl SubjectStats {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentPerformance {
    pub grades: Vec<GradeEntry>,
    pub subjects: Vec<SubjectStats>,
    pub overall_average: Option<f64>,
}

impl StudentPerformance {
    /// Sorts by lesson date then start time (stable), then folds per subject in
    /// first-seen order.
    pub fn from_entries(mut grades: Vec<GradeEntry>) -> Self {
        grades.sort_by_key(|e| (e.lesson.date, e.lesson.start_time));

        let mut subjects: Vec<SubjectStats> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();
        let mut total_sum: i64 = 0;
        let mut total_count: u64 = 0;

        for e in &grades {
            let idx = *slot.entry(e.subject.id.clone()).or_insert_with(|| {
                subjects.push(SubjectStats {
                    subject: e.subject.clone(),
                    count: 0,
                    sum: 0,
                });
                subjects.len() - 1
            });
            subjects[idx].count += 1;
            subjects[idx].sum += e.grade.value;
            total_count += 1;
            total_sum += e.grade.value;
        }

        let overall_average = if total_count == 0 {
            None
        } else {
            Some(total_sum as f64 / total_count as f64)
        };

        Self {
            grades,
            subjects,
            overall_average,
        }
    }
}

pub fn summarize_student<S: GradeStore>(
    store: &S,
    student_id: &str,
) -> anyhow::Result<StudentPerformance> {
    Ok(StudentPerformance::from_entries(
        store.grades_for_student(student_id)?,
    ))
}
