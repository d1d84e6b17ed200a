use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub count: u64,
    pub sum: i64,
}

impl Tally {
    pub fn push(&mut self, value: i64) {
        self.count += 1;
        self.sum += value;
    }

    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_groups: i64,
    pub total_subjects: i64,
    pub total_lessons: i64,
    pub overall_average_grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRow {
    pub group_id: String,
    pub code: String,
    pub name: String,
    pub student_count: i64,
    pub average_grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub subject_id: String,
    pub code: String,
    pub name: String,
    pub average_grade: Option<f64>,
}

fn count(conn: &Connection, table: &str) -> anyhow::Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

/// Folds `(key, value)` pairs into per-key tallies.
pub fn tally_by<I>(pairs: I) -> HashMap<String, Tally>
where
    I: IntoIterator<Item = (String, i64)>,
{
    let mut out: HashMap<String, Tally> = HashMap::new();
    for (k, v) in pairs {
        out.entry(k).or_default().push(v);
    }
    out
}

fn graded_pairs(conn: &Connection, key_col: &str) -> anyhow::Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT l.{}, g.value FROM grades g JOIN lessons l ON l.id = g.lesson_id",
        key_col
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn overview(conn: &Connection) -> anyhow::Result<OverviewStats> {
    let mut all = Tally::default();
    let mut stmt = conn.prepare("SELECT value FROM grades")?;
    for v in stmt.query_map([], |r| r.get::<_, i64>(0))? {
        all.push(v?);
    }
    Ok(OverviewStats {
        total_students: count(conn, "students")?,
        total_teachers: count(conn, "teachers")?,
        total_groups: count(conn, "study_groups")?,
        total_subjects: count(conn, "subjects")?,
        total_lessons: count(conn, "lessons")?,
        overall_average_grade: all.average(),
    })
}

/// Every group, graded or not, sorted by code ignoring case.
pub fn group_rows(conn: &Connection) -> anyhow::Result<Vec<GroupRow>> {
    let tallies = tally_by(graded_pairs(conn, "group_id")?);
    let mut stmt = conn.prepare(
        "SELECT g.id, g.code, g.name, (SELECT COUNT(*) FROM students s WHERE s.group_id = g.id)
         FROM study_groups g",
    )?;
    let mut rows = stmt
        .query_map([], |r| {
            Ok(GroupRow {
                group_id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                student_count: r.get(3)?,
                average_grade: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for row in &mut rows {
        row.average_grade = tallies.get(&row.group_id).and_then(Tally::average);
    }
    rows.sort_by_key(|r| r.code.to_lowercase());
    Ok(rows)
}

/// Only subjects that have at least one grade, sorted by code ignoring case.
pub fn subject_rows(conn: &Connection) -> anyhow::Result<Vec<SubjectRow>> {
    let tallies = tally_by(graded_pairs(conn, "subject_id")?);
    let mut stmt = conn.prepare("SELECT id, code, name FROM subjects")?;
    let mut rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter_map(|(id, code, name)| {
            let avg = tallies.get(&id)?.average();
            Some(SubjectRow {
                subject_id: id,
                code,
                name,
                average_grade: avg,
            })
        })
        .collect::<Vec<_>>();
    rows.sort_by_key(|r| r.code.to_lowercase());
    Ok(rows)
}
