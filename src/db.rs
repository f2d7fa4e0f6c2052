use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;

use crate::overview::{ClassAssignment, DateRange, Teacher};
use crate::schedule::{format_hhmm, parse_hhmm, parse_iso_date, LessonPlan, PlanStatus};

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("plannerd.sqlite3");
    let conn = Connection::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            school_id TEXT NOT NULL DEFAULT 'default'
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, subject_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_classes(
            teacher_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(teacher_id, class_id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_plans(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            lesson_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            status TEXT NOT NULL,
            topic TEXT NOT NULL DEFAULT '',
            objective TEXT NOT NULL DEFAULT '',
            materials TEXT NOT NULL DEFAULT '',
            homework TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_plans_class_date ON lesson_plans(class_id, lesson_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_plans_date ON lesson_plans(lesson_date)",
        [],
    )?;

    tracing::debug!(path = %db_path.display(), "workspace database ready");
    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings value for {key}"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> anyhow::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

const PLAN_COLUMNS: &str = "id, class_id, subject_id, lesson_date, start_time, end_time, status, topic, objective, materials, homework, notes";

fn conversion_err(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("invalid {}: {:?}", what, raw).into(),
    )
}

fn row_to_plan(r: &rusqlite::Row<'_>) -> rusqlite::Result<LessonPlan> {
    let date_raw: String = r.get(3)?;
    let start_raw: String = r.get(4)?;
    let end_raw: String = r.get(5)?;
    let status_raw: String = r.get(6)?;
    Ok(LessonPlan {
        id: r.get(0)?,
        class_id: r.get(1)?,
        subject_id: r.get(2)?,
        date: parse_iso_date(&date_raw).ok_or_else(|| conversion_err(3, "date", &date_raw))?,
        start_time: parse_hhmm(&start_raw).ok_or_else(|| conversion_err(4, "time", &start_raw))?,
        end_time: parse_hhmm(&end_raw).ok_or_else(|| conversion_err(5, "time", &end_raw))?,
        status: PlanStatus::parse(&status_raw)
            .ok_or_else(|| conversion_err(6, "status", &status_raw))?,
        topic: r.get(7)?,
        objective: r.get(8)?,
        materials: r.get(9)?,
        homework: r.get(10)?,
        notes: r.get(11)?,
    })
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Plans in `range`, ordered by date then start time. `class_id = None` reads
/// every class.
pub fn list_lesson_plans(
    conn: &Connection,
    class_id: Option<&str>,
    range: &DateRange,
) -> anyhow::Result<Vec<LessonPlan>> {
    let sql = format!(
        "SELECT {PLAN_COLUMNS}
         FROM lesson_plans
         WHERE (?1 IS NULL OR class_id = ?1) AND lesson_date BETWEEN ?2 AND ?3
         ORDER BY lesson_date, start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let plans = stmt
        .query_map(
            params![class_id, iso(range.start()), iso(range.end())],
            row_to_plan,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(plans)
}

/// Every plan for one class on one date, the candidate pool for a conflict check.
pub fn plans_on_date(conn: &Connection, class_id: &str, date: NaiveDate) -> anyhow::Result<Vec<LessonPlan>> {
    let range = DateRange::new(date, date)?;
    list_lesson_plans(conn, Some(class_id), &range)
}

pub fn get_lesson_plan(conn: &Connection, plan_id: &str) -> anyhow::Result<Option<LessonPlan>> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM lesson_plans WHERE id = ?");
    Ok(conn.query_row(&sql, [plan_id], row_to_plan).optional()?)
}

pub fn insert_lesson_plan(conn: &Connection, plan: &LessonPlan, ts: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO lesson_plans(
            id, class_id, subject_id, lesson_date, start_time, end_time, status,
            topic, objective, materials, homework, notes, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            plan.id,
            plan.class_id,
            plan.subject_id,
            iso(plan.date),
            format_hhmm(plan.start_time),
            format_hhmm(plan.end_time),
            plan.status.as_str(),
            plan.topic,
            plan.objective,
            plan.materials,
            plan.homework,
            plan.notes,
            ts,
            ts
        ],
    )?;
    Ok(())
}

pub fn update_lesson_plan(conn: &Connection, plan: &LessonPlan, ts: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE lesson_plans SET
            class_id = ?, subject_id = ?, lesson_date = ?, start_time = ?, end_time = ?, status = ?,
            topic = ?, objective = ?, materials = ?, homework = ?, notes = ?, updated_at = ?
         WHERE id = ?",
        params![
            plan.class_id,
            plan.subject_id,
            iso(plan.date),
            format_hhmm(plan.start_time),
            format_hhmm(plan.end_time),
            plan.status.as_str(),
            plan.topic,
            plan.objective,
            plan.materials,
            plan.homework,
            plan.notes,
            ts,
            plan.id
        ],
    )?;
    Ok(())
}

pub fn delete_lesson_plan(conn: &Connection, plan_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM lesson_plans WHERE id = ?", [plan_id])?;
    Ok(n > 0)
}

/// Teachers sorted by name, which is the order overviews are presented in.
pub fn list_teachers(conn: &Connection) -> anyhow::Result<Vec<Teacher>> {
    let mut stmt = conn.prepare("SELECT id, name FROM teachers ORDER BY name, id")?;
    let teachers = stmt
        .query_map([], |r| {
            Ok(Teacher {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(teachers)
}

pub fn list_class_assignments(conn: &Connection) -> anyhow::Result<Vec<ClassAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT tc.teacher_id, tc.class_id, c.name
         FROM teacher_classes tc
         JOIN classes c ON c.id = tc.class_id
         ORDER BY tc.teacher_id, tc.sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassAssignment {
                teacher_id: r.get(0)?,
                class_id: r.get(1)?,
                class_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Subject ids taught in a class, in the order they were assigned.
pub fn class_subject_ids(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id FROM class_subjects WHERE class_id = ? ORDER BY sort_order, subject_id",
    )?;
    let ids = stmt
        .query_map([class_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn class_school_id(conn: &Connection, class_id: &str) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT school_id FROM classes WHERE id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Appends a link row with the next sort order. Re-linking an existing pair
/// keeps its original position.
pub fn append_link(
    conn: &Connection,
    table: &str,
    owner_col: &str,
    owner_id: &str,
    member_col: &str,
    member_id: &str,
) -> anyhow::Result<()> {
    let next: i64 = conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {} WHERE {} = ?",
            table, owner_col
        ),
        [owner_id],
        |r| r.get(0),
    )?;
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {}({}, {}, sort_order) VALUES(?, ?, ?)",
            table, owner_col, member_col
        ),
        params![owner_id, member_id, next],
    )?;
    Ok(())
}
