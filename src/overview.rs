use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use crate::schedule::LessonPlan;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range start {start} is after end {end}")]
    Reversed { start: NaiveDate, end: NaiveDate },
    #[error("range covers {days} days; at most {max} are allowed", max = MAX_RANGE_DAYS)]
    TooLong { days: i64 },
}

/// Longest explicit range a grid or overview will expand, about half a year.
pub const MAX_RANGE_DAYS: i64 = 186;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpan {
    Week,
    Month,
}

impl RangeSpan {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Reversed { start, end });
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(RangeError::TooLong { days });
        }
        Ok(Self { start, end })
    }

    /// Monday through Sunday of the week containing `anchor`.
    pub fn week_of(anchor: NaiveDate) -> Self {
        let start = anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()));
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn month_of(anchor: NaiveDate) -> Self {
        let start = anchor - Duration::days(i64::from(anchor.day0()));
        let days = days_in_month(anchor.year(), anchor.month());
        Self {
            start,
            end: start + Duration::days(days - 1),
        }
    }

    pub fn spanning(span: RangeSpan, anchor: NaiveDate) -> Self {
        match span {
            RangeSpan::Week => Self::week_of(anchor),
            RangeSpan::Month => Self::month_of(anchor),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + Clone {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teacher {
    pub id: String,
    pub name: String,
}

/// One teacher-to-class link. Slices of these are read in assignment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAssignment {
    pub teacher_id: String,
    pub class_id: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverview {
    pub class_id: String,
    pub class_name: String,
    /// Distinct dates with at least one plan for this class, ascending.
    pub lesson_dates: BTreeSet<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherOverview {
    pub teacher_id: String,
    pub teacher_name: String,
    pub classes: Vec<ClassOverview>,
}

/// Joins teachers to their classes and each class to the dates that have
/// plans filed. `plans` is expected to be pre-filtered to the requested range.
///
/// Teachers keep the supplied order and are never dropped, even with no
/// classes. A class assigned twice to the same teacher is listed once, at its
/// first position.
pub fn build_overview(
    teachers: &[Teacher],
    assignments: &[ClassAssignment],
    plans: &[LessonPlan],
) -> Vec<TeacherOverview> {
    let mut dates_by_class: HashMap<&str, BTreeSet<NaiveDate>> = HashMap::new();
    for plan in plans {
        dates_by_class
            .entry(plan.class_id.as_str())
            .or_default()
            .insert(plan.date);
    }

    teachers
        .iter()
        .map(|teacher| {
            let mut seen = HashSet::new();
            let classes = assignments
                .iter()
                .filter(|a| a.teacher_id == teacher.id)
                .filter(|a| seen.insert(a.class_id.clone()))
                .map(|a| ClassOverview {
                    class_id: a.class_id.clone(),
                    class_name: a.class_name.clone(),
                    lesson_dates: dates_by_class
                        .get(a.class_id.as_str())
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect();
            TeacherOverview {
                teacher_id: teacher.id.clone(),
                teacher_name: teacher.name.clone(),
                classes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{parse_hhmm, parse_iso_date, PlanStatus};

    fn d(s: &str) -> NaiveDate {
        parse_iso_date(s).expect("date")
    }

    fn teacher(id: &str, name: &str) -> Teacher {
        Teacher {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn assign(teacher_id: &str, class_id: &str) -> ClassAssignment {
        ClassAssignment {
            teacher_id: teacher_id.to_string(),
            class_id: class_id.to_string(),
            class_name: format!("Class {}", class_id),
        }
    }

    fn plan(id: &str, class_id: &str, subject_id: &str, date: &str) -> LessonPlan {
        LessonPlan {
            id: id.to_string(),
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
            date: d(date),
            start_time: parse_hhmm("09:00").expect("time"),
            end_time: parse_hhmm("10:00").expect("time"),
            status: PlanStatus::Planned,
            topic: String::new(),
            objective: String::new(),
            materials: String::new(),
            homework: String::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn teacher_with_unplanned_class_lists_both() {
        let teachers = vec![teacher("t1", "Ada")];
        let assignments = vec![assign("t1", "c1"), assign("t1", "c2")];
        let plans = vec![
            plan("p1", "c1", "math", "2026-03-02"),
            plan("p2", "c1", "science", "2026-03-02"),
            plan("p3", "c1", "math", "2026-03-04"),
        ];
        let out = build_overview(&teachers, &assignments, &plans);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].classes.len(), 2);
        assert_eq!(out[0].classes[0].class_id, "c1");
        assert_eq!(
            out[0].classes[0].lesson_dates.iter().copied().collect::<Vec<_>>(),
            vec![d("2026-03-02"), d("2026-03-04")]
        );
        assert_eq!(out[0].classes[1].class_id, "c2");
        assert!(out[0].classes[1].lesson_dates.is_empty());
    }

    #[test]
    fn teachers_without_classes_are_kept_in_order() {
        let teachers = vec![teacher("t2", "Bea"), teacher("t1", "Ada")];
        let assignments = vec![assign("t1", "c1")];
        let out = build_overview(&teachers, &assignments, &[]);
        let ids: Vec<&str> = out.iter().map(|t| t.teacher_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
        assert!(out[0].classes.is_empty());
        assert_eq!(out[1].classes.len(), 1);
    }

    #[test]
    fn shared_class_appears_under_each_teacher() {
        let teachers = vec![teacher("t1", "Ada"), teacher("t2", "Bea")];
        let assignments = vec![assign("t1", "c1"), assign("t2", "c1"), assign("t1", "c1")];
        let plans = vec![plan("p1", "c1", "math", "2026-03-03")];
        let out = build_overview(&teachers, &assignments, &plans);
        assert_eq!(out[0].classes.len(), 1);
        assert_eq!(out[1].classes.len(), 1);
        assert_eq!(out[1].classes[0].lesson_dates.len(), 1);
    }

    #[test]
    fn class_order_follows_assignment_order() {
        let teachers = vec![teacher("t1", "Ada")];
        let assignments = vec![assign("t1", "c9"), assign("t1", "c1"), assign("t1", "c5")];
        let out = build_overview(&teachers, &assignments, &[]);
        let ids: Vec<&str> = out[0].classes.iter().map(|c| c.class_id.as_str()).collect();
        assert_eq!(ids, vec!["c9", "c1", "c5"]);
    }

    #[test]
    fn week_and_month_ranges() {
        // Wednesday 2026-03-04.
        let week = DateRange::week_of(d("2026-03-04"));
        assert_eq!(week.start(), d("2026-03-02"));
        assert_eq!(week.end(), d("2026-03-08"));
        assert_eq!(week.days().count(), 7);

        let feb = DateRange::month_of(d("2028-02-17"));
        assert_eq!(feb.start(), d("2028-02-01"));
        assert_eq!(feb.end(), d("2028-02-29"));

        let dec = DateRange::spanning(RangeSpan::Month, d("2026-12-31"));
        assert_eq!(dec.end(), d("2026-12-31"));
        assert_eq!(dec.days().count(), 31);
    }

    #[test]
    fn overlong_range_is_rejected() {
        let half_year = DateRange::new(d("2026-01-01"), d("2026-07-05")).expect("186 days");
        assert_eq!(half_year.days().count(), 186);
        assert_eq!(
            DateRange::new(d("2026-01-01"), d("2026-07-06")),
            Err(RangeError::TooLong { days: 187 })
        );
        assert!(matches!(
            DateRange::new(d("0001-01-01"), d("9999-12-31")),
            Err(RangeError::TooLong { .. })
        ));
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(DateRange::new(d("2026-03-05"), d("2026-03-04")).is_err());
        let single = DateRange::new(d("2026-03-05"), d("2026-03-05")).expect("range");
        assert_eq!(single.days().collect::<Vec<_>>(), vec![d("2026-03-05")]);
    }
}
