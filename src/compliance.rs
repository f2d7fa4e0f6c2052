use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::overview::DateRange;
use crate::policy::{AlertLevel, CompliancePolicy};
use crate::schedule::LessonPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Done,
    Pending,
    Warning,
    Late,
}

/// Status of one calendar cell for a class/subject slot.
///
/// Order of checks: a filed plan always wins; non-workdays and disabled
/// alerts never escalate; otherwise a missing plan escalates once it is more
/// than `grace_period_days` days in the past relative to `today`.
pub fn evaluate(
    date: NaiveDate,
    has_plan: bool,
    policy: &CompliancePolicy,
    today: NaiveDate,
) -> ComplianceStatus {
    if has_plan {
        return ComplianceStatus::Done;
    }
    if !policy.is_workday(date) {
        return ComplianceStatus::Pending;
    }
    let escalated = match policy.alert_level {
        AlertLevel::Disabled => return ComplianceStatus::Pending,
        AlertLevel::Strict => ComplianceStatus::Late,
        AlertLevel::Moderate => ComplianceStatus::Warning,
    };
    let overdue_days = (today - date).num_days();
    if overdue_days > i64::from(policy.grace_period_days) {
        escalated
    } else {
        ComplianceStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCell {
    pub date: NaiveDate,
    pub class_id: String,
    pub subject_id: String,
    pub status: ComplianceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceSummary {
    pub done: usize,
    pub pending: usize,
    pub warning: usize,
    pub late: usize,
}

impl ComplianceSummary {
    pub fn add(&mut self, status: ComplianceStatus) {
        match status {
            ComplianceStatus::Done => self.done += 1,
            ComplianceStatus::Pending => self.pending += 1,
            ComplianceStatus::Warning => self.warning += 1,
            ComplianceStatus::Late => self.late += 1,
        }
    }

    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ComplianceStatus>,
    {
        let mut summary = Self::default();
        for s in statuses {
            summary.add(s);
        }
        summary
    }
}

/// Expands `slots` (class, subject) × every day of `range` into cells.
///
/// A slot counts as filed on a date when any plan for that class and subject
/// exists on it. Output is grouped by slot in the order given, then by date.
pub fn evaluate_grid(
    slots: &[(String, String)],
    range: &DateRange,
    plans: &[LessonPlan],
    policy: &CompliancePolicy,
    today: NaiveDate,
) -> Vec<ComplianceCell> {
    let filed: HashSet<(&str, &str, NaiveDate)> = plans
        .iter()
        .map(|p| (p.class_id.as_str(), p.subject_id.as_str(), p.date))
        .collect();

    let mut cells = Vec::new();
    for (class_id, subject_id) in slots {
        for date in range.days() {
            let has_plan = filed.contains(&(class_id.as_str(), subject_id.as_str(), date));
            cells.push(ComplianceCell {
                date,
                class_id: class_id.clone(),
                subject_id: subject_id.clone(),
                status: evaluate(date, has_plan, policy, today),
            });
        }
    }
    cells
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub status: ComplianceStatus,
}

/// Per-day status for a class given the dates anything was filed for it.
pub fn evaluate_days(
    lesson_dates: &BTreeSet<NaiveDate>,
    range: &DateRange,
    policy: &CompliancePolicy,
    today: NaiveDate,
) -> Vec<DayStatus> {
    range
        .days()
        .map(|date| DayStatus {
            date,
            status: evaluate(date, lesson_dates.contains(&date), policy, today),
        })
        .collect()
}
