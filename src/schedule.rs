use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planned,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Some(Self::Planned),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One scheduled lesson for a class, subject and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub id: String,
    pub class_id: String,
    pub subject_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: PlanStatus,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub materials: String,
    #[serde(default)]
    pub homework: String,
    #[serde(default)]
    pub notes: String,
}

impl LessonPlan {
    /// The window this plan occupies, excluding itself so an edit does not
    /// collide with its own stored interval.
    pub fn window(&self) -> Result<SchedulingWindow, WindowError> {
        SchedulingWindow::new(
            self.class_id.clone(),
            self.date,
            self.start_time,
            self.end_time,
            Some(self.id.clone()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("start time {start} is after end time {end}")]
    NotChronological { start: String, end: String },
    #[error("window starting at {at} has zero length")]
    ZeroLength { at: String },
}

/// Candidate interval being validated before a plan is saved.
///
/// Construction enforces `start_time < end_time`; a window that exists is
/// always well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingWindow {
    class_id: String,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    exclude_id: Option<String>,
}

impl SchedulingWindow {
    pub fn new(
        class_id: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_id: Option<String>,
    ) -> Result<Self, WindowError> {
        if start_time == end_time {
            return Err(WindowError::ZeroLength {
                at: format_hhmm(start_time),
            });
        }
        if start_time > end_time {
            return Err(WindowError::NotChronological {
                start: format_hhmm(start_time),
                end: format_hhmm(end_time),
            });
        }
        Ok(Self {
            class_id: class_id.into(),
            date,
            start_time,
            end_time,
            exclude_id,
        })
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn exclude_id(&self) -> Option<&str> {
        self.exclude_id.as_deref()
    }

    fn overlaps(&self, plan: &LessonPlan) -> bool {
        // Half-open intervals: back-to-back lessons do not collide.
        self.start_time < plan.end_time && self.end_time > plan.start_time
    }
}

/// Returns the first plan in `existing` whose interval overlaps `candidate`
/// on the same class and date. Cancelled plans and the excluded id are skipped.
pub fn find_conflict<'a>(
    candidate: &SchedulingWindow,
    existing: &'a [LessonPlan],
) -> Option<&'a LessonPlan> {
    existing
        .iter()
        .filter(|p| p.class_id == candidate.class_id && p.date == candidate.date)
        .filter(|p| candidate.exclude_id() != Some(p.id.as_str()))
        .filter(|p| p.status != PlanStatus::Cancelled)
        .find(|p| candidate.overlaps(p))
}

pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

pub fn format_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Serde adapter for minute-precision `HH:MM` times.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hhmm(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid time (expected HH:MM): {raw}")))
    }
}
