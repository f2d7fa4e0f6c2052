//! School-scoped planning policy.
//!
//! A `CompliancePolicy` is only ever built through validation, so the status
//! engine can index `workdays` without re-checking its shape. Anything read
//! from the store or the wire goes through `RawPolicy` first.

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schedule::{hhmm, parse_hhmm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Strict,
    Moderate,
    Disabled,
}

impl AlertLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "moderate" => Some(Self::Moderate),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("workdays must have exactly 7 entries (Monday..Sunday), got {0}")]
    WorkdaysLength(usize),
    #[error("deadlineDay must be in 0..=6 (0 = Sunday), got {0}")]
    DeadlineDay(i64),
    #[error("deadlineTime must be HH:MM, got {0:?}")]
    DeadlineTime(String),
    #[error("alertLevel must be one of: strict, moderate, disabled; got {0:?}")]
    AlertLevel(String),
    #[error("gracePeriodDays must be >= 0, got {0}")]
    GracePeriod(i64),
    #[error("gracePeriodDays must be at most {max}, got {0}", max = u32::MAX)]
    GracePeriodTooLarge(i64),
    #[error("unknown policy field: {0}")]
    UnknownField(String),
    #[error("malformed policy: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePolicy {
    /// Monday first.
    pub workdays: [bool; 7],
    /// 0 = Sunday .. 6 = Saturday. Kept for other consumers; the status
    /// engine does not read it.
    pub deadline_day: u8,
    #[serde(serialize_with = "hhmm::serialize")]
    pub deadline_time: NaiveTime,
    pub alert_level: AlertLevel,
    pub grace_period_days: u32,
}

const FIELDS: [&str; 5] = [
    "workdays",
    "deadlineDay",
    "deadlineTime",
    "alertLevel",
    "gracePeriodDays",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPolicy {
    workdays: Vec<bool>,
    deadline_day: i64,
    deadline_time: String,
    alert_level: String,
    grace_period_days: i64,
}

impl TryFrom<RawPolicy> for CompliancePolicy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let workdays: [bool; 7] = raw
            .workdays
            .as_slice()
            .try_into()
            .map_err(|_| PolicyError::WorkdaysLength(raw.workdays.len()))?;
        let deadline_day = u8::try_from(raw.deadline_day)
            .ok()
            .filter(|d| *d <= 6)
            .ok_or(PolicyError::DeadlineDay(raw.deadline_day))?;
        let deadline_time = parse_hhmm(&raw.deadline_time)
            .ok_or_else(|| PolicyError::DeadlineTime(raw.deadline_time.clone()))?;
        let alert_level = AlertLevel::parse(&raw.alert_level)
            .ok_or_else(|| PolicyError::AlertLevel(raw.alert_level.clone()))?;
        let grace_period_days = match u32::try_from(raw.grace_period_days) {
            Ok(days) => days,
            Err(_) if raw.grace_period_days < 0 => {
                return Err(PolicyError::GracePeriod(raw.grace_period_days))
            }
            Err(_) => return Err(PolicyError::GracePeriodTooLarge(raw.grace_period_days)),
        };
        Ok(Self {
            workdays,
            deadline_day,
            deadline_time,
            alert_level,
            grace_period_days,
        })
    }
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            workdays: [true, true, true, true, true, false, false],
            deadline_day: 5,
            deadline_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            alert_level: AlertLevel::Moderate,
            grace_period_days: 0,
        }
    }
}

impl CompliancePolicy {
    pub fn from_json(value: &Value) -> Result<Self, PolicyError> {
        RawPolicy::deserialize(value)
            .map_err(|e| PolicyError::Malformed(e.to_string()))?
            .try_into()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn is_workday(&self, date: NaiveDate) -> bool {
        self.workdays[date.weekday().num_days_from_monday() as usize]
    }

    /// Applies a partial update and returns the merged, re-validated policy.
    /// `self` is left untouched when the patch is rejected.
    pub fn merge_patch(&self, patch: &Map<String, Value>) -> Result<Self, PolicyError> {
        Self::merge_json(&self.to_json(), patch)
    }

    /// Overlays `patch` on a raw stored record. The base need not be valid on
    /// its own, so a patch can repair a broken stored policy.
    pub fn merge_json(base: &Value, patch: &Map<String, Value>) -> Result<Self, PolicyError> {
        let mut merged = base.clone();
        let Some(obj) = merged.as_object_mut() else {
            return Err(PolicyError::Malformed("policy is not an object".to_string()));
        };
        for (k, v) in patch {
            if !FIELDS.contains(&k.as_str()) {
                return Err(PolicyError::UnknownField(k.clone()));
            }
            obj.insert(k.clone(), v.clone());
        }
        Self::from_json(&merged)
    }
}
