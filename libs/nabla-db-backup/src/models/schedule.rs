use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    Week,
    Month,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Interval::Day),
            "week" | "weekly" => Ok(Interval::Week),
            "month" | "monthly" => Ok(Interval::Month),
            other => Err(format!("unknown interval '{other}', expected day, week or month")),
        }
    }
}

/// Recurring backup of one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    #[serde(alias = "_id")]
    pub id: String,
    pub db: String,
    pub interval: Interval,
    /// Day of week, Sunday = 0. Weekly schedules only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
    /// Hour of day, 0-23
    pub hour: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /backups/schedules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_weekly_day"))]
pub struct NewSchedule {
    #[validate(length(min = 1, message = "db must not be empty"))]
    pub db: String,
    pub interval: Interval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 6, message = "day must be between 0 (Sunday) and 6"))]
    pub day: Option<u8>,
    #[validate(range(max = 23, message = "hour must be between 0 and 23"))]
    pub hour: u8,
}

impl NewSchedule {
    pub fn daily(db: impl Into<String>, hour: u8) -> Self {
        Self {
            db: db.into(),
            interval: Interval::Day,
            day: None,
            hour,
        }
    }

    pub fn weekly(db: impl Into<String>, day: Weekday, hour: u8) -> Self {
        Self {
            db: db.into(),
            interval: Interval::Week,
            day: u8::try_from(day.num_days_from_sunday()).ok(),
            hour,
        }
    }

    pub fn monthly(db: impl Into<String>, hour: u8) -> Self {
        Self {
            db: db.into(),
            interval: Interval::Month,
            day: None,
            hour,
        }
    }
}

fn validate_weekly_day(schedule: &NewSchedule) -> Result<(), ValidationError> {
    if schedule.interval == Interval::Week && schedule.day.is_none() {
        let mut err = ValidationError::new("weekly_day");
        err.message = Some("weekly schedules need a day".into());
        return Err(err);
    }
    Ok(())
}

/// Body of `PATCH /backups/schedules/{id}`. Absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SchedulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 6, message = "day must be between 0 (Sunday) and 6"))]
    pub day: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 23, message = "hour must be between 0 and 23"))]
    pub hour: Option<u8>,
}

impl SchedulePatch {
    pub fn is_empty(&self) -> bool {
        self.interval.is_none() && self.day.is_none() && self.hour.is_none()
    }
}
