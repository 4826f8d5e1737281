use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Named shift template. Reference data, edited only by HR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkSchedule {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Day shift")]
    pub name: String,
    pub description: String,
    #[schema(example = "09:00:00", value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(example = "17:00:00", value_type = String, format = "time")]
    pub end_time: NaiveTime,
    #[schema(example = 60)]
    pub break_duration_minutes: u32,
    #[schema(example = 2)]
    pub max_break_sessions: u32,
    #[schema(example = 15)]
    pub late_grace_minutes: u32,
    #[schema(example = 15)]
    pub early_departure_grace_minutes: u32,
    /// Monday first.
    #[schema(value_type = Vec<bool>, example = json!([true, true, true, true, true, false, false]))]
    pub working_days: [bool; 7],
    pub is_active: bool,
}

impl WorkSchedule {
    /// Shift length minus the break budget, overnight shifts wrap past midnight.
    pub fn work_duration_hours(&self) -> f64 {
        let mut span = self.end_time - self.start_time;
        if self.end_time < self.start_time {
            span += Duration::days(1);
        }
        let worked = span - Duration::minutes(self.break_duration_minutes as i64);
        worked.num_seconds() as f64 / 3600.0
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days[date.weekday().num_days_from_monday() as usize]
    }
}

/// Binds one employee to a schedule for a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmployeeSchedule {
    pub id: u64,
    pub employee_id: u64,
    pub schedule_id: u64,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "time")]
    pub custom_start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = "time")]
    pub custom_end_time: Option<NaiveTime>,
    pub is_active: bool,
}

impl EmployeeSchedule {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.is_none_or(|end| date <= end)
    }

    /// True when both bindings are active and their date ranges intersect.
    /// Open-ended ranges extend forever.
    pub fn overlaps(&self, start: NaiveDate, end: Option<NaiveDate>) -> bool {
        if !self.is_active {
            return false;
        }
        let starts_before_other_ends = end.is_none_or(|e| self.start_date <= e);
        let other_starts_before_self_ends = self.end_date.is_none_or(|e| start <= e);
        starts_before_other_ends && other_starts_before_self_ends
    }
}

/// Company-wide fallback when an employee has no bound schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendancePolicy {
    pub id: u64,
    #[schema(example = "Standard")]
    pub name: String,
    pub description: String,
    #[schema(example = 8.0)]
    pub working_hours_per_day: f64,
    #[schema(example = 15)]
    pub late_threshold_minutes: u32,
    #[schema(example = 15)]
    pub early_departure_threshold_minutes: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Holiday {
    pub id: u64,
    #[schema(example = "New Year")]
    pub name: String,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub description: String,
    pub is_optional: bool,
}

/// The times an employee is actually held to on a given day: custom
/// override times if set, else the bound schedule, else the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSchedule {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub late_grace_minutes: u32,
    pub early_grace_minutes: u32,
    pub scheduled_hours: f64,
    pub working_days: [bool; 7],
}

impl EffectiveSchedule {
    pub fn from_binding(binding: &EmployeeSchedule, schedule: &WorkSchedule) -> Self {
        Self {
            start: binding.custom_start_time.unwrap_or(schedule.start_time),
            end: binding.custom_end_time.unwrap_or(schedule.end_time),
            late_grace_minutes: schedule.late_grace_minutes,
            early_grace_minutes: schedule.early_departure_grace_minutes,
            scheduled_hours: schedule.work_duration_hours(),
            working_days: schedule.working_days,
        }
    }

    pub fn from_policy(policy: &AttendancePolicy, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            late_grace_minutes: policy.late_threshold_minutes,
            early_grace_minutes: policy.early_departure_threshold_minutes,
            scheduled_hours: policy.working_hours_per_day,
            working_days: MONDAY_TO_FRIDAY,
        }
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days[date.weekday().num_days_from_monday() as usize]
    }

    fn shift_start(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start)
    }

    fn shift_end(&self, date: NaiveDate) -> NaiveDateTime {
        let end = date.and_time(self.end);
        if self.end < self.start {
            end + Duration::days(1)
        } else {
            end
        }
    }
}

pub const MONDAY_TO_FRIDAY: [bool; 7] = [true, true, true, true, true, false, false];

/// Lateness and early-departure flags for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Punctuality {
    pub is_late: bool,
    pub is_early_departure: bool,
}

/// Compares check-in/out against the effective shift bounds widened by the
/// grace minutes. Arriving exactly at the end of the grace window is on time.
pub fn punctuality(
    date: NaiveDate,
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
    schedule: &EffectiveSchedule,
) -> Punctuality {
    let late_after =
        schedule.shift_start(date) + Duration::minutes(schedule.late_grace_minutes as i64);
    let early_before =
        schedule.shift_end(date) - Duration::minutes(schedule.early_grace_minutes as i64);

    Punctuality {
        is_late: check_in.is_some_and(|t| t > late_after),
        is_early_departure: check_out.is_some_and(|t| t < early_before),
    }
}
