use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::schedule::{EffectiveSchedule, punctuality};

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    ToSchema,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
    OnLeave,
    Holiday,
}

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakType {
    Lunch,
    Tea,
    Personal,
    Meeting,
    #[default]
    Other,
}

/// One break session. At most one interval per day may be open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakInterval {
    pub id: u64,
    pub break_type: BreakType,
    #[schema(value_type = String, format = "date-time")]
    pub start_time: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub end_time: Option<NaiveDateTime>,
    pub duration_seconds: Option<i64>,
    pub notes: String,
}

impl BreakInterval {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Attendance for one employee on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceDay {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-10-19", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<NaiveDateTime>,
    pub breaks: Vec<BreakInterval>,
    pub total_break_seconds: i64,
    pub break_sessions_count: u32,
    #[schema(example = 8.0)]
    pub scheduled_hours: f64,
    #[schema(example = 7.5)]
    pub actual_hours: f64,
    #[schema(example = 0.0)]
    pub overtime_hours: f64,
    pub status: AttendanceStatus,
    pub is_late: bool,
    pub is_early_departure: bool,
    pub check_in_location: String,
    pub check_out_location: String,
    pub notes: String,
}

/// HR soft correction. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AttendanceCorrection {
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<NaiveDateTime>,
    pub status: Option<AttendanceStatus>,
    pub scheduled_hours: Option<f64>,
    pub check_in_location: Option<String>,
    pub check_out_location: Option<String>,
    pub notes: Option<String>,
}

impl AttendanceDay {
    /// Fresh record as created on the first event of the day; ABSENT until
    /// a check-in lands.
    pub fn new(employee_id: u64, date: NaiveDate, scheduled_hours: f64) -> Self {
        Self::seeded(employee_id, date, AttendanceStatus::Absent, scheduled_hours)
    }

    pub fn seeded(
        employee_id: u64,
        date: NaiveDate,
        status: AttendanceStatus,
        scheduled_hours: f64,
    ) -> Self {
        Self {
            id: 0,
            employee_id,
            date,
            check_in: None,
            check_out: None,
            breaks: Vec::new(),
            total_break_seconds: 0,
            break_sessions_count: 0,
            scheduled_hours,
            actual_hours: 0.0,
            overtime_hours: 0.0,
            status,
            is_late: false,
            is_early_departure: false,
            check_in_location: String::new(),
            check_out_location: String::new(),
            notes: String::new(),
        }
    }

    pub fn is_checked_in(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }

    pub fn open_break(&self) -> Option<&BreakInterval> {
        self.breaks.iter().find(|b| b.is_open())
    }

    pub fn check_in(
        &mut self,
        at: NaiveDateTime,
        location: String,
        note: Option<&str>,
    ) -> Result<(), AppError> {
        if self.check_in.is_some() {
            return Err(AppError::AlreadyCheckedIn);
        }
        self.check_in = Some(at);
        self.check_in_location = location;
        self.append_note(note);
        Ok(())
    }

    pub fn check_out(
        &mut self,
        at: NaiveDateTime,
        location: String,
        note: Option<&str>,
    ) -> Result<(), AppError> {
        let checked_in = self.check_in.ok_or(AppError::NotCheckedIn)?;
        if self.check_out.is_some() {
            return Err(AppError::AlreadyCheckedOut);
        }
        if at < checked_in {
            return Err(AppError::validation("Check-out cannot be before check-in"));
        }
        self.check_out = Some(at);
        self.check_out_location = location;
        self.append_note(note);
        Ok(())
    }

    pub fn start_break(
        &mut self,
        at: NaiveDateTime,
        break_type: BreakType,
        note: Option<&str>,
    ) -> Result<(), AppError> {
        if !self.is_checked_in() {
            return Err(AppError::NotCheckedIn);
        }
        if self.open_break().is_some() {
            return Err(AppError::BreakAlreadyOpen);
        }
        self.breaks.push(BreakInterval {
            id: 0,
            break_type,
            start_time: at,
            end_time: None,
            duration_seconds: None,
            notes: note.unwrap_or_default().to_string(),
        });
        Ok(())
    }

    /// Closes the open interval and re-tallies the day's break totals. A
    /// break left open at check-out can still be closed afterwards.
    pub fn end_break(&mut self, at: NaiveDateTime) -> Result<(), AppError> {
        if self.check_in.is_none() {
            return Err(AppError::NotCheckedIn);
        }
        let open = self
            .breaks
            .iter_mut()
            .find(|b| b.is_open())
            .ok_or(AppError::NoOpenBreak)?;
        let at = at.max(open.start_time);
        open.end_time = Some(at);
        open.duration_seconds = Some((at - open.start_time).num_seconds());
        self.tally_breaks();
        Ok(())
    }

    pub fn apply_correction(&mut self, correction: AttendanceCorrection) -> Result<(), AppError> {
        if let Some(t) = correction.check_in {
            self.check_in = Some(t);
        }
        if let Some(t) = correction.check_out {
            self.check_out = Some(t);
        }
        match (self.check_in, self.check_out) {
            (None, Some(_)) => {
                return Err(AppError::validation("Check-out requires a check-in"));
            }
            (Some(i), Some(o)) if o < i => {
                return Err(AppError::validation("Check-out cannot be before check-in"));
            }
            _ => {}
        }
        if let Some(hours) = correction.scheduled_hours {
            if !(0.0..=24.0).contains(&hours) {
                return Err(AppError::validation("Scheduled hours must be between 0 and 24"));
            }
            self.scheduled_hours = hours;
        }
        if let Some(status) = correction.status {
            self.status = status;
        }
        if let Some(location) = correction.check_in_location {
            self.check_in_location = location;
        }
        if let Some(location) = correction.check_out_location {
            self.check_out_location = location;
        }
        if let Some(notes) = correction.notes {
            self.notes = notes;
        }
        Ok(())
    }

    fn tally_breaks(&mut self) {
        let closed: Vec<i64> = self
            .breaks
            .iter()
            .filter_map(|b| b.duration_seconds)
            .collect();
        self.total_break_seconds = closed.iter().sum();
        self.break_sessions_count = closed.len() as u32;
    }

    fn append_note(&mut self, note: Option<&str>) {
        let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
            return;
        };
        if self.notes.is_empty() {
            self.notes = note.to_string();
        } else {
            self.notes = format!("{}\n{}", self.notes, note);
        }
    }
}

/// Hours worked net of breaks, rounded to two decimals, and the overtime
/// beyond the scheduled hours. Both are zero until the day is closed.
pub fn compute_hours(
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
    total_break: Duration,
    scheduled_hours: f64,
) -> (f64, f64) {
    let (Some(check_in), Some(check_out)) = (check_in, check_out) else {
        return (0.0, 0.0);
    };
    let worked = (check_out - check_in) - total_break;
    let actual = round2(worked.num_seconds() as f64 / 3600.0);
    let overtime = round2((actual - scheduled_hours).max(0.0));
    (actual, overtime)
}

/// Open day → PRESENT; closed day under half the scheduled hours →
/// HALF_DAY; otherwise PRESENT. Without a check-in the stored status
/// stands, so LATE and ABSENT only come from seeding or HR edits.
pub fn derive_status(
    current: AttendanceStatus,
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
    actual_hours: f64,
    scheduled_hours: f64,
) -> AttendanceStatus {
    match (check_in, check_out) {
        (Some(_), None) => AttendanceStatus::Present,
        (Some(_), Some(_)) if actual_hours < scheduled_hours * 0.5 => AttendanceStatus::HalfDay,
        (Some(_), Some(_)) => AttendanceStatus::Present,
        (None, _) => current,
    }
}

/// Re-derives hours, status and punctuality flags from the stored inputs.
/// Every mutating operation ends with this.
pub fn recompute(day: &mut AttendanceDay, schedule: &EffectiveSchedule) {
    let (actual, overtime) = compute_hours(
        day.check_in,
        day.check_out,
        Duration::seconds(day.total_break_seconds),
        day.scheduled_hours,
    );
    day.actual_hours = actual;
    day.overtime_hours = overtime;
    day.status = derive_status(
        day.status,
        day.check_in,
        day.check_out,
        day.actual_hours,
        day.scheduled_hours,
    );

    let flags = punctuality(day.date, day.check_in, day.check_out, schedule);
    day.is_late = flags.is_late;
    day.is_early_departure = flags.is_early_departure;
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schedule::MONDAY_TO_FRIDAY;
    use chrono::NaiveTime;

    fn date() -> NaiveDate {
        "2026-10-19".parse().unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        date().and_hms_opt(h, m, 0).unwrap()
    }

    fn nine_to_five() -> EffectiveSchedule {
        EffectiveSchedule {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            late_grace_minutes: 15,
            early_grace_minutes: 15,
            scheduled_hours: 8.0,
            working_days: MONDAY_TO_FRIDAY,
        }
    }

    #[test]
    fn full_day_with_lunch_break() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), "office".into(), None).unwrap();
        day.start_break(at(12, 0), BreakType::Lunch, None).unwrap();
        day.end_break(at(12, 30)).unwrap();
        day.check_out(at(17, 0), "office".into(), None).unwrap();
        recompute(&mut day, &nine_to_five());

        assert_eq!(day.total_break_seconds, 1800);
        assert_eq!(day.break_sessions_count, 1);
        assert_eq!(day.actual_hours, 7.5);
        assert_eq!(day.overtime_hours, 0.0);
        assert_eq!(day.status, AttendanceStatus::Present);
        assert!(!day.is_late);
        assert!(!day.is_early_departure);
    }

    #[test]
    fn hours_are_zero_until_checked_out() {
        let (actual, overtime) = compute_hours(Some(at(9, 0)), None, Duration::zero(), 8.0);
        assert_eq!((actual, overtime), (0.0, 0.0));
    }

    #[test]
    fn overtime_is_never_negative() {
        let (actual, overtime) =
            compute_hours(Some(at(9, 0)), Some(at(19, 20)), Duration::minutes(20), 8.0);
        assert_eq!(actual, 10.0);
        assert_eq!(overtime, 2.0);

        let (_, overtime) = compute_hours(Some(at(9, 0)), Some(at(12, 0)), Duration::zero(), 8.0);
        assert_eq!(overtime, 0.0);
    }

    #[test]
    fn actual_hours_round_to_two_decimals() {
        let (actual, _) = compute_hours(Some(at(9, 0)), Some(at(9, 10)), Duration::zero(), 8.0);
        assert_eq!(actual, 0.17);
    }

    #[test]
    fn short_day_is_half_day() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), None).unwrap();
        day.check_out(at(12, 0), String::new(), None).unwrap();
        recompute(&mut day, &nine_to_five());
        assert_eq!(day.status, AttendanceStatus::HalfDay);
        assert!(day.is_early_departure);
    }

    #[test]
    fn open_day_is_present_even_when_late() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 20), String::new(), None).unwrap();
        recompute(&mut day, &nine_to_five());
        assert_eq!(day.status, AttendanceStatus::Present);
        assert!(day.is_late);
    }

    #[test]
    fn seeded_status_survives_without_check_in() {
        let mut day = AttendanceDay::seeded(1, date(), AttendanceStatus::OnLeave, 8.0);
        recompute(&mut day, &nine_to_five());
        assert_eq!(day.status, AttendanceStatus::OnLeave);
    }

    #[test]
    fn double_check_in_is_rejected() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), None).unwrap();
        let err = day.check_in(at(9, 1), String::new(), None).unwrap_err();
        assert!(matches!(err, AppError::AlreadyCheckedIn));
    }

    #[test]
    fn check_out_preconditions() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        assert!(matches!(
            day.check_out(at(17, 0), String::new(), None),
            Err(AppError::NotCheckedIn)
        ));
        day.check_in(at(9, 0), String::new(), None).unwrap();
        day.check_out(at(17, 0), String::new(), None).unwrap();
        assert!(matches!(
            day.check_out(at(17, 5), String::new(), None),
            Err(AppError::AlreadyCheckedOut)
        ));
    }

    #[test]
    fn check_out_appends_notes() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), Some("traffic")).unwrap();
        day.check_out(at(17, 0), String::new(), Some("left on time")).unwrap();
        assert_eq!(day.notes, "traffic\nleft on time");
    }

    #[test]
    fn end_break_without_open_break_fails_every_time() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), None).unwrap();
        for _ in 0..2 {
            assert!(matches!(day.end_break(at(10, 0)), Err(AppError::NoOpenBreak)));
        }
        day.start_break(at(10, 0), BreakType::Tea, None).unwrap();
        day.end_break(at(10, 10)).unwrap();
        assert!(matches!(day.end_break(at(10, 20)), Err(AppError::NoOpenBreak)));
    }

    #[test]
    fn only_one_open_break() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), None).unwrap();
        day.start_break(at(10, 0), BreakType::Tea, None).unwrap();
        assert!(matches!(
            day.start_break(at(10, 5), BreakType::Personal, None),
            Err(AppError::BreakAlreadyOpen)
        ));
    }

    #[test]
    fn breaks_need_an_open_day() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        assert!(matches!(
            day.start_break(at(10, 0), BreakType::Tea, None),
            Err(AppError::NotCheckedIn)
        ));
        day.check_in(at(9, 0), String::new(), None).unwrap();
        day.check_out(at(17, 0), String::new(), None).unwrap();
        assert!(matches!(
            day.start_break(at(17, 5), BreakType::Tea, None),
            Err(AppError::NotCheckedIn)
        ));
    }

    #[test]
    fn break_closed_after_check_out_reduces_hours() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), None).unwrap();
        day.start_break(at(12, 0), BreakType::Lunch, None).unwrap();
        day.check_out(at(17, 0), String::new(), None).unwrap();
        recompute(&mut day, &nine_to_five());
        assert_eq!(day.actual_hours, 8.0);

        day.end_break(at(13, 0)).unwrap();
        recompute(&mut day, &nine_to_five());
        assert_eq!(day.actual_hours, 7.0);
        assert_eq!(day.break_sessions_count, 1);
    }

    #[test]
    fn multiple_breaks_accumulate() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.check_in(at(9, 0), String::new(), None).unwrap();
        day.start_break(at(10, 0), BreakType::Tea, None).unwrap();
        day.end_break(at(10, 15)).unwrap();
        day.start_break(at(12, 0), BreakType::Lunch, None).unwrap();
        day.end_break(at(12, 45)).unwrap();
        assert_eq!(day.total_break_seconds, 3600);
        assert_eq!(day.break_sessions_count, 2);
    }

    #[test]
    fn correction_rejects_inverted_times() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        let err = day
            .apply_correction(AttendanceCorrection {
                check_in: Some(at(17, 0)),
                check_out: Some(at(9, 0)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn correction_recomputes_through_recompute() {
        let mut day = AttendanceDay::new(1, date(), 8.0);
        day.apply_correction(AttendanceCorrection {
            check_in: Some(at(9, 30)),
            check_out: Some(at(18, 30)),
            ..Default::default()
        })
        .unwrap();
        recompute(&mut day, &nine_to_five());
        assert_eq!(day.actual_hours, 9.0);
        assert_eq!(day.overtime_hours, 1.0);
        assert!(day.is_late);
        assert_eq!(day.status, AttendanceStatus::Present);
    }

    #[test]
    fn statuses_parse_from_storage_strings() {
        assert_eq!("HALF_DAY".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::HalfDay);
        assert_eq!(AttendanceStatus::OnLeave.to_string(), "ON_LEAVE");
        assert_eq!("LUNCH".parse::<BreakType>().unwrap(), BreakType::Lunch);
    }
}
