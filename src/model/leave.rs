use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

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
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn is_terminal(self) -> bool {
        self != LeaveStatus::Pending
    }
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
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveType {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Annual Leave")]
    pub name: String,
    pub description: String,
    #[schema(example = 20)]
    pub max_days_per_year: u32,
    pub requires_approval: bool,
    #[schema(example = 7)]
    pub advance_notice_days: u32,
    pub is_active: bool,
}

/// Allocated / used / pending days for one (employee, leave type, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveBalance {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type_id: u64,
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 20.0)]
    pub total_allocated: f64,
    #[schema(example = 3.0)]
    pub used_days: f64,
    #[schema(example = 0.0)]
    pub pending_days: f64,
}

/// A movement of days on the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedgerPosting {
    /// Hold days for a pending application. Fails beyond the available days.
    Reserve(f64),
    /// Give back held days.
    Release(f64),
    /// Swap one hold for another after an edit.
    Adjust { from: f64, to: f64 },
    /// Book approved days, first taking them off the hold if one was made.
    Consume { days: f64, from_pending: bool },
}

impl LeaveBalance {
    /// Ledger row opened with the leave type's yearly allowance.
    pub fn open(employee_id: u64, leave_type: &LeaveType, year: i32) -> Self {
        Self {
            id: 0,
            employee_id,
            leave_type_id: leave_type.id,
            year,
            total_allocated: leave_type.max_days_per_year as f64,
            used_days: 0.0,
            pending_days: 0.0,
        }
    }

    pub fn available_days(&self) -> f64 {
        self.total_allocated - self.used_days - self.pending_days
    }

    pub fn utilization_percentage(&self) -> f64 {
        if self.total_allocated > 0.0 {
            self.used_days / self.total_allocated * 100.0
        } else {
            0.0
        }
    }

    pub fn post(&mut self, posting: LedgerPosting) -> Result<(), AppError> {
        match posting {
            LedgerPosting::Reserve(days) => {
                self.ensure_available(days)?;
                self.pending_days += days;
            }
            LedgerPosting::Release(days) => {
                self.pending_days = (self.pending_days - days).max(0.0);
            }
            LedgerPosting::Adjust { from, to } => {
                let released = (self.pending_days - from).max(0.0);
                let available = self.total_allocated - self.used_days - released;
                if to > available {
                    return Err(AppError::InsufficientBalance {
                        requested: to,
                        available,
                    });
                }
                self.pending_days = released + to;
            }
            LedgerPosting::Consume { days, from_pending } => {
                if from_pending {
                    self.pending_days = (self.pending_days - days).max(0.0);
                }
                self.used_days += days;
            }
        }
        Ok(())
    }

    fn ensure_available(&self, days: f64) -> Result<(), AppError> {
        let available = self.available_days();
        if days > available {
            return Err(AppError::InsufficientBalance {
                requested: days,
                available,
            });
        }
        Ok(())
    }
}

/// When the ledger moves. `OnApproval` only books days at approval and
/// never touches `pending_days`; `ReserveOnSubmit` holds days from
/// submission until the application is decided or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerMode {
    #[default]
    OnApproval,
    ReserveOnSubmit,
}

impl LedgerMode {
    pub fn on_submit(self, days: f64) -> Option<LedgerPosting> {
        match self {
            LedgerMode::OnApproval => None,
            LedgerMode::ReserveOnSubmit => Some(LedgerPosting::Reserve(days)),
        }
    }

    pub fn on_edit(self, from: f64, to: f64) -> Option<LedgerPosting> {
        match self {
            LedgerMode::OnApproval => None,
            LedgerMode::ReserveOnSubmit => Some(LedgerPosting::Adjust { from, to }),
        }
    }

    pub fn on_approve(self, days: f64) -> LedgerPosting {
        LedgerPosting::Consume {
            days,
            from_pending: self == LedgerMode::ReserveOnSubmit,
        }
    }

    /// Reject and cancel share this.
    pub fn on_withdraw(self, days: f64) -> Option<LedgerPosting> {
        match self {
            LedgerMode::OnApproval => None,
            LedgerMode::ReserveOnSubmit => Some(LedgerPosting::Release(days)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveApplication {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = "2026-11-02", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(example = "2026-11-04", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = 3.0)]
    pub total_days: f64,
    pub reason: String,
    pub priority: Priority,
    pub contact_number: String,
    pub emergency_contact: String,
    pub status: LeaveStatus,
    #[schema(value_type = String, format = "date-time")]
    pub applied_on: NaiveDateTime,
    /// User id of the HR reviewer.
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_on: Option<NaiveDateTime>,
    pub approval_comments: String,
    pub is_half_day: bool,
    pub replacement_employee_id: Option<u64>,
}

/// Fields an employee supplies when applying.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeaveRequestForm {
    #[schema(example = 1)]
    pub leave_type_id: u64,
    #[schema(example = "2026-11-02", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(example = "2026-11-04", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = "Family event")]
    pub reason: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub emergency_contact: String,
    #[serde(default)]
    pub is_half_day: bool,
    pub replacement_employee_id: Option<u64>,
}

/// Edit of a pending application. `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateLeaveApplication {
    pub leave_type_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub priority: Option<Priority>,
    pub contact_number: Option<String>,
    pub emergency_contact: Option<String>,
    pub is_half_day: Option<bool>,
    /// `Some(None)` clears the replacement.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>)]
    pub replacement_employee_id: Option<Option<u64>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

/// Inclusive day span, halved for half-day requests.
pub fn total_days(start: NaiveDate, end: NaiveDate, is_half_day: bool) -> f64 {
    let days = ((end - start).num_days() + 1) as f64;
    if is_half_day { days * 0.5 } else { days }
}

pub fn validate_dates(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    leave_type: &LeaveType,
) -> Result<(), AppError> {
    if start > end {
        return Err(AppError::InvalidDateRange(
            "End date cannot be before start date".into(),
        ));
    }
    if start < today {
        return Err(AppError::InvalidDateRange(
            "Cannot apply for leave in the past".into(),
        ));
    }
    let earliest = today + Duration::days(leave_type.advance_notice_days as i64);
    if start < earliest {
        return Err(AppError::InsufficientNotice(leave_type.advance_notice_days));
    }
    Ok(())
}

impl LeaveApplication {
    pub fn submit(
        employee_id: u64,
        form: LeaveRequestForm,
        leave_type: &LeaveType,
        now: NaiveDateTime,
    ) -> Result<Self, AppError> {
        if form.reason.trim().is_empty() {
            return Err(AppError::validation("Reason is required"));
        }
        validate_dates(form.start_date, form.end_date, now.date(), leave_type)?;

        Ok(Self {
            id: 0,
            employee_id,
            leave_type_id: leave_type.id,
            start_date: form.start_date,
            end_date: form.end_date,
            total_days: total_days(form.start_date, form.end_date, form.is_half_day),
            reason: form.reason,
            priority: form.priority,
            contact_number: form.contact_number,
            emergency_contact: form.emergency_contact,
            status: LeaveStatus::Pending,
            applied_on: now,
            approved_by: None,
            approved_on: None,
            approval_comments: String::new(),
            is_half_day: form.is_half_day,
            replacement_employee_id: form.replacement_employee_id,
        })
    }

    /// Ledger year the application books against.
    pub fn year(&self) -> i32 {
        self.start_date.year()
    }

    pub fn is_owned_by(&self, employee_id: Option<u64>) -> bool {
        employee_id == Some(self.employee_id)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Applies an edit to a pending application. `leave_type` must be the
    /// type the application ends up with.
    pub fn edit(
        &mut self,
        update: UpdateLeaveApplication,
        leave_type: &LeaveType,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        self.ensure_pending()?;

        let start = update.start_date.unwrap_or(self.start_date);
        let end = update.end_date.unwrap_or(self.end_date);
        validate_dates(start, end, today, leave_type)?;

        self.leave_type_id = leave_type.id;
        self.start_date = start;
        self.end_date = end;
        if let Some(reason) = update.reason {
            self.reason = reason;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(contact) = update.contact_number {
            self.contact_number = contact;
        }
        if let Some(contact) = update.emergency_contact {
            self.emergency_contact = contact;
        }
        if let Some(half) = update.is_half_day {
            self.is_half_day = half;
        }
        if let Some(replacement) = update.replacement_employee_id {
            self.replacement_employee_id = replacement;
        }
        self.total_days = total_days(self.start_date, self.end_date, self.is_half_day);
        Ok(())
    }

    pub fn approve(
        &mut self,
        approver: u64,
        at: NaiveDateTime,
        comments: Option<String>,
    ) -> Result<(), AppError> {
        self.decide(LeaveStatus::Approved, approver, at, comments)
    }

    pub fn reject(
        &mut self,
        approver: u64,
        at: NaiveDateTime,
        comments: Option<String>,
    ) -> Result<(), AppError> {
        self.decide(LeaveStatus::Rejected, approver, at, comments)
    }

    /// Only the owning employee may cancel, and only while pending.
    pub fn cancel(&mut self, requester_employee_id: Option<u64>) -> Result<(), AppError> {
        if !self.is_owned_by(requester_employee_id) {
            return Err(AppError::forbidden(
                "You can only cancel your own leave applications",
            ));
        }
        self.ensure_pending()?;
        self.status = LeaveStatus::Cancelled;
        Ok(())
    }

    fn decide(
        &mut self,
        outcome: LeaveStatus,
        approver: u64,
        at: NaiveDateTime,
        comments: Option<String>,
    ) -> Result<(), AppError> {
        self.ensure_pending()?;
        self.status = outcome;
        self.approved_by = Some(approver);
        self.approved_on = Some(at);
        self.approval_comments = comments.unwrap_or_default();
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::NotPending);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveComment {
    pub id: u64,
    pub application_id: u64,
    pub author_id: u64,
    pub comment: String,
    /// Visible to HR only.
    pub is_internal: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveAttachment {
    pub id: u64,
    pub application_id: u64,
    pub file_name: String,
    pub file_path: String,
    /// Bytes.
    pub file_size: u64,
    pub uploaded_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub uploaded_at: NaiveDateTime,
}

pub fn visible_comments(comments: Vec<LeaveComment>, is_hr: bool) -> Vec<LeaveComment> {
    if is_hr {
        comments
    } else {
        comments.into_iter().filter(|c| !c.is_internal).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annual() -> LeaveType {
        LeaveType {
            id: 1,
            name: "Annual Leave".into(),
            description: String::new(),
            max_days_per_year: 20,
            requires_approval: true,
            advance_notice_days: 7,
            is_active: true,
        }
    }

    fn now() -> NaiveDateTime {
        "2026-10-19T10:00:00".parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn form(start: &str, end: &str) -> LeaveRequestForm {
        LeaveRequestForm {
            leave_type_id: 1,
            start_date: d(start),
            end_date: d(end),
            reason: "Trip".into(),
            priority: Priority::default(),
            contact_number: String::new(),
            emergency_contact: String::new(),
            is_half_day: false,
            replacement_employee_id: None,
        }
    }

    fn pending() -> LeaveApplication {
        LeaveApplication::submit(5, form("2026-11-02", "2026-11-04"), &annual(), now()).unwrap()
    }

    #[test]
    fn total_days_is_inclusive_and_halves() {
        assert_eq!(total_days(d("2026-11-02"), d("2026-11-04"), false), 3.0);
        assert_eq!(total_days(d("2026-11-02"), d("2026-11-02"), false), 1.0);
        assert_eq!(total_days(d("2026-11-02"), d("2026-11-03"), true), 1.0);
    }

    #[test]
    fn tomorrow_needs_more_notice() {
        let err = LeaveApplication::submit(5, form("2026-10-20", "2026-10-20"), &annual(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientNotice(7)));
    }

    #[test]
    fn exact_notice_is_enough() {
        let app =
            LeaveApplication::submit(5, form("2026-10-26", "2026-10-26"), &annual(), now()).unwrap();
        assert_eq!(app.status, LeaveStatus::Pending);
    }

    #[test]
    fn inverted_and_past_ranges_are_rejected() {
        let err = LeaveApplication::submit(5, form("2026-11-04", "2026-11-02"), &annual(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDateRange(_)));

        let err = LeaveApplication::submit(5, form("2026-10-01", "2026-10-02"), &annual(), now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDateRange(_)));
    }

    #[test]
    fn decisions_are_terminal() {
        let mut app = pending();
        app.approve(99, now(), Some("ok".into())).unwrap();
        assert_eq!(app.status, LeaveStatus::Approved);
        assert_eq!(app.approved_by, Some(99));
        assert_eq!(app.approval_comments, "ok");

        assert!(matches!(app.approve(99, now(), None), Err(AppError::NotPending)));
        assert!(matches!(app.reject(99, now(), None), Err(AppError::NotPending)));
        assert!(matches!(app.cancel(Some(5)), Err(AppError::NotPending)));
    }

    #[test]
    fn only_owner_cancels() {
        let mut app = pending();
        assert!(matches!(app.cancel(Some(6)), Err(AppError::Forbidden(_))));
        assert!(matches!(app.cancel(None), Err(AppError::Forbidden(_))));
        app.cancel(Some(5)).unwrap();
        assert_eq!(app.status, LeaveStatus::Cancelled);
    }

    #[test]
    fn edit_recomputes_days() {
        let mut app = pending();
        app.edit(
            UpdateLeaveApplication {
                end_date: Some(d("2026-11-06")),
                is_half_day: Some(true),
                ..Default::default()
            },
            &annual(),
            now().date(),
        )
        .unwrap();
        assert_eq!(app.total_days, 2.5);
    }

    #[test]
    fn edit_clears_replacement() {
        let mut app = pending();
        app.replacement_employee_id = Some(8);
        app.edit(
            UpdateLeaveApplication {
                replacement_employee_id: Some(None),
                ..Default::default()
            },
            &annual(),
            now().date(),
        )
        .unwrap();
        assert_eq!(app.replacement_employee_id, None);
    }

    #[test]
    fn approval_books_used_days_only() {
        let mut balance = LeaveBalance::open(5, &annual(), 2026);
        balance.post(LedgerMode::OnApproval.on_approve(3.0)).unwrap();
        assert_eq!(balance.total_allocated, 20.0);
        assert_eq!(balance.used_days, 3.0);
        assert_eq!(balance.pending_days, 0.0);
        assert_eq!(balance.available_days(), 17.0);
        assert_eq!(balance.utilization_percentage(), 15.0);
    }

    #[test]
    fn deferred_mode_has_no_holds() {
        assert_eq!(LedgerMode::OnApproval.on_submit(3.0), None);
        assert_eq!(LedgerMode::OnApproval.on_withdraw(3.0), None);
        assert_eq!(LedgerMode::OnApproval.on_edit(3.0, 4.0), None);
    }

    #[test]
    fn reservation_lifecycle() {
        let mode = LedgerMode::ReserveOnSubmit;
        let mut balance = LeaveBalance::open(5, &annual(), 2026);

        balance.post(mode.on_submit(5.0).unwrap()).unwrap();
        assert_eq!(balance.pending_days, 5.0);
        assert_eq!(balance.available_days(), 15.0);

        balance.post(mode.on_edit(5.0, 6.0).unwrap()).unwrap();
        assert_eq!(balance.pending_days, 6.0);

        balance.post(mode.on_approve(6.0)).unwrap();
        assert_eq!(balance.pending_days, 0.0);
        assert_eq!(balance.used_days, 6.0);

        balance.post(mode.on_submit(2.0).unwrap()).unwrap();
        balance.post(mode.on_withdraw(2.0).unwrap()).unwrap();
        assert_eq!(balance.pending_days, 0.0);
        assert_eq!(balance.available_days(), 14.0);
    }

    #[test]
    fn reservation_beyond_allocation_fails() {
        let mut balance = LeaveBalance::open(5, &annual(), 2026);
        balance.post(LedgerPosting::Reserve(18.0)).unwrap();
        let err = balance.post(LedgerPosting::Reserve(3.0)).unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(balance.pending_days, 18.0);

        let err = balance
            .post(LedgerPosting::Adjust { from: 18.0, to: 21.0 })
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(balance.pending_days, 18.0);
    }

    #[test]
    fn internal_comments_hidden_from_employees() {
        let comment = |id, internal| LeaveComment {
            id,
            application_id: 1,
            author_id: 1,
            comment: "note".into(),
            is_internal: internal,
            created_at: now(),
        };
        let all = vec![comment(1, false), comment(2, true)];
        assert_eq!(visible_comments(all.clone(), true).len(), 2);
        let shown = visible_comments(all, false);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].id, 1);
    }
}
