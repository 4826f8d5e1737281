use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::leave::{
    LeaveApplication, LeaveAttachment, LeaveBalance, LeaveComment, LeaveRequestForm, LeaveType,
    LedgerMode, UpdateLeaveApplication, visible_comments,
};
use crate::notify::{deliver, leave_decision_email};
use crate::service::{Page, Services};
use crate::store::{DirectoryStore, LeaveFilter, LeaveStore, LedgerEntry, PageRequest};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeaveTypeForm {
    #[schema(example = "Annual Leave")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(example = 20)]
    pub max_days_per_year: u32,
    #[serde(default = "default_true")]
    pub requires_approval: bool,
    #[serde(default)]
    #[schema(example = 7)]
    pub advance_notice_days: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateLeaveType {
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_days_per_year: Option<u32>,
    pub requires_approval: Option<bool>,
    pub advance_notice_days: Option<u32>,
    pub is_active: Option<bool>,
}

impl UpdateLeaveType {
    fn apply(self, leave_type: &mut LeaveType) -> Result<(), AppError> {
        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("Leave type name is required"));
            }
            leave_type.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            leave_type.description = description;
        }
        if let Some(days) = self.max_days_per_year {
            leave_type.max_days_per_year = days;
        }
        if let Some(required) = self.requires_approval {
            leave_type.requires_approval = required;
        }
        if let Some(days) = self.advance_notice_days {
            leave_type.advance_notice_days = days;
        }
        if let Some(active) = self.is_active {
            leave_type.is_active = active;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DecisionRequest {
    #[schema(example = "Enjoy your time off")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkApproveRequest {
    #[schema(example = json!([1, 2, 3]))]
    pub application_ids: Vec<u64>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkApproveResult {
    #[schema(example = 2)]
    pub approved_count: usize,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CommentRequest {
    #[schema(example = "Handover notes attached")]
    pub comment: String,
    /// Ignored unless the author is HR.
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttachmentRequest {
    #[schema(example = "medical.pdf")]
    pub file_name: String,
    #[schema(example = "leave/2026/11/medical.pdf")]
    pub file_path: String,
    #[schema(example = 48213)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Filter by employee ID (HR only)
    pub employee_id: Option<u64>,
    /// Defaults to the current year
    pub year: Option<i32>,
}

/// Ledger row with its derived figures.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BalanceView {
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
    #[schema(example = 17.0)]
    pub available_days: f64,
    #[schema(example = 15.0)]
    pub utilization_percentage: f64,
}

impl From<LeaveBalance> for BalanceView {
    fn from(balance: LeaveBalance) -> Self {
        Self {
            available_days: balance.available_days(),
            utilization_percentage: balance.utilization_percentage(),
            employee_id: balance.employee_id,
            leave_type_id: balance.leave_type_id,
            year: balance.year,
            total_allocated: balance.total_allocated,
            used_days: balance.used_days,
            pending_days: balance.pending_days,
        }
    }
}

/// Postings that follow an edit: the hold is adjusted in place, or moved
/// when the edit changed the ledger row the application books against.
fn edit_postings(mode: LedgerMode, before: &LeaveApplication, after: &LeaveApplication) -> Vec<LedgerEntry> {
    if before.leave_type_id == after.leave_type_id && before.year() == after.year() {
        return mode
            .on_edit(before.total_days, after.total_days)
            .map(|posting| LedgerEntry::for_application(after, posting))
            .into_iter()
            .collect();
    }

    let release = mode
        .on_withdraw(before.total_days)
        .map(|posting| LedgerEntry::for_application(before, posting));
    let reserve = mode
        .on_submit(after.total_days)
        .map(|posting| LedgerEntry::for_application(after, posting));
    release.into_iter().chain(reserve).collect()
}

impl<S: LeaveStore> Services<S> {
    pub async fn create_leave_type(
        &self,
        caller: &AuthUser,
        form: LeaveTypeForm,
    ) -> Result<LeaveType, AppError> {
        caller.require_hr()?;
        if form.name.trim().is_empty() {
            return Err(AppError::validation("Leave type name is required"));
        }

        let leave_type = self
            .store
            .create_leave_type(LeaveType {
                id: 0,
                name: form.name.trim().to_string(),
                description: form.description,
                max_days_per_year: form.max_days_per_year,
                requires_approval: form.requires_approval,
                advance_notice_days: form.advance_notice_days,
                is_active: form.is_active,
            })
            .await?;
        info!(leave_type_id = leave_type.id, name = %leave_type.name, "Leave type created");
        Ok(leave_type)
    }

    pub async fn update_leave_type(
        &self,
        caller: &AuthUser,
        id: u64,
        update: UpdateLeaveType,
    ) -> Result<LeaveType, AppError> {
        caller.require_hr()?;
        let leave_type = self
            .store
            .update_leave_type(id, |leave_type| update.apply(leave_type))
            .await?;
        info!(leave_type_id = id, "Leave type updated");
        Ok(leave_type)
    }

    /// HR sees retired types too.
    pub async fn list_leave_types(&self, caller: &AuthUser) -> Result<Vec<LeaveType>, AppError> {
        Ok(self.store.list_leave_types(!caller.is_hr()).await?)
    }

    async fn active_leave_type(&self, id: u64) -> Result<LeaveType, AppError> {
        match self.store.get_leave_type(id).await? {
            Some(leave_type) if leave_type.is_active => Ok(leave_type),
            Some(_) => Err(AppError::validation("Leave type is not active")),
            None => Err(AppError::NotFound("Leave type")),
        }
    }

    #[instrument(name = "leave_submit", skip(self, caller, form), fields(user_id = caller.user_id))]
    pub async fn submit_application(
        &self,
        caller: &AuthUser,
        form: LeaveRequestForm,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        let employee_id = caller.require_employee()?;
        let leave_type = self.active_leave_type(form.leave_type_id).await?;
        let application = LeaveApplication::submit(employee_id, form, &leave_type, now)?;

        let ledger = self
            .ledger_mode
            .on_submit(application.total_days)
            .map(|posting| LedgerEntry::for_application(&application, posting))
            .into_iter()
            .collect();
        let application = self.store.insert_application(application, ledger).await?;

        info!(
            leave_id = application.id,
            employee_id,
            total_days = application.total_days,
            "Leave application submitted"
        );
        Ok(application)
    }

    /// Non-owners see `NotFound` rather than `Forbidden`.
    pub async fn get_application(
        &self,
        caller: &AuthUser,
        id: u64,
    ) -> Result<LeaveApplication, AppError> {
        self.store
            .get_application(id)
            .await?
            .filter(|application| caller.can_access(application.employee_id))
            .ok_or(AppError::NotFound("Leave application"))
    }

    pub async fn list_applications(
        &self,
        caller: &AuthUser,
        mut filter: LeaveFilter,
    ) -> Result<Page<LeaveApplication>, AppError> {
        filter.employee_id = caller.scope_employee(filter.employee_id)?;
        let page = PageRequest::new(filter.page, filter.per_page);
        let (applications, total) = self.store.list_applications(&filter, page).await?;
        Ok(Page::new(applications, page, total))
    }

    /// Edits a pending application. The owner or HR may edit; dates and
    /// notice are checked again against the resulting leave type.
    pub async fn update_application(
        &self,
        caller: &AuthUser,
        id: u64,
        update: UpdateLeaveApplication,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        let current = self.get_application(caller, id).await?;
        let leave_type = match update.leave_type_id {
            Some(type_id) if type_id != current.leave_type_id => {
                self.active_leave_type(type_id).await?
            }
            _ => self
                .store
                .get_leave_type(current.leave_type_id)
                .await?
                .ok_or(AppError::NotFound("Leave type"))?,
        };
        let mode = self.ledger_mode;

        let application = self
            .store
            .transition_application(id, |application| {
                let before = application.clone();
                application.edit(update, &leave_type, now.date())?;
                Ok(edit_postings(mode, &before, application))
            })
            .await?;

        info!(leave_id = id, total_days = application.total_days, "Leave application updated");
        Ok(application)
    }

    /// Only the owning employee cancels, only while pending.
    pub async fn cancel_application(
        &self,
        caller: &AuthUser,
        id: u64,
    ) -> Result<LeaveApplication, AppError> {
        let mode = self.ledger_mode;
        let application = self
            .store
            .transition_application(id, |application| {
                application.cancel(caller.employee_id)?;
                Ok(mode
                    .on_withdraw(application.total_days)
                    .map(|posting| LedgerEntry::for_application(application, posting))
                    .into_iter()
                    .collect())
            })
            .await?;

        info!(leave_id = id, "Leave application cancelled");
        Ok(application)
    }

    pub async fn add_comment(
        &self,
        caller: &AuthUser,
        id: u64,
        request: CommentRequest,
        now: NaiveDateTime,
    ) -> Result<LeaveComment, AppError> {
        let application = self.get_application(caller, id).await?;
        if request.comment.trim().is_empty() {
            return Err(AppError::validation("Comment cannot be empty"));
        }

        let comment = self
            .store
            .add_comment(LeaveComment {
                id: 0,
                application_id: application.id,
                author_id: caller.user_id,
                comment: request.comment,
                is_internal: caller.is_hr() && request.is_internal,
                created_at: now,
            })
            .await?;
        info!(leave_id = id, comment_id = comment.id, internal = comment.is_internal, "Leave comment added");
        Ok(comment)
    }

    pub async fn list_comments(&self, caller: &AuthUser, id: u64) -> Result<Vec<LeaveComment>, AppError> {
        let application = self.get_application(caller, id).await?;
        let comments = self.store.list_comments(application.id).await?;
        Ok(visible_comments(comments, caller.is_hr()))
    }

    pub async fn add_attachment(
        &self,
        caller: &AuthUser,
        id: u64,
        request: AttachmentRequest,
        now: NaiveDateTime,
    ) -> Result<LeaveAttachment, AppError> {
        let application = self.get_application(caller, id).await?;
        if request.file_name.trim().is_empty() || request.file_path.trim().is_empty() {
            return Err(AppError::validation("File name and path are required"));
        }

        let attachment = self
            .store
            .add_attachment(LeaveAttachment {
                id: 0,
                application_id: application.id,
                file_name: request.file_name,
                file_path: request.file_path,
                file_size: request.file_size,
                uploaded_by: caller.user_id,
                uploaded_at: now,
            })
            .await?;
        info!(leave_id = id, attachment_id = attachment.id, "Leave attachment recorded");
        Ok(attachment)
    }

    pub async fn list_attachments(
        &self,
        caller: &AuthUser,
        id: u64,
    ) -> Result<Vec<LeaveAttachment>, AppError> {
        let application = self.get_application(caller, id).await?;
        Ok(self.store.list_attachments(application.id).await?)
    }

    /// Balances for a year. For a single employee every active leave type
    /// is listed, untouched ones at their full allowance.
    pub async fn list_balances(
        &self,
        caller: &AuthUser,
        query: BalanceQuery,
        now: NaiveDateTime,
    ) -> Result<Vec<BalanceView>, AppError> {
        let employee_id = caller.scope_employee(query.employee_id)?;
        let year = query.year.unwrap_or_else(|| now.year());
        let mut balances = self.store.list_balances(employee_id, year).await?;

        if let Some(employee_id) = employee_id {
            for leave_type in self.store.list_leave_types(true).await? {
                if !balances.iter().any(|b| b.leave_type_id == leave_type.id) {
                    balances.push(LeaveBalance::open(employee_id, &leave_type, year));
                }
            }
            balances.sort_by_key(|b| b.leave_type_id);
        }

        Ok(balances.into_iter().map(BalanceView::from).collect())
    }
}

impl<S: LeaveStore + DirectoryStore> Services<S> {
    #[instrument(name = "leave_approve", skip(self, caller, comments), fields(user_id = caller.user_id))]
    pub async fn approve_application(
        &self,
        caller: &AuthUser,
        id: u64,
        comments: Option<String>,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        caller.require_hr()?;
        let mode = self.ledger_mode;
        let application = self
            .store
            .transition_application(id, |application| {
                application.approve(caller.user_id, now, comments)?;
                let posting = mode.on_approve(application.total_days);
                Ok(vec![LedgerEntry::for_application(application, posting)])
            })
            .await?;

        info!(
            leave_id = id,
            employee_id = application.employee_id,
            total_days = application.total_days,
            "Leave application approved"
        );
        self.notify_decision(&application).await;
        Ok(application)
    }

    #[instrument(name = "leave_reject", skip(self, caller, comments), fields(user_id = caller.user_id))]
    pub async fn reject_application(
        &self,
        caller: &AuthUser,
        id: u64,
        comments: Option<String>,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        caller.require_hr()?;
        let mode = self.ledger_mode;
        let application = self
            .store
            .transition_application(id, |application| {
                application.reject(caller.user_id, now, comments)?;
                Ok(mode
                    .on_withdraw(application.total_days)
                    .map(|posting| LedgerEntry::for_application(application, posting))
                    .into_iter()
                    .collect())
            })
            .await?;

        info!(leave_id = id, employee_id = application.employee_id, "Leave application rejected");
        self.notify_decision(&application).await;
        Ok(application)
    }

    /// Approves each pending id; decided or unknown ids are skipped.
    pub async fn bulk_approve(
        &self,
        caller: &AuthUser,
        request: BulkApproveRequest,
        now: NaiveDateTime,
    ) -> Result<BulkApproveResult, AppError> {
        caller.require_hr()?;
        let mut approved_count = 0;
        for id in request.application_ids {
            match self
                .approve_application(caller, id, request.comments.clone(), now)
                .await
            {
                Ok(_) => approved_count += 1,
                Err(AppError::NotPending | AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(approved_count, "Bulk approval finished");
        Ok(BulkApproveResult { approved_count })
    }

    async fn notify_decision(&self, application: &LeaveApplication) {
        match self.store.employee_email(application.employee_id).await {
            Ok(Some(email)) => {
                deliver(self.notifier(), leave_decision_email(&email, application));
            }
            Ok(None) => warn!(
                employee_id = application.employee_id,
                "No email on file, decision not sent"
            ),
            Err(e) => warn!(error = %e, leave_id = application.id, "Could not look up employee email"),
        }
    }
}
