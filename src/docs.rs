use crate::auth::handlers::LoginResponse;
use crate::model::attendance::{
    AttendanceCorrection, AttendanceDay, AttendanceStatus, BreakInterval, BreakType,
};
use crate::model::employee::{CreateEmployee, Employee, EmployeeFilter, UpdateEmployee};
use crate::model::leave::{
    LeaveApplication, LeaveAttachment, LeaveComment, LeaveRequestForm, LeaveStatus, LeaveType,
    Priority, UpdateLeaveApplication,
};
use crate::model::schedule::{AttendancePolicy, EmployeeSchedule, Holiday, WorkSchedule};
use crate::models::LoginReqDto;
use crate::service::attendance::{BreakRequest, ClockRequest, SeedDayRequest};
use crate::service::employee::EmployeeCreated;
use crate::service::leave::{
    AttachmentRequest, BalanceView, BulkApproveRequest, BulkApproveResult, CommentRequest,
    DecisionRequest, LeaveTypeForm, UpdateLeaveType,
};
use crate::service::schedule::{AssignSchedule, HolidayForm, PolicyForm, ScheduleForm, UpdateSchedule};
use crate::service::{AttendancePage, EmployeePage, LeavePage};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workday API",
        version = "1.0.0",
        description = r#"
## Attendance and leave service

Time accounting and leave bookkeeping for an HR back office.

### 🔹 Key Features
- **Attendance**
  - Check-in / check-out with optional geofence, break sessions
  - Worked hours, overtime, lateness and early departure per day
  - HR corrections and pre-seeding of holiday, leave and absent days
- **Schedules**
  - Work schedules, per-employee bindings, attendance policy, holidays
- **Leave**
  - Applications with a PENDING → APPROVED / REJECTED / CANCELLED lifecycle
  - Yearly ledger of allocated, used and pending days per leave type
  - Comments (internal ones visible to HR only) and attachment metadata
- **Employees**
  - Onboarding with a generated login and emailed credentials

### 🔐 Security
Every `/api` endpoint requires a **JWT Bearer** access token from `/auth/login`.
Mutations of reference data and leave decisions are restricted to **HR**.

### 📦 Errors
Failures carry `{"error": <kind>, "message": <text>}` where `kind` is stable,
e.g. `AlreadyCheckedIn`, `NoOpenBreak`, `InsufficientNotice`, `NotPending`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::start_break,
        crate::api::attendance::end_break,
        crate::api::attendance::today,
        crate::api::attendance::list_attendance,
        crate::api::attendance::get_attendance,
        crate::api::attendance::correct_attendance,
        crate::api::attendance::seed_attendance,

        crate::api::schedule::create_schedule,
        crate::api::schedule::list_schedules,
        crate::api::schedule::update_schedule,
        crate::api::schedule::assign_schedule,
        crate::api::schedule::list_assignments,
        crate::api::schedule::deactivate_assignment,
        crate::api::schedule::create_policy,
        crate::api::schedule::list_policies,
        crate::api::schedule::create_holiday,
        crate::api::schedule::list_holidays,
        crate::api::schedule::delete_holiday,

        crate::api::leave::create_leave_type,
        crate::api::leave::list_leave_types,
        crate::api::leave::update_leave_type,
        crate::api::leave::create_leave,
        crate::api::leave::leave_list,
        crate::api::leave::get_leave,
        crate::api::leave::update_leave,
        crate::api::leave::approve_leave,
        crate::api::leave::reject_leave,
        crate::api::leave::cancel_leave,
        crate::api::leave::bulk_approve,
        crate::api::leave::add_comment,
        crate::api::leave::list_comments,
        crate::api::leave::add_attachment,
        crate::api::leave::list_attachments,
        crate::api::leave::list_balances,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            AttendanceDay,
            AttendanceStatus,
            BreakInterval,
            BreakType,
            AttendanceCorrection,
            AttendancePage,
            ClockRequest,
            BreakRequest,
            SeedDayRequest,
            WorkSchedule,
            EmployeeSchedule,
            AttendancePolicy,
            Holiday,
            ScheduleForm,
            UpdateSchedule,
            AssignSchedule,
            PolicyForm,
            HolidayForm,
            LeaveType,
            LeaveApplication,
            LeaveStatus,
            Priority,
            LeaveComment,
            LeaveAttachment,
            LeaveRequestForm,
            UpdateLeaveApplication,
            LeavePage,
            LeaveTypeForm,
            UpdateLeaveType,
            DecisionRequest,
            BulkApproveRequest,
            BulkApproveResult,
            CommentRequest,
            AttachmentRequest,
            BalanceView,
            Employee,
            CreateEmployee,
            UpdateEmployee,
            EmployeeFilter,
            EmployeeCreated,
            EmployeePage
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Attendance", description = "Daily time accounting"),
        (name = "Schedule", description = "Schedules, policy and holidays"),
        (name = "Leave", description = "Leave applications and ledger"),
        (name = "Employee", description = "Employee directory"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by the protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
