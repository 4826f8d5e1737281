use actix_web::{HttpResponse, web};

use crate::api::{AppServices, now, optional_json};
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::leave::{LeaveRequestForm, UpdateLeaveApplication};
use crate::service::leave::{
    AttachmentRequest, BalanceQuery, BulkApproveRequest, CommentRequest, DecisionRequest,
    LeaveTypeForm, UpdateLeaveType,
};
use crate::store::LeaveFilter;

/* =========================
Leave types
========================= */
#[utoipa::path(
    post,
    path = "/api/leave/types",
    request_body = LeaveTypeForm,
    responses(
        (status = 201, description = "Leave type created", body = LeaveType),
        (status = 400, description = "Name missing or taken"),
        (status = 403, description = "HR only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave_type(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<LeaveTypeForm>,
) -> Result<HttpResponse, AppError> {
    let leave_type = services.create_leave_type(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(leave_type))
}

/// Active leave types; HR also sees inactive ones
#[utoipa::path(
    get,
    path = "/api/leave/types",
    responses((status = 200, description = "Leave types", body = Vec<LeaveType>)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_leave_types(auth: AuthUser, services: AppServices) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(services.list_leave_types(&auth).await?))
}

#[utoipa::path(
    put,
    path = "/api/leave/types/{id}",
    params(("id" = u64, Path, description = "Leave type ID")),
    request_body = UpdateLeaveType,
    responses(
        (status = 200, description = "Leave type updated", body = LeaveType),
        (status = 403, description = "HR only"),
        (status = 404, description = "Leave type not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn update_leave_type(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<UpdateLeaveType>,
) -> Result<HttpResponse, AppError> {
    let leave_type = services
        .update_leave_type(&auth, path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(leave_type))
}

/* =========================
Applications
========================= */
/// Submit a leave application
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = LeaveRequestForm,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Application submitted as PENDING", body = LeaveApplication),
        (status = 400, description = "Invalid dates or not enough notice", body = Object, example = json!({
            "error": "InsufficientNotice",
            "message": "This leave type requires 7 days advance notice"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Account has no employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<LeaveRequestForm>,
) -> Result<HttpResponse, AppError> {
    let application = services
        .submit_application(&auth, payload.into_inner(), now())
        .await?;
    Ok(HttpResponse::Created().json(application))
}

/// Paginated applications. Employees only ever see their own.
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated list of leave applications", body = LeavePage),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    services: AppServices,
    query: web::Query<LeaveFilter>,
) -> Result<HttpResponse, AppError> {
    let page = services.list_applications(&auth, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/leave/{id}",
    params(("id" = u64, Path, description = "Leave application ID")),
    responses(
        (status = 200, description = "Leave application", body = LeaveApplication),
        (status = 404, description = "Not found or not visible to the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let application = services.get_application(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(application))
}

#[utoipa::path(
    put,
    path = "/api/leave/{id}",
    params(("id" = u64, Path, description = "Leave application ID")),
    request_body = UpdateLeaveApplication,
    responses(
        (status = 200, description = "Application updated", body = LeaveApplication),
        (status = 400, description = "Invalid dates or not enough notice"),
        (status = 404, description = "Not found or not visible to the caller"),
        (status = 409, description = "Application is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn update_leave(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<UpdateLeaveApplication>,
) -> Result<HttpResponse, AppError> {
    let application = services
        .update_application(&auth, path.into_inner(), payload.into_inner(), now())
        .await?;
    Ok(HttpResponse::Ok().json(application))
}

/* =========================
Decisions
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{id}/approve",
    params(("id" = u64, Path, description = "ID of the leave application to approve")),
    request_body(content = DecisionRequest, description = "Optional reviewer comments"),
    responses(
        (status = 200, description = "Leave approved, days booked", body = LeaveApplication),
        (status = 403, description = "HR only"),
        (status = 404, description = "Leave application not found"),
        (status = 409, description = "Already decided", body = Object, example = json!({
            "error": "NotPending",
            "message": "Application is not pending"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let comments = optional_json::<DecisionRequest>(&body)?.comments;
    let application = services
        .approve_application(&auth, path.into_inner(), comments, now())
        .await?;
    Ok(HttpResponse::Ok().json(application))
}

#[utoipa::path(
    put,
    path = "/api/leave/{id}/reject",
    params(("id" = u64, Path, description = "ID of the leave application to reject")),
    request_body(content = DecisionRequest, description = "Optional reviewer comments"),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveApplication),
        (status = 403, description = "HR only"),
        (status = 404, description = "Leave application not found"),
        (status = 409, description = "Already decided")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let comments = optional_json::<DecisionRequest>(&body)?.comments;
    let application = services
        .reject_application(&auth, path.into_inner(), comments, now())
        .await?;
    Ok(HttpResponse::Ok().json(application))
}

#[utoipa::path(
    put,
    path = "/api/leave/{id}/cancel",
    params(("id" = u64, Path, description = "ID of the leave application to cancel")),
    responses(
        (status = 200, description = "Leave cancelled", body = LeaveApplication),
        (status = 403, description = "Not the owner of the application"),
        (status = 409, description = "Already decided")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let application = services.cancel_application(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(application))
}

#[utoipa::path(
    post,
    path = "/api/leave/bulk-approve",
    request_body = BulkApproveRequest,
    responses(
        (status = 200, description = "Number of applications approved", body = BulkApproveResult),
        (status = 403, description = "HR only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn bulk_approve(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<BulkApproveRequest>,
) -> Result<HttpResponse, AppError> {
    let result = services.bulk_approve(&auth, payload.into_inner(), now()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/* =========================
Comments and attachments
========================= */
#[utoipa::path(
    post,
    path = "/api/leave/{id}/comments",
    params(("id" = u64, Path, description = "Leave application ID")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment added", body = LeaveComment),
        (status = 404, description = "Not found or not visible to the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn add_comment(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, AppError> {
    let comment = services
        .add_comment(&auth, path.into_inner(), payload.into_inner(), now())
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/leave/{id}/comments",
    params(("id" = u64, Path, description = "Leave application ID")),
    responses(
        (status = 200, description = "Comments, newest first; internal ones for HR only", body = Vec<LeaveComment>),
        (status = 404, description = "Not found or not visible to the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_comments(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let comments = services.list_comments(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    post,
    path = "/api/leave/{id}/attachments",
    params(("id" = u64, Path, description = "Leave application ID")),
    request_body = AttachmentRequest,
    responses(
        (status = 201, description = "Attachment metadata recorded", body = LeaveAttachment),
        (status = 404, description = "Not found or not visible to the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn add_attachment(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<AttachmentRequest>,
) -> Result<HttpResponse, AppError> {
    let attachment = services
        .add_attachment(&auth, path.into_inner(), payload.into_inner(), now())
        .await?;
    Ok(HttpResponse::Created().json(attachment))
}

#[utoipa::path(
    get,
    path = "/api/leave/{id}/attachments",
    params(("id" = u64, Path, description = "Leave application ID")),
    responses(
        (status = 200, description = "Attachment metadata", body = Vec<LeaveAttachment>),
        (status = 404, description = "Not found or not visible to the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_attachments(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let attachments = services.list_attachments(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(attachments))
}

/* =========================
Balances
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/balances",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Ledger rows with available days", body = Vec<BalanceView>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_balances(
    auth: AuthUser,
    services: AppServices,
    query: web::Query<BalanceQuery>,
) -> Result<HttpResponse, AppError> {
    let balances = services
        .list_balances(&auth, query.into_inner(), now())
        .await?;
    Ok(HttpResponse::Ok().json(balances))
}
