use actix_web::{HttpResponse, web};

use crate::api::AppServices;
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::employee::{CreateEmployee, EmployeeFilter, UpdateEmployee};

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee and login account created", body = EmployeeCreated),
        (status = 400, description = "Invalid payload, or code, email or username taken", body = Object, example = json!({
            "error": "Validation",
            "message": "Username already exists"
        })),
        (status = 403, description = "HR only"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, AppError> {
    let created = services.create_employee(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

/// List employees with optional filters and pagination
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeFilter),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeePage),
        (status = 403, description = "HR only")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    services: AppServices,
    query: web::Query<EmployeeFilter>,
) -> Result<HttpResponse, AppError> {
    let page = services.list_employees(&auth, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Get employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let employee = services.get_employee(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Update employee
#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id" = u64, Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Invalid email, or code or email taken"),
        (status = 403, description = "HR only"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<UpdateEmployee>,
) -> Result<HttpResponse, AppError> {
    let employee = services
        .update_employee(&auth, path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(employee))
}
