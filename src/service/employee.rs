use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::auth::password::{hash_password, temporary_password};
use crate::error::AppError;
use crate::model::employee::{CreateEmployee, Employee, EmployeeFilter, NewAccount, UpdateEmployee};
use crate::model::role::Role;
use crate::notify::{credentials_email, deliver};
use crate::service::{Page, Services};
use crate::store::{DirectoryStore, PageRequest};

/// Result of onboarding. The temporary password is only returned when the
/// credentials email could not be delivered, so HR can pass it on.
#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeCreated {
    pub employee: Employee,
    #[schema(example = "john.doe")]
    pub username: String,
    pub credentials_emailed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

impl<S: DirectoryStore> Services<S> {
    /// Creates the employee with a linked EMPLOYEE account and mails the
    /// login details. Mail failure is reported, never raised.
    #[instrument(name = "employee_create", skip(self, caller, request), fields(user_id = caller.user_id))]
    pub async fn create_employee(
        &self,
        caller: &AuthUser,
        request: CreateEmployee,
    ) -> Result<EmployeeCreated, AppError> {
        caller.require_hr()?;
        request.validate()?;

        let password = request
            .temporary_password
            .clone()
            .unwrap_or_else(temporary_password);
        let username = request.username.trim().to_string();
        let account = NewAccount {
            username: username.clone(),
            password_hash: hash_password(&password)?,
            role_id: Role::Employee.id(),
        };

        let employee = self
            .store
            .create_employee(
                Employee {
                    id: 0,
                    employee_code: request.employee_code.trim().to_string(),
                    first_name: request.first_name.trim().to_string(),
                    last_name: request.last_name.trim().to_string(),
                    email: request.email.trim().to_string(),
                    phone: request.phone,
                    department_id: request.department_id,
                    position_id: request.position_id,
                    hire_date: request.hire_date,
                    status: "active".to_string(),
                },
                account,
            )
            .await?;

        let credentials_emailed = deliver(
            self.notifier(),
            credentials_email(
                &employee.email,
                &employee.full_name(),
                &username,
                &password,
                &self.login_url,
            ),
        );
        if credentials_emailed {
            info!(employee_id = employee.id, %username, "Employee created, credentials emailed");
        } else {
            warn!(employee_id = employee.id, %username, "Employee created, credentials email failed");
        }

        Ok(EmployeeCreated {
            employee,
            username,
            credentials_emailed,
            temporary_password: (!credentials_emailed).then_some(password),
        })
    }

    /// HR or the employee themself.
    pub async fn get_employee(&self, caller: &AuthUser, id: u64) -> Result<Employee, AppError> {
        self.store
            .get_employee(id)
            .await?
            .filter(|employee| caller.can_access(employee.id))
            .ok_or(AppError::NotFound("Employee"))
    }

    pub async fn list_employees(
        &self,
        caller: &AuthUser,
        filter: EmployeeFilter,
    ) -> Result<Page<Employee>, AppError> {
        caller.require_hr()?;
        let page = PageRequest::new(filter.page, filter.per_page);
        let (employees, total) = self.store.list_employees(&filter, page).await?;
        Ok(Page::new(employees, page, total))
    }

    pub async fn update_employee(
        &self,
        caller: &AuthUser,
        id: u64,
        update: UpdateEmployee,
    ) -> Result<Employee, AppError> {
        caller.require_hr()?;
        let employee = self
            .store
            .update_employee(id, |employee| update.apply(employee))
            .await?;
        info!(employee_id = id, "Employee updated");
        Ok(employee)
    }
}
