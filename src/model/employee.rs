use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "phone": "+8801712345678",
        "department_id": 10,
        "position_id": 3,
        "hire_date": "2024-01-01",
        "status": "active"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "john.doe@company.com")]
    pub email: String,

    #[schema(example = "+8801712345678", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = 10)]
    pub department_id: u64,

    #[schema(example = 3)]
    pub position_id: u64,

    #[schema(
        example = "2024-01-01",
        value_type = String,
        format = "date"
    )]
    pub hire_date: NaiveDate,

    #[schema(example = "active")]
    pub status: String,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "John")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "john@email.com", format = "email")]
    pub email: String,
    pub phone: Option<String>,
    #[schema(example = 1)]
    pub department_id: u64,
    #[schema(example = 2)]
    pub position_id: u64,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: NaiveDate,
    /// Login name of the account created alongside the employee.
    #[schema(example = "john.doe")]
    pub username: String,
    /// Generated when omitted.
    #[schema(min_length = 8)]
    pub temporary_password: Option<String>,
}

impl CreateEmployee {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.employee_code.trim().is_empty() || self.first_name.trim().is_empty() {
            return Err(AppError::validation("Employee code and first name are required"));
        }
        if !self.email.contains('@') {
            return Err(AppError::validation("A valid email is required"));
        }
        if self.username.trim().is_empty() {
            return Err(AppError::validation("Username is required"));
        }
        if self.temporary_password.as_ref().is_some_and(|p| p.len() < 8) {
            return Err(AppError::validation("Password must be at least 8 characters"));
        }
        Ok(())
    }
}

/// Login account created with an employee. Always an EMPLOYEE role that
/// must change its password on first login.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub role_id: u8,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateEmployee {
    pub employee_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub status: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
}

impl UpdateEmployee {
    pub fn apply(self, employee: &mut Employee) -> Result<(), AppError> {
        if let Some(email) = self.email {
            if !email.contains('@') {
                return Err(AppError::validation("A valid email is required"));
            }
            employee.email = email;
        }
        if let Some(code) = self.employee_code {
            employee.employee_code = code;
        }
        if let Some(first_name) = self.first_name {
            employee.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            employee.last_name = last_name;
        }
        if let Some(phone) = self.phone {
            employee.phone = Some(phone);
        }
        if let Some(department_id) = self.department_id {
            employee.department_id = department_id;
        }
        if let Some(position_id) = self.position_id {
            employee.position_id = position_id;
        }
        if let Some(status) = self.status {
            employee.status = status;
        }
        if let Some(hire_date) = self.hire_date {
            employee.hire_date = hire_date;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct EmployeeFilter {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub status: Option<String>,
    /// Search by name or email
    pub search: Option<String>,
}

impl EmployeeFilter {
    pub fn matches(&self, employee: &Employee) -> bool {
        let search_hit = self.search.as_deref().is_none_or(|needle| {
            let needle = needle.to_lowercase();
            [&employee.first_name, &employee.last_name, &employee.email]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        });
        self.department_id.is_none_or(|d| employee.department_id == d)
            && self.position_id.is_none_or(|p| employee.position_id == p)
            && self.status.as_deref().is_none_or(|s| employee.status == s)
            && search_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn john() -> Employee {
        Employee {
            id: 1,
            employee_code: "EMP-001".into(),
            first_name: "John".into(),
            last_name: "Doe".into(),
            email: "john.doe@company.com".into(),
            phone: None,
            department_id: 10,
            position_id: 3,
            hire_date: "2024-01-01".parse().unwrap(),
            status: "active".into(),
        }
    }

    #[test]
    fn update_touches_only_given_fields() {
        let mut employee = john();
        UpdateEmployee {
            last_name: Some("Smith".into()),
            department_id: Some(11),
            ..Default::default()
        }
        .apply(&mut employee)
        .unwrap();
        assert_eq!(employee.full_name(), "John Smith");
        assert_eq!(employee.department_id, 11);
        assert_eq!(employee.email, "john.doe@company.com");
    }

    #[test]
    fn update_rejects_bad_email() {
        let mut employee = john();
        let err = UpdateEmployee {
            email: Some("nope".into()),
            ..Default::default()
        }
        .apply(&mut employee)
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn filter_search_is_case_insensitive() {
        let filter = EmployeeFilter {
            search: Some("DOE".into()),
            ..Default::default()
        };
        assert!(filter.matches(&john()));
        let filter = EmployeeFilter {
            department_id: Some(99),
            ..Default::default()
        };
        assert!(!filter.matches(&john()));
    }
}
