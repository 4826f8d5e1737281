use crate::config::Config;
use crate::error::AppError;
use crate::{
    model::role::Role,
    models::{Claims, TokenType},
};
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};
use jsonwebtoken::decode;
use jsonwebtoken::{DecodingKey, Validation};

/// Identity of the caller, handed explicitly to every service operation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Already resolved by auth_middleware on the protected scope.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(
                    actix_web::error::ErrorInternalServerError("Config missing"),
                ));
            }
        };

        let data = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(d) => d,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };
        if data.claims.token_type != TokenType::Access {
            return ready(Err(ErrorUnauthorized("Access token required")));
        }

        match AuthUser::from_claims(data.claims) {
            Some(user) => ready(Ok(user)),
            None => ready(Err(ErrorUnauthorized("Invalid role"))),
        }
    }
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Option<Self> {
        let role = Role::from_id(claims.role)?;
        Some(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
        })
    }

    pub fn is_hr(&self) -> bool {
        self.role == Role::Hr
    }

    pub fn require_hr(&self) -> Result<(), AppError> {
        if self.is_hr() {
            Ok(())
        } else {
            Err(AppError::forbidden("HR only"))
        }
    }

    /// The caller's own employee id; accounts without one cannot clock in
    /// or apply for leave.
    pub fn require_employee(&self) -> Result<u64, AppError> {
        self.employee_id
            .ok_or_else(|| AppError::forbidden("This account is not linked to an employee record"))
    }

    /// HR sees everyone, employees only themselves.
    pub fn can_access(&self, employee_id: u64) -> bool {
        self.is_hr() || self.employee_id == Some(employee_id)
    }

    /// Narrows an optional employee filter to what the caller may see.
    pub fn scope_employee(&self, requested: Option<u64>) -> Result<Option<u64>, AppError> {
        if self.is_hr() {
            Ok(requested)
        } else {
            self.require_employee().map(Some)
        }
    }
}

#[cfg(test)]
impl AuthUser {
    pub fn hr(user_id: u64) -> Self {
        AuthUser {
            user_id,
            username: format!("hr{user_id}"),
            role: Role::Hr,
            employee_id: None,
        }
    }

    pub fn employee(user_id: u64, employee_id: u64) -> Self {
        AuthUser {
            user_id,
            username: format!("user{user_id}"),
            role: Role::Employee,
            employee_id: Some(employee_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employees_are_scoped_to_themselves() {
        let employee = AuthUser::employee(10, 5);
        assert_eq!(employee.scope_employee(Some(9)).unwrap(), Some(5));
        assert_eq!(employee.scope_employee(None).unwrap(), Some(5));
        assert!(employee.can_access(5));
        assert!(!employee.can_access(9));
        assert!(matches!(employee.require_hr(), Err(AppError::Forbidden(_))));

        let hr = AuthUser::hr(1);
        assert_eq!(hr.scope_employee(Some(9)).unwrap(), Some(9));
        assert_eq!(hr.scope_employee(None).unwrap(), None);
        assert!(matches!(hr.require_employee(), Err(AppError::Forbidden(_))));
    }
}
