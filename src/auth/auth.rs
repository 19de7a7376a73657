use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::role::Role;
use crate::models::{Claims, TokenType};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
    /// Store the user or till device belongs to
    pub location_id: Option<u64>,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> ApiResult<Self> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }
        let role = Role::from_id(claims.role)
            .ok_or_else(|| ApiError::Unauthorized("Invalid role".into()))?;
        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_id: claims.employee_id,
            location_id: claims.location_id,
        })
    }
}

fn authenticate(req: &HttpRequest) -> ApiResult<AuthUser> {
    // Already resolved by the auth middleware
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing token".into()))?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| ApiError::Internal("Config missing".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".into()))?;

    AuthUser::from_claims(claims)
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl AuthUser {
    fn require(&self, allowed: &[Role], message: &str) -> ApiResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(message.to_string()))
        }
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        self.require(&[Role::Admin], "Admin only")
    }

    pub fn require_hr_or_admin(&self) -> ApiResult<()> {
        self.require(&[Role::Admin, Role::Hr], "HR/Admin only")
    }

    /// Store managers and admins: stock control, reports, close of day.
    pub fn require_manager(&self) -> ApiResult<()> {
        self.require(&[Role::Admin, Role::Manager], "Manager/Admin only")
    }

    /// Anyone allowed to ring up sales.
    pub fn require_pos(&self) -> ApiResult<()> {
        self.require(&[Role::Admin, Role::Manager, Role::Cashier], "POS staff only")
    }

    /// Registered tills pushing offline work, or staff doing it by hand.
    pub fn require_sync(&self) -> ApiResult<()> {
        self.require(
            &[Role::Admin, Role::Manager, Role::Cashier, Role::Device],
            "POS device or staff only",
        )
    }

    /// Sales/CRM is run by managers and admins.
    pub fn require_sales(&self) -> ApiResult<()> {
        self.require(&[Role::Admin, Role::Manager], "Sales staff only")
    }

    pub fn is_hr(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Hr)
    }

    /// Returns true if the user is an employee
    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }

    pub fn employee_id(&self) -> ApiResult<u64> {
        self.employee_id
            .ok_or_else(|| ApiError::Forbidden("No employee profile".into()))
    }

    /// HR may act for anyone; everybody else only for themselves.
    pub fn resolve_employee(&self, requested: Option<u64>) -> ApiResult<u64> {
        match requested {
            Some(id) if self.is_hr() => Ok(id),
            Some(id) if Some(id) == self.employee_id => Ok(id),
            Some(_) => Err(ApiError::Forbidden("HR/Admin only".into())),
            None => self.employee_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            employee_id,
            location_id: None,
        }
    }

    #[test]
    fn guards_follow_roles() {
        assert!(user(Role::Admin, None).require_admin().is_ok());
        assert!(user(Role::Hr, None).require_admin().is_err());
        assert!(user(Role::Hr, None).require_hr_or_admin().is_ok());
        assert!(user(Role::Cashier, None).require_pos().is_ok());
        assert!(user(Role::Cashier, None).require_manager().is_err());
        assert!(user(Role::Device, None).require_sync().is_ok());
        assert!(user(Role::Device, None).require_pos().is_err());
    }

    #[test]
    fn employees_act_only_for_themselves() {
        let me = user(Role::Employee, Some(4));
        assert_eq!(me.resolve_employee(None).unwrap(), 4);
        assert_eq!(me.resolve_employee(Some(4)).unwrap(), 4);
        assert!(me.resolve_employee(Some(5)).is_err());
        assert_eq!(user(Role::Hr, None).resolve_employee(Some(5)).unwrap(), 5);
        assert!(user(Role::Hr, None).resolve_employee(None).is_err());
    }
}
