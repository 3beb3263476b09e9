use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use crate::model::attendance::{MarkedBy, UserRef};
use crate::model::role::Role;
use crate::model::schedule::Scheduler;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data};
use futures::future::{Ready, ready};

/// Caller identity resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user acts on behalf of an agency
    pub agency_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already resolved by auth_middleware
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
                ))
            }
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        let role = match Role::from_id(claims.role) {
            Some(r) => r,
            None => return ready(Err(ErrorUnauthorized("Invalid role"))),
        };

        ready(Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            agency_id: claims.agency_id,
        }))
    }
}

impl AuthUser {
    pub fn require_agency_or_admin(&self) -> Result<(), AppError> {
        if matches!(self.role, Role::Admin | Role::Agency) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Agency/Admin only".to_string()))
        }
    }

    /// Admins manage every scheduler, agencies only their own.
    pub fn can_manage(&self, scheduler: &Scheduler) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Agency => self.agency_id == Some(scheduler.owner_agency_id),
            Role::Student => false,
        }
    }

    pub fn require_manager_of(&self, scheduler: &Scheduler) -> Result<(), AppError> {
        if self.can_manage(scheduler) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only the owning agency or an admin may do this".to_string(),
            ))
        }
    }

    /// Returns true if the user is a student
    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.user_id,
            name: self.username.clone(),
        }
    }

    pub fn marked_by(&self) -> MarkedBy {
        match self.role {
            Role::Admin => MarkedBy::Admin,
            Role::Agency => MarkedBy::Agency,
            Role::Student => MarkedBy::Own,
        }
    }
}
