use std::str::FromStr;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Set by the authenticating gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Trainer,
    Student,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "trainer" => Ok(Role::Trainer),
            "student" => Ok(Role::Student),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// The authenticated principal making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::Authentication("Missing user id".to_string()))?
            .parse::<Uuid>()
            .map_err(|_| AppError::Authentication("Malformed user id".to_string()))?;
        let role = header(USER_ROLE_HEADER)
            .ok_or_else(|| AppError::Authentication("Missing user role".to_string()))?
            .parse::<Role>()
            .map_err(AppError::Authentication)?;

        Ok(Self { user_id, role })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_trainer(&self) -> bool {
        self.role == Role::Trainer
    }

    pub fn is(&self, user_id: Option<Uuid>) -> bool {
        user_id == Some(self.user_id)
    }

    /// Admins and trainers only.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if matches!(self.role, Role::Admin | Role::Trainer) {
            Ok(())
        } else {
            Err(AppError::Authorization("Only trainers or admins can do this.".to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Only admins can do this.".to_string()))
        }
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = Self::from_headers(&parts.headers)?;
        tracing::debug!(user_id = %actor.user_id, role = ?actor.role, "Request actor resolved");
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(user_id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(user_id).unwrap());
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        headers
    }

    #[test]
    fn parses_trusted_headers() {
        let id = Uuid::new_v4();
        let actor = Actor::from_headers(&headers(&id.to_string(), "Trainer")).unwrap();
        assert_eq!(actor, Actor { user_id: id, role: Role::Trainer });
        assert!(actor.is(Some(id)));
        assert!(!actor.is(None));
        assert!(actor.require_staff().is_ok());
        assert!(actor.require_admin().is_err());
    }

    #[test]
    fn rejects_missing_or_malformed_principals() {
        assert!(matches!(
            Actor::from_headers(&HeaderMap::new()),
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            Actor::from_headers(&headers("not-a-uuid", "admin")),
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            Actor::from_headers(&headers(&Uuid::new_v4().to_string(), "root")),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn students_are_not_staff() {
        let actor = Actor::from_headers(&headers(&Uuid::new_v4().to_string(), "student")).unwrap();
        assert!(actor.require_staff().is_err());
    }
}
