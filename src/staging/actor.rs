//! Request actor
//!
//! Identity is issued upstream; the gateway forwards it in `x-guard-user` and
//! `x-guard-role` headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

use super::capability::{Capability, CapabilitySet, Role};
use crate::error::AppError;

pub const USER_HEADER: &str = "x-guard-user";
pub const ROLE_HEADER: &str = "x-guard-role";

/// The authenticated caller of a staging operation
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    #[serde(skip)]
    pub capabilities: CapabilitySet,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            capabilities: role.capabilities(),
        }
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.capabilities.has(cap)
    }

    /// Fail with `Unauthorized` unless the actor holds `cap`
    pub fn require(&self, cap: Capability) -> Result<(), AppError> {
        if self.can(cap) {
            Ok(())
        } else {
            tracing::warn!(
                user = %self.user_id,
                role = self.role.as_str(),
                capability = cap.as_str(),
                "capability check failed"
            );
            Err(AppError::Unauthorized(format!(
                "{} lacks capability: {}",
                self.user_id,
                cap.as_str()
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {} header", USER_HEADER)))?;

        let role = match parts.headers.get(ROLE_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| AppError::BadRequest(format!("invalid {} header", ROLE_HEADER)))?
                .parse::<Role>()
                .map_err(AppError::BadRequest)?,
            None => Role::Annotator,
        };

        Ok(Actor::new(user_id, role))
    }
}
