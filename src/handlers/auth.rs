use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::ServiceError;

const USER_HEADER: &str = "x-user-id";
const ANONYMOUS_HEADER: &str = "x-anonymous-id";

/// Authenticated customer id, taken from the identity header the
/// gateway injects after verifying the session. Missing or malformed
/// ids reject the request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_user(parts)?.map(AuthUser).ok_or(ServiceError::Unauthorized)
    }
}

/// Identity for routes anonymous visitors may also call: an
/// authenticated user id, an anonymous cart id, or both (at login).
#[derive(Debug, Clone, Default)]
pub struct CartIdentity {
    pub user_id: Option<i64>,
    pub anonymous_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for CartIdentity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parse_user(parts)?;
        let anonymous_id = parts
            .headers
            .get(ANONYMOUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        if user_id.is_none() && anonymous_id.is_none() {
            return Err(ServiceError::Unauthorized);
        }
        Ok(Self {
            user_id,
            anonymous_id,
        })
    }
}

fn parse_user(parts: &Parts) -> Result<Option<i64>, ServiceError> {
    match parts.headers.get(USER_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .map(Some)
            .ok_or(ServiceError::Unauthorized),
    }
}
