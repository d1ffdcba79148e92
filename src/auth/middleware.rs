// Request extractors resolving the caller's identity from the bearer token

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use crate::auth::{error::AuthError, token::TokenService};

/// Caller identity for routes that require a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Caller identity for routes open to guests. A missing or invalid token
/// means an anonymous caller, not a rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl MaybeUser {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|user| user.user_id.as_str())
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let tokens = Arc::<TokenService>::from_ref(state);
        let claims = tokens.validate(token)?;

        Ok(AuthenticatedUser { user_id: claims.sub })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AuthError::MissingToken) => Ok(MaybeUser(None)),
            Err(e) => {
                debug!("Ignoring unusable token on guest-capable route: {}", e);
                Ok(MaybeUser(None))
            }
        }
    }
}
