use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::convert::Infallible;

use crate::AppState;
use crate::entities::users::UserRole;
use crate::models::error::{ApiError, forbidden, unauthorized};

pub mod address;
pub mod auth;
pub mod category;
pub mod checkout;
pub mod coupon;
pub mod order;
pub mod payment;
pub mod product;
pub mod shipping;

/// Authenticated caller, extracted from the `Authorization: Bearer` session
/// token issued by the OTP verify endpoint.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(forbidden("Admin access required"))
        }
    }
}

fn user_from_parts(parts: &Parts, state: &AppState) -> Option<CurrentUser> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    let claims = state.sessions.verify(token).ok()?;
    Some(CurrentUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
    })
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        user_from_parts(parts, state).ok_or_else(|| unauthorized("Unauthorized"))
    }
}

impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(user_from_parts(parts, state))
    }
}

/// State over a mock connection, for handler tests that never reach the
/// external services.
#[cfg(test)]
pub(crate) fn test_state(db: sea_orm::DatabaseConnection) -> AppState {
    use crate::services::{
        mailer::Mailer, razorpay::RazorpayClient, session::SessionKeys,
        shiprocket::ShiprocketClient,
    };

    AppState {
        db,
        razorpay: RazorpayClient::new("rzp_test_key".to_string(), "secret".to_string(), None),
        shiprocket: ShiprocketClient::new(
            String::new(),
            String::new(),
            "110001".to_string(),
            None,
        ),
        mailer: Mailer::new(None),
        sessions: SessionKeys::new(b"test-secret"),
    }
}

#[cfg(test)]
pub(crate) fn admin_user() -> CurrentUser {
    CurrentUser {
        id: 1,
        email: "admin@example.com".to_string(),
        role: UserRole::Admin,
    }
}
