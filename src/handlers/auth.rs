use axum::{Json, extract::State};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};

use crate::AppState;
use crate::entities::{otp_tokens, prelude::*, users};
use crate::models::auth::{SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOtpResponse};
use crate::models::error::{ApiError, bad_request, internal_error, unauthorized};
use crate::services::util::{generate_otp, is_valid_email};

const OTP_TTL_MINUTES: i64 = 10;

pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(bad_request("Please enter a valid email address"));
    }

    let code = generate_otp();
    let expires_at = (Utc::now() + Duration::minutes(OTP_TTL_MINUTES)).fixed_offset();

    // Latest-wins: a fresh code invalidates any outstanding unused ones
    OtpTokens::delete_many()
        .filter(otp_tokens::Column::Email.eq(&email))
        .filter(otp_tokens::Column::Used.eq(false))
        .exec(&state.db)
        .await
        .map_err(internal_error)?;

    let existing_user = Users::find()
        .filter(users::Column::Email.eq(&email))
        .one(&state.db)
        .await
        .map_err(internal_error)?;

    let token = otp_tokens::ActiveModel {
        email: Set(email.clone()),
        code: Set(code.clone()),
        user_id: Set(existing_user.map(|u| u.id)),
        expires_at: Set(expires_at),
        used: Set(false),
        created_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    };

    token.insert(&state.db).await.map_err(internal_error)?;

    if !state.mailer.send_otp_email(&email, &code).await {
        tracing::warn!("OTP email delivery failed for {}", email);
    }

    Ok(Json(SendOtpResponse {
        success: true,
        message: "OTP sent successfully".to_string(),
    }))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let now = Utc::now().fixed_offset();

    let token = OtpTokens::find()
        .filter(otp_tokens::Column::Email.eq(&email))
        .filter(otp_tokens::Column::Code.eq(payload.otp.trim()))
        .filter(otp_tokens::Column::Used.eq(false))
        .filter(otp_tokens::Column::ExpiresAt.gt(now))
        .order_by_desc(otp_tokens::Column::CreatedAt)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| unauthorized("Invalid or expired OTP"))?;

    // Single-use: flip before issuing any credentials
    let mut used_token = token.into_active_model();
    used_token.used = Set(true);
    used_token.update(&state.db).await.map_err(internal_error)?;

    let user = match Users::find()
        .filter(users::Column::Email.eq(&email))
        .one(&state.db)
        .await
        .map_err(internal_error)?
    {
        Some(user) => user,
        None => {
            let new_user = users::ActiveModel {
                email: Set(email.clone()),
                role: Set(users::UserRole::Customer),
                email_verified_at: Set(Some(now)),
                created_at: Set(now),
                ..Default::default()
            };
            new_user.insert(&state.db).await.map_err(internal_error)?
        }
    };

    let token = state.sessions.issue(&user).map_err(|e| {
        tracing::error!("Failed to sign session token: {}", e);
        internal_error(e)
    })?;

    Ok(Json(VerifyOtpResponse {
        token,
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_state;
    use axum::http::StatusCode;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn otp_token(used: bool) -> otp_tokens::Model {
        otp_tokens::Model {
            id: 1,
            email: "user@example.com".to_string(),
            code: "123456".to_string(),
            user_id: Some(7),
            expires_at: (Utc::now() + Duration::minutes(5)).fixed_offset(),
            used,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn existing_user() -> users::Model {
        users::Model {
            id: 7,
            email: "user@example.com".to_string(),
            name: None,
            phone: None,
            role: users::UserRole::Customer,
            email_verified_at: Some(Utc::now().fixed_offset()),
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn test_otp_token_verifies_at_most_once() {
        // First verify: token found, flipped to used, user loaded.
        // Second verify: the used=false filter matches nothing.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![otp_token(false)], vec![otp_token(true)]])
            .append_query_results([vec![existing_user()]])
            .append_query_results([Vec::<otp_tokens::Model>::new()])
            .into_connection();

        let state = test_state(db);
        let request = VerifyOtpRequest {
            email: "user@example.com".to_string(),
            otp: "123456".to_string(),
        };

        let first = verify_otp(State(state.clone()), Json(request.clone()))
            .await
            .unwrap();
        assert!(!first.0.token.is_empty());
        assert_eq!(first.0.user.id, 7);

        let second = verify_otp(State(state), Json(request)).await.unwrap_err();
        assert_eq!(second.0, StatusCode::UNAUTHORIZED);
    }
}
