// handlers/auth.rs - OTP login endpoints (public) and whoami (protected)

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{OtpError, OtpService};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

/// Login bodies are read leniently: a missing or non-string value is treated
/// as an unknown email or a wrong code rather than a malformed request.
#[derive(Debug, Default, Deserialize)]
pub struct OtpRequest {
    #[serde(default)]
    pub email: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtpVerification {
    #[serde(default)]
    pub email: Value,
    #[serde(default)]
    pub otp: Value,
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginBody {
    pub message: String,
    pub token: String,
    pub email: String,
}

/// POST /auth/request-otp - mail a one-time code to a known user
pub async fn request_otp(
    State(otp): State<Arc<OtpService>>,
    payload: Result<Json<OtpRequest>, JsonRejection>,
) -> ApiResult<MessageBody> {
    let Json(payload) = payload?;
    otp.request(text(&payload.email)).await?;

    Ok(ApiResponse::success(MessageBody {
        message: "OTP sent successfully".to_string(),
    }))
}

/// POST /auth/verify-otp - trade a correct code for a bearer token
pub async fn verify_otp(
    State(otp): State<Arc<OtpService>>,
    payload: Result<Json<OtpVerification>, JsonRejection>,
) -> ApiResult<LoginBody> {
    let Json(payload) = payload?;
    let code = payload.otp.as_str().ok_or(OtpError::InvalidOtp)?;
    let email = text(&payload.email);
    let token = otp.verify(email, code)?;

    Ok(ApiResponse::success(LoginBody {
        message: "Login successful".to_string(),
        token,
        email: crate::auth::normalize_email(email),
    }))
}

/// GET /auth/whoami - identity behind the presented token
pub async fn whoami(Extension(user): Extension<AuthUser>) -> ApiResult<serde_json::Value> {
    Ok(ApiResponse::success(serde_json::json!({ "email": user.email })))
}
