/// Authentication routes.
///
/// Thin HTTP shims over the protocol layer: request parsing, input
/// validation, and client-IP extraction happen here; everything with real
/// protocol logic lives in `crate::auth::protocol`.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthService;
use crate::email_client::EmailClient;
use crate::error::AppError;
use crate::storage::PgUserStore;
use crate::validators::{is_valid_email, is_valid_password};

/// The concrete service wired up in `startup::run`.
pub type LiveAuthService = AuthService<PgUserStore, EmailClient>;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Extract the client IP from the connection. The live request origin is
/// what gets recorded with the issued credentials.
fn client_ip(req: &HttpRequest) -> Result<String, AppError> {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .ok_or_else(|| AppError::MalformedRequest("client address unavailable".to_string()))
}

/// POST /auth/register
///
/// Register a new user and return their first access/refresh token pair.
///
/// # Errors
/// - 400: invalid email or password
/// - 409: email already registered
/// - 500: credential generation or storage failure
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    service: web::Data<LiveAuthService>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    is_valid_password(&form.password)?;
    let ip = client_ip(&req)?;

    let pair = service.register(&ip, &email, &form.password).await?;

    Ok(HttpResponse::Created().json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
    }))
}

/// POST /auth/refresh
///
/// Rotate a token pair. The old refresh token stops working the moment the
/// rotation persists; the old access tokens stop verifying because the
/// signing secret rotates with it.
///
/// # Errors
/// - 400: unparseable access token or refresh-token encoding
/// - 404: the token's claimed user does not exist
/// - 401: refresh token or access token failed verification
/// - 409: a concurrent refresh won the rotation race
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    service: web::Data<LiveAuthService>,
) -> Result<HttpResponse, AppError> {
    if form.access_token.is_empty() || form.refresh_token.is_empty() {
        return Err(AppError::MalformedRequest(
            "access_token and refresh_token are required".to_string(),
        ));
    }

    let ip = client_ip(&req)?;

    let pair = service
        .refresh(&form.access_token, &form.refresh_token, &ip)
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
    }))
}
