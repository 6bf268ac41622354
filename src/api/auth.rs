use crate::config::AppConfig;
use crate::middleware::auth::bearer_token;
use crate::services::auth_service::{
    self, AuthResponse, Claims, LoginRequest, RefreshTokenRequest, RegisterRequest, TokenPair,
};
use crate::{database::MongoDB, models::UserResponse, utils::AppError};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Invalid request or user already exists")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RegisterRequest>,
) -> HttpResponse {
    let email = request.email.as_deref().unwrap_or("N/A");
    log::info!("📝 POST /auth/register - email: {}", email);

    match auth_service::register(&db, &config.jwt, &request).await {
        Ok(response) => HttpResponse::Created().json(response),
        Err(e) => {
            log::warn!("❌ Registration failed: {} - {}", email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Unknown email or wrong password"),
        (status = 403, description = "Account blacklisted")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> HttpResponse {
    log::info!("🔐 POST /auth/login - email: {}", request.email);

    match auth_service::login(&db, &config.jwt, &request).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", request.email);
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::warn!("❌ Login failed: {} - {}", request.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 403, description = "Refresh token invalid, expired or already rotated")
    )
)]
pub async fn refresh_token(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RefreshTokenRequest>,
) -> HttpResponse {
    log::info!("🔄 POST /auth/refresh");

    match auth_service::refresh(&db, &config.jwt, &request).await {
        Ok(tokens) => HttpResponse::Ok().json(json!({
            "success": true,
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token
        })),
        Err(e) => {
            log::warn!("❌ Token refresh failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Refresh token revoked")),
    security(("bearer_auth" = []))
)]
pub async fn logout(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    log::info!("👋 POST /auth/logout - {}", user.email);

    let user_id = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match auth_service::logout(&db, &user_id).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Logged out successfully"
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn profile(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    let user_id = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match auth_service::get_profile(&db, &user_id).await {
        Ok(profile) => HttpResponse::Ok().json(json!({
            "success": true,
            "user": profile
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    tag = "Auth",
    responses(
        (status = 200, description = "Token is valid"),
        (status = 401, description = "Invalid or expired token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify_token(req: HttpRequest, config: web::Data<AppConfig>) -> HttpResponse {
    log::info!("✓ GET /auth/verify");

    let token = match bearer_token(req.headers()) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing authorization token".to_string()).error_response()
        }
    };

    match auth_service::verify_token(token, &config.jwt) {
        Ok(claims) => HttpResponse::Ok().json(json!({
            "success": true,
            "valid": true,
            "user_id": claims.sub,
            "email": claims.email,
            "role": claims.role,
            "expires_at": claims.exp
        })),
        Err(e) => {
            log::warn!("❌ Invalid token: {}", e);
            AppError::Unauthorized("Invalid or expired token".to_string()).error_response()
        }
    }
}
