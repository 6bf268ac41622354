use crate::config::AppConfig;
use crate::middleware::{require_staff, require_super_admin};
use crate::models::{BlacklistRequest, UpdateRoleRequest, UserResponse};
use crate::services::{auth_service::Claims, user_service};
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/auth/users",
    tag = "Users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 403, description = "Staff only")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    match user_service::list_users(&db).await {
        Ok(users) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": users.len(),
            "users": users
        })),
        Err(e) => {
            log::error!("❌ Failed to list users: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/auth/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 409, description = "User still has active borrows")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let target = match parse_object_id(&path, "user") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("🗑️ DELETE /auth/users/{} by {}", target, user.email);

    match user_service::delete_user(&db, &config.upload_dir, &user, &target).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "User deleted successfully"
        })),
        Err(e) => {
            log::warn!("❌ Failed to delete user {}: {}", target, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/auth/users/{id}/role",
    tag = "Users",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 403, description = "Super admin only")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: web::Json<UpdateRoleRequest>,
) -> HttpResponse {
    if let Err(e) = require_super_admin(&user) {
        return e.error_response();
    }
    let target = match parse_object_id(&path, "user") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("👤 PUT /auth/users/{}/role -> {}", target, request.role.as_str());

    match user_service::update_user_role(&db, &user, &target, request.role).await {
        Ok(updated) => HttpResponse::Ok().json(json!({
            "success": true,
            "user": updated
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/auth/users/{id}/blacklist",
    tag = "Users",
    params(("id" = String, Path, description = "User ID")),
    request_body = BlacklistRequest,
    responses(
        (status = 200, description = "Blacklist flag updated", body = UserResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn toggle_blacklist(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: Option<web::Json<BlacklistRequest>>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let target = match parse_object_id(&path, "user") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let value = request.and_then(|r| r.blacklisted);

    match user_service::set_blacklist(&db, &user, &target, value).await {
        Ok(updated) => {
            log::info!("🚫 User {} blacklisted: {}", target, updated.is_blacklisted);
            HttpResponse::Ok().json(json!({
                "success": true,
                "user": updated
            }))
        }
        Err(e) => e.error_response(),
    }
}
