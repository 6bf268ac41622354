use crate::middleware::require_staff;
use crate::models::{Settings, UpdateSettingsRequest};
use crate::services::{auth_service::Claims, settings_service};
use crate::database::MongoDB;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "Settings",
    responses((status = 200, description = "Library settings, defaults when none stored", body = Settings))
)]
pub async fn get_settings(db: web::Data<MongoDB>) -> HttpResponse {
    match settings_service::get_settings(&db).await {
        Ok(settings) => HttpResponse::Ok().json(json!({
            "success": true,
            "settings": settings
        })),
        Err(e) => {
            log::error!("❌ Failed to load settings: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/settings",
    tag = "Settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = Settings),
        (status = 400, description = "Out of range value")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<UpdateSettingsRequest>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    log::info!("⚙️ PUT /settings by {}", user.email);

    match settings_service::update_settings(&db, &request).await {
        Ok(settings) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Settings updated successfully",
            "settings": settings
        })),
        Err(e) => {
            log::warn!("❌ Settings update rejected: {}", e);
            e.error_response()
        }
    }
}
