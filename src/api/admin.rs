use crate::middleware::require_staff;
use crate::services::{auth_service::Claims, stats_service::{self, LibraryStats}};
use crate::database::MongoDB;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "Admin",
    responses(
        (status = 200, description = "Dashboard counters", body = LibraryStats),
        (status = 403, description = "Staff only")
    ),
    security(("bearer_auth" = []))
)]
pub async fn dashboard_stats(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    match stats_service::dashboard_stats(&db).await {
        Ok(stats) => HttpResponse::Ok().json(json!({
            "success": true,
            "stats": stats
        })),
        Err(e) => {
            log::error!("❌ Failed to compute stats: {}", e);
            e.error_response()
        }
    }
}
