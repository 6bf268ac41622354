use crate::middleware::require_staff;
use crate::models::{BookReviewResponse, CreateBookReviewRequest};
use crate::services::{auth_service::Claims, book_review_service};
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/book-reviews",
    tag = "Book Reviews",
    responses((status = 200, description = "Review events by date", body = [BookReviewResponse]))
)]
pub async fn list_events(db: web::Data<MongoDB>) -> HttpResponse {
    match book_review_service::list_events(&db).await {
        Ok(events) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": events.len(),
            "events": events
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/book-reviews",
    tag = "Book Reviews",
    request_body = CreateBookReviewRequest,
    responses(
        (status = 201, description = "Event created", body = BookReviewResponse),
        (status = 400, description = "Missing field or bad date")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_event(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<CreateBookReviewRequest>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    log::info!("🎤 POST /book-reviews - {}", request.book_title);

    match book_review_service::create_event(&db, request.into_inner()).await {
        Ok(event) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Event created successfully",
            "event": event
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/book-reviews/{id}",
    tag = "Book Reviews",
    params(("id" = String, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event deleted"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_event(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let event_id = match parse_object_id(&path, "event") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match book_review_service::delete_event(&db, &event_id).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Event deleted successfully"
        })),
        Err(e) => e.error_response(),
    }
}
