use crate::config::AppConfig;
use crate::middleware::require_staff;
use crate::models::{BorrowQuery, BorrowRequest, BorrowResponse, RejectRequest};
use crate::services::borrow_service::{self, PAYMENT_IMAGE_FIELD};
use crate::services::upload_service::{read_upload_form, UploadTarget};
use crate::services::{auth_service::Claims, membership_service};
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/api/borrow",
    tag = "Borrows",
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowResponse),
        (status = 400, description = "Pay-per-borrow enabled, use /api/borrow/request"),
        (status = 403, description = "No active membership"),
        (status = 409, description = "Borrow limit reached, no copy available or already borrowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn borrow_book(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<BorrowRequest>,
) -> HttpResponse {
    log::info!("📖 POST /borrow - {} book {}", user.email, request.book_id);

    match borrow_service::borrow_book(&db, &user, &request).await {
        Ok(borrow) => {
            log::info!("✅ Borrow {} created", borrow.id);
            HttpResponse::Created().json(json!({
                "success": true,
                "message": "Book borrowed successfully",
                "borrow": borrow
            }))
        }
        Err(e) => {
            log::warn!("❌ Borrow failed for {}: {}", user.email, e);
            e.error_response()
        }
    }
}

/// Multipart: `book_id`, optional `duration`, `payment_reference` and the `payment_image` file.
#[utoipa::path(
    post,
    path = "/api/borrow/request",
    tag = "Borrows",
    responses(
        (status = 201, description = "Borrow request awaiting approval", body = BorrowResponse),
        (status = 400, description = "Missing book_id, bad duration, or no payment image while pay-per-borrow is enabled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn request_borrow(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    payload: Multipart,
) -> HttpResponse {
    log::info!("📖 POST /borrow/request - {}", user.email);

    // Refuse before anything is written to disk
    if let Err(e) = membership_service::ensure_active_membership(&db, &user).await {
        return e.error_response();
    }

    let form = match read_upload_form(payload, &config, UploadTarget::Borrows, &[PAYMENT_IMAGE_FIELD]).await {
        Ok(form) => form,
        Err(e) => return e.error_response(),
    };

    match borrow_service::request_borrow(&db, &user, &form).await {
        Ok(borrow) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Borrow request submitted, awaiting approval",
            "borrow": borrow
        })),
        Err(e) => {
            log::warn!("❌ Borrow request failed for {}: {}", user.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/borrow/return/{id}",
    tag = "Borrows",
    params(("id" = String, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Book returned, with a late-fee payment when overdue"),
        (status = 400, description = "Borrow is not active")
    ),
    security(("bearer_auth" = []))
)]
pub async fn return_book(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    let borrow_id = match parse_object_id(&path, "borrow") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("📗 PUT /borrow/return/{} - {}", borrow_id, user.email);

    match borrow_service::return_book(&db, &user, &borrow_id).await {
        Ok(outcome) => {
            let message = if outcome.borrow.late_days > 0 {
                format!(
                    "Book returned {} day(s) late, late fee: {:.2}",
                    outcome.borrow.late_days, outcome.borrow.late_fee
                )
            } else {
                "Book returned successfully".to_string()
            };
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": message,
                "borrow": outcome.borrow,
                "late_fee_payment": outcome.late_fee_payment
            }))
        }
        Err(e) => {
            log::warn!("❌ Return failed for {}: {}", borrow_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/borrow/my",
    tag = "Borrows",
    responses((status = 200, description = "Borrows of the current user", body = [BorrowResponse])),
    security(("bearer_auth" = []))
)]
pub async fn my_borrows(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    let student = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match borrow_service::my_borrows(&db, &student).await {
        Ok(borrows) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": borrows.len(),
            "borrows": borrows
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/borrow",
    tag = "Borrows",
    params(("status" = Option<String>, Query, description = "pending, borrowed, returned, overdue or rejected")),
    responses((status = 200, description = "All borrows", body = [BorrowResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_borrows(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    query: web::Query<BorrowQuery>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    match borrow_service::list_borrows(&db, query.status).await {
        Ok(borrows) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": borrows.len(),
            "borrows": borrows
        })),
        Err(e) => {
            log::error!("❌ Failed to list borrows: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/borrow/{id}",
    tag = "Borrows",
    params(("id" = String, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Borrow", body = BorrowResponse),
        (status = 403, description = "Not the borrower")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_borrow(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    let borrow_id = match parse_object_id(&path, "borrow") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match borrow_service::get_borrow(&db, &user, &borrow_id).await {
        Ok(borrow) => HttpResponse::Ok().json(json!({
            "success": true,
            "borrow": borrow
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/borrow/{id}/approve",
    tag = "Borrows",
    params(("id" = String, Path, description = "Borrow ID")),
    responses(
        (status = 200, description = "Borrow approved", body = BorrowResponse),
        (status = 400, description = "Borrow is not pending")
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_borrow(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let borrow_id = match parse_object_id(&path, "borrow") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("✅ PUT /borrow/{}/approve by {}", borrow_id, user.email);

    match borrow_service::approve_borrow(&db, &borrow_id).await {
        Ok(borrow) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Borrow approved",
            "borrow": borrow
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/borrow/{id}/reject",
    tag = "Borrows",
    params(("id" = String, Path, description = "Borrow ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Borrow rejected, slot and copy released", body = BorrowResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_borrow(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: Option<web::Json<RejectRequest>>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let borrow_id = match parse_object_id(&path, "borrow") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let reason = request.and_then(|r| r.into_inner().reason);

    log::info!("⛔ PUT /borrow/{}/reject by {}", borrow_id, user.email);

    match borrow_service::reject_borrow(&db, &borrow_id, reason.as_deref()).await {
        Ok(borrow) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Borrow rejected",
            "borrow": borrow
        })),
        Err(e) => e.error_response(),
    }
}
