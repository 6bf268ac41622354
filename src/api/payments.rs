use crate::config::AppConfig;
use crate::middleware::require_staff;
use crate::models::{PaymentResponse, UpdatePaymentStatusRequest};
use crate::services::payment_service::{self, SCREENSHOT_FIELD};
use crate::services::upload_service::{read_upload_form, UploadTarget};
use crate::services::auth_service::Claims;
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

/// Multipart: `amount`, optional `method`, `kind`, `reference`, `borrow_id`, `description` and the `screenshot` file.
#[utoipa::path(
    post,
    path = "/api/payments",
    tag = "Payments",
    responses(
        (status = 201, description = "Payment submitted for review", body = PaymentResponse),
        (status = 400, description = "Invalid amount or missing screenshot")
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_payment(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    payload: Multipart,
) -> HttpResponse {
    log::info!("💳 POST /payments - {}", user.email);

    let student = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let form = match read_upload_form(payload, &config, UploadTarget::Payments, &[SCREENSHOT_FIELD]).await {
        Ok(form) => form,
        Err(e) => return e.error_response(),
    };

    match payment_service::submit_payment(&db, &student, &form).await {
        Ok(payment) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Payment submitted successfully",
            "payment": payment
        })),
        Err(e) => {
            log::warn!("❌ Payment submission failed for {}: {}", user.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/payments/my",
    tag = "Payments",
    responses((status = 200, description = "Payments of the current user", body = [PaymentResponse])),
    security(("bearer_auth" = []))
)]
pub async fn my_payments(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    let student = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match payment_service::my_payments(&db, &student).await {
        Ok(payments) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": payments.len(),
            "payments": payments
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/payments",
    tag = "Payments",
    responses((status = 200, description = "All payments with student info", body = [PaymentResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_payments(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    match payment_service::list_payments(&db).await {
        Ok(payments) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": payments.len(),
            "payments": payments
        })),
        Err(e) => {
            log::error!("❌ Failed to list payments: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/payments/{id}",
    tag = "Payments",
    params(("id" = String, Path, description = "Payment ID")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment reviewed", body = PaymentResponse),
        (status = 400, description = "Payment already reviewed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_payment_status(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: web::Json<UpdatePaymentStatusRequest>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let payment_id = match parse_object_id(&path, "payment") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("💳 PUT /payments/{} -> {}", payment_id, request.status.as_str());

    match payment_service::update_payment_status(&db, &payment_id, request.status).await {
        Ok(payment) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!("Payment {}", payment.status.as_str()),
            "payment": payment
        })),
        Err(e) => e.error_response(),
    }
}
