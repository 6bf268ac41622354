use crate::config::AppConfig;
use crate::middleware::require_staff;
use crate::models::{ApproveMembershipRequest, MembershipResponse, RejectRequest};
use crate::services::email_service::Mailer;
use crate::services::membership_service::{self, DeletedFiles, ID_CARD_FIELD, PAYMENT_IMAGE_FIELD};
use crate::services::upload_service::{read_upload_form, UploadTarget};
use crate::services::auth_service::Claims;
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

/// Multipart application: `payment_amount`, `payment_method`, optional
/// `payment_reference`, plus the `id_card` and `payment_image` files.
#[utoipa::path(
    post,
    path = "/api/membership/request",
    tag = "Membership",
    responses(
        (status = 201, description = "Application stored, verification email sent", body = MembershipResponse),
        (status = 400, description = "Missing field or file, insufficient payment, or already pending/active")
    ),
    security(("bearer_auth" = []))
)]
pub async fn request_membership(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    mailer: web::Data<dyn Mailer>,
    payload: Multipart,
) -> HttpResponse {
    log::info!("🪪 POST /membership/request - {}", user.email);

    let user_id = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let form = match read_upload_form(
        payload,
        &config,
        UploadTarget::Memberships,
        &[ID_CARD_FIELD, PAYMENT_IMAGE_FIELD],
    )
    .await
    {
        Ok(form) => form,
        Err(e) => return e.error_response(),
    };

    match membership_service::request_membership(&db, mailer.get_ref(), &config, &user_id, &form).await {
        Ok(outcome) => {
            let message = if outcome.email_sent {
                "Membership request submitted. Please check your email to verify your address."
            } else {
                "Membership request submitted, but the verification email could not be sent."
            };
            HttpResponse::Created().json(json!({
                "success": true,
                "message": message,
                "email_sent": outcome.email_sent,
                "membership": outcome.membership
            }))
        }
        Err(e) => {
            log::warn!("❌ Membership request failed for {}: {}", user.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/membership/verify-email/{token}",
    tag = "Membership",
    params(("token" = String, Path, description = "Verification token from the email")),
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Token invalid or expired")
    )
)]
pub async fn verify_email(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    log::info!("📧 GET /membership/verify-email");

    match membership_service::verify_email(&db, &path).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Email verified successfully. Your membership request is awaiting approval."
        })),
        Err(e) => {
            log::warn!("❌ Email verification failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/membership/status",
    tag = "Membership",
    responses(
        (status = 200, description = "Membership of the current user", body = MembershipResponse),
        (status = 404, description = "No membership yet")
    ),
    security(("bearer_auth" = []))
)]
pub async fn membership_status(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    let user_id = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match membership_service::membership_status(&db, &user_id).await {
        Ok(membership) => HttpResponse::Ok().json(json!({
            "success": true,
            "membership": membership
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/membership/admin/all",
    tag = "Membership",
    responses((status = 200, description = "All memberships with applicant info", body = [MembershipResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_memberships(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    match membership_service::list_memberships(&db).await {
        Ok(memberships) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": memberships.len(),
            "memberships": memberships
        })),
        Err(e) => {
            log::error!("❌ Failed to list memberships: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/membership/admin/approve/{id}",
    tag = "Membership",
    params(("id" = String, Path, description = "Membership ID")),
    request_body = ApproveMembershipRequest,
    responses(
        (status = 200, description = "Membership approved", body = MembershipResponse),
        (status = 400, description = "Not pending or email not verified")
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_membership(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    path: web::Path<String>,
    request: Option<web::Json<ApproveMembershipRequest>>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let membership_id = match parse_object_id(&path, "membership") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let months = request.and_then(|r| r.expiry_months);

    log::info!("✅ PUT /membership/admin/approve/{} by {}", membership_id, user.email);

    match membership_service::approve_membership(&db, mailer.get_ref(), &membership_id, months).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Membership approved",
            "email_sent": outcome.email_sent,
            "membership": outcome.membership
        })),
        Err(e) => {
            log::warn!("❌ Approval failed for {}: {}", membership_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/membership/admin/reject/{id}",
    tag = "Membership",
    params(("id" = String, Path, description = "Membership ID")),
    request_body = RejectRequest,
    responses((status = 200, description = "Membership rejected", body = MembershipResponse)),
    security(("bearer_auth" = []))
)]
pub async fn reject_membership(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    path: web::Path<String>,
    request: Option<web::Json<RejectRequest>>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let membership_id = match parse_object_id(&path, "membership") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let reason = request.and_then(|r| r.into_inner().reason);

    log::info!("⛔ PUT /membership/admin/reject/{} by {}", membership_id, user.email);

    match membership_service::reject_membership(&db, mailer.get_ref(), &membership_id, reason.as_deref()).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Membership rejected",
            "email_sent": outcome.email_sent,
            "membership": outcome.membership
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/membership/admin/delete/{id}",
    tag = "Membership",
    params(("id" = String, Path, description = "Membership ID")),
    responses(
        (status = 200, description = "Membership and its images deleted", body = DeletedFiles),
        (status = 404, description = "Membership not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_membership(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let membership_id = match parse_object_id(&path, "membership") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("🗑️ DELETE /membership/admin/delete/{}", membership_id);

    match membership_service::delete_membership(&db, &config.upload_dir, &membership_id).await {
        Ok(deleted_files) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Membership deleted successfully",
            "deleted_files": deleted_files
        })),
        Err(e) => e.error_response(),
    }
}
