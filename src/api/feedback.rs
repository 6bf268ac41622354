use crate::middleware::require_staff;
use crate::models::{FeedbackRequest, FeedbackResponse};
use crate::services::{auth_service::Claims, feedback_service};
use crate::database::MongoDB;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/api/feedback",
    tag = "Feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 201, description = "Feedback stored", body = FeedbackResponse),
        (status = 400, description = "Empty or too long message")
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_feedback(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<FeedbackRequest>,
) -> HttpResponse {
    let user_id = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match feedback_service::submit_feedback(&db, &user_id, &request.message).await {
        Ok(feedback) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Thank you for your feedback",
            "feedback": feedback
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/feedback",
    tag = "Feedback",
    responses((status = 200, description = "All feedback, newest first", body = [FeedbackResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_feedback(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    match feedback_service::list_feedback(&db).await {
        Ok(feedback) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": feedback.len(),
            "feedback": feedback
        })),
        Err(e) => e.error_response(),
    }
}
