use crate::models::user::UserSummary;
use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const FEEDBACK: &str = "feedback";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub message: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct FeedbackRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FeedbackResponse {
    pub id: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserSummary>,
    pub message: String,
    pub created_at: i64,
}

impl FeedbackResponse {
    pub fn new(feedback: Feedback, user_info: Option<UserSummary>) -> Self {
        FeedbackResponse {
            id: hex_id(&feedback.id),
            user: feedback.user.to_hex(),
            user_info,
            message: feedback.message,
            created_at: feedback.created_at,
        }
    }
}
