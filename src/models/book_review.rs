use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const BOOK_REVIEWS: &str = "book_reviews";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Audience {
    Male,
    Female,
    #[default]
    Both,
}

/// Book review event announced by the library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReview {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub book_title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub date_time: i64,
    pub location: String,
    #[serde(default)]
    pub gender: Audience,
    /// e.g. "#1 Book Review Name"
    pub event_number: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateBookReviewRequest {
    pub book_title: String,
    pub author: String,
    pub image: Option<String>,
    /// RFC 3339 timestamp
    pub date_time: String,
    pub location: String,
    pub gender: Option<Audience>,
    pub event_number: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct BookReviewResponse {
    pub id: String,
    pub book_title: String,
    pub author: String,
    pub image: Option<String>,
    pub date_time: i64,
    pub location: String,
    pub gender: Audience,
    pub event_number: String,
    pub created_at: i64,
}

impl From<BookReview> for BookReviewResponse {
    fn from(r: BookReview) -> Self {
        BookReviewResponse {
            id: hex_id(&r.id),
            book_title: r.book_title,
            author: r.author,
            image: r.image,
            date_time: r.date_time,
            location: r.location,
            gender: r.gender,
            event_number: r.event_number,
            created_at: r.created_at,
        }
    }
}
