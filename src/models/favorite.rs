use crate::models::book::BookResponse;
use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const FAVORITES: &str = "favorites";

/// (user, book) pair, unique per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub book: ObjectId,
    pub created_at: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct FavoriteRequest {
    pub book_id: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FavoriteResponse {
    pub id: String,
    pub user: String,
    pub book_id: String,
    /// None when the book was deleted after being favorited.
    pub book: Option<BookResponse>,
    pub created_at: i64,
}

impl FavoriteResponse {
    pub fn new(favorite: Favorite, book: Option<BookResponse>) -> Self {
        FavoriteResponse {
            id: hex_id(&favorite.id),
            user: favorite.user.to_hex(),
            book_id: favorite.book.to_hex(),
            book,
            created_at: favorite.created_at,
        }
    }
}
