use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const BOOKS: &str = "books";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub enum CategoryType {
    #[default]
    Islamic,
    History,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Language {
    Arabic,
    #[default]
    Amharic,
    English,
    Other,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Arabic => "Arabic",
            Language::Amharic => "Amharic",
            Language::English => "English",
            Language::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Category {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CategoryType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Copies {
    #[serde(default)]
    pub hard_copy: i32,
    #[serde(default)]
    pub e_book: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub user: ObjectId,
    pub text: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub user: ObjectId,
    pub value: i32,
}

/// Catalogue entry (stored in MongoDB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub category: Category,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Unique when present; never stored as null so the sparse index skips it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default)]
    pub copies: Copies,
    /// Copies on the shelf; `0 <= available <= copies.hard_copy`.
    pub available: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Book {
    /// Mean rating rounded to one decimal, 0 when unrated.
    pub fn average_rating(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        let total: i32 = self.ratings.iter().map(|r| r.value).sum();
        let mean = f64::from(total) / self.ratings.len() as f64;
        (mean * 10.0).round() / 10.0
    }

    pub fn copies_out(&self) -> i32 {
        self.copies.hard_copy - self.available
    }
}

/// Request to create a book
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub image: Option<String>,
    pub category: Category,
    pub language: Option<Language>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub copies: Option<Copies>,
    pub available: Option<i32>,
    pub description: Option<String>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub category: Option<Category>,
    pub language: Option<Language>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub copies: Option<Copies>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub language: Option<Language>,
    pub available_only: Option<bool>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RatingRequest {
    pub value: i32,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CommentResponse {
    pub user: String,
    pub text: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct BookResponse {
    pub id: String,
    pub title: String,
    pub author: String,
    pub image: Option<String>,
    pub category: Category,
    pub language: Language,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub copies: Copies,
    pub available: i32,
    pub description: Option<String>,
    pub comments: Vec<CommentResponse>,
    pub average_rating: f64,
    pub rating_count: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        let average_rating = book.average_rating();
        BookResponse {
            id: hex_id(&book.id),
            average_rating,
            rating_count: book.ratings.len(),
            comments: book
                .comments
                .into_iter()
                .map(|c| CommentResponse {
                    user: c.user.to_hex(),
                    text: c.text,
                    created_at: c.created_at,
                })
                .collect(),
            title: book.title,
            author: book.author,
            image: book.image,
            category: book.category,
            language: book.language,
            publisher: book.publisher,
            year: book.year,
            isbn: book.isbn,
            copies: book.copies,
            available: book.available,
            description: book.description,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with_ratings(values: &[i32]) -> Book {
        Book {
            id: Some(ObjectId::new()),
            title: "Riyad as-Salihin".into(),
            author: "Imam an-Nawawi".into(),
            image: None,
            category: Category { name: "Hadith".into(), kind: CategoryType::Islamic },
            language: Language::Arabic,
            publisher: None,
            year: Some(1270),
            isbn: None,
            copies: Copies { hard_copy: 4, e_book: false },
            available: 3,
            description: None,
            comments: vec![],
            ratings: values
                .iter()
                .map(|v| Rating { user: ObjectId::new(), value: *v })
                .collect(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(book_with_ratings(&[]).average_rating(), 0.0);
        assert_eq!(book_with_ratings(&[5, 4, 4]).average_rating(), 4.3);
        assert_eq!(book_with_ratings(&[1, 2]).average_rating(), 1.5);
    }

    #[test]
    fn test_copies_out() {
        assert_eq!(book_with_ratings(&[]).copies_out(), 1);
    }

    #[test]
    fn test_category_type_defaults_to_islamic() {
        let category: Category = serde_json::from_str(r#"{"name":"Fiqh"}"#).unwrap();
        assert_eq!(category.kind, CategoryType::Islamic);

        let category: Category = serde_json::from_str(r#"{"name":"Wars","type":"History"}"#).unwrap();
        assert_eq!(category.kind, CategoryType::History);
    }

    #[test]
    fn test_response_shape() {
        let json = serde_json::to_value(BookResponse::from(book_with_ratings(&[3]))).unwrap();
        assert_eq!(json["category"]["type"], "Islamic");
        assert_eq!(json["average_rating"], 3.0);
        assert_eq!(json["rating_count"], 1);
        assert!(json.get("ratings").is_none());
    }
}
