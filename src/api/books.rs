use crate::middleware::require_staff;
use crate::models::{
    BookQuery, BookResponse, CommentRequest, CreateBookRequest, RatingRequest, UpdateBookRequest,
};
use crate::services::{auth_service::Claims, book_service};
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/books",
    tag = "Books",
    params(
        ("search" = Option<String>, Query, description = "Matches title, author or ISBN"),
        ("category" = Option<String>, Query, description = "Category name or type"),
        ("language" = Option<String>, Query, description = "Arabic, Amharic, English or Other"),
        ("available_only" = Option<bool>, Query, description = "Only books with a free copy")
    ),
    responses((status = 200, description = "Matching books", body = [BookResponse]))
)]
pub async fn list_books(db: web::Data<MongoDB>, query: web::Query<BookQuery>) -> HttpResponse {
    match book_service::list_books(&db, &query).await {
        Ok(books) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": books.len(),
            "books": books
        })),
        Err(e) => {
            log::error!("❌ Failed to list books: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book", body = BookResponse),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let book_id = match parse_object_id(&path, "book") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match book_service::get_book(&db, &book_id).await {
        Ok(book) => HttpResponse::Ok().json(json!({
            "success": true,
            "book": book
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/books",
    tag = "Books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 409, description = "ISBN already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_book(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<CreateBookRequest>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    log::info!("📚 POST /books - {}", request.title);

    match book_service::add_book(&db, request.into_inner()).await {
        Ok(book) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Book added successfully",
            "book": book
        })),
        Err(e) => {
            log::warn!("❌ Failed to add book: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/books/multiple",
    tag = "Books",
    request_body = Vec<CreateBookRequest>,
    responses(
        (status = 201, description = "Books created", body = [BookResponse]),
        (status = 400, description = "One of the books is invalid")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_multiple_books(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<Vec<CreateBookRequest>>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }

    log::info!("📚 POST /books/multiple - {} books", request.len());

    match book_service::add_multiple_books(&db, request.into_inner()).await {
        Ok(books) => HttpResponse::Created().json(json!({
            "success": true,
            "message": format!("{} books added successfully", books.len()),
            "books": books
        })),
        Err(e) => {
            log::warn!("❌ Bulk insert failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Book ID")),
    request_body = UpdateBookRequest,
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 409, description = "Copies changed concurrently")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_book(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: web::Json<UpdateBookRequest>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let book_id = match parse_object_id(&path, "book") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match book_service::update_book(&db, &book_id, request.into_inner()).await {
        Ok(book) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Book updated successfully",
            "book": book
        })),
        Err(e) => {
            log::warn!("❌ Failed to update book {}: {}", book_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book deleted"),
        (status = 409, description = "Copies are still borrowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_book(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = require_staff(&user) {
        return e.error_response();
    }
    let book_id = match parse_object_id(&path, "book") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    log::info!("🗑️ DELETE /books/{}", book_id);

    match book_service::delete_book(&db, &book_id).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Book deleted successfully"
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/books/{id}/comments",
    tag = "Books",
    params(("id" = String, Path, description = "Book ID")),
    request_body = CommentRequest,
    responses((status = 200, description = "Comment added", body = BookResponse)),
    security(("bearer_auth" = []))
)]
pub async fn add_comment(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: web::Json<CommentRequest>,
) -> HttpResponse {
    let ids = parse_object_id(&path, "book").and_then(|book| Ok((book, user.user_id()?)));
    let (book_id, user_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return e.error_response(),
    };

    match book_service::add_comment(&db, &book_id, &user_id, &request.text).await {
        Ok(book) => HttpResponse::Ok().json(json!({
            "success": true,
            "book": book
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/books/{id}/ratings",
    tag = "Books",
    params(("id" = String, Path, description = "Book ID")),
    request_body = RatingRequest,
    responses(
        (status = 200, description = "Rating stored", body = BookResponse),
        (status = 400, description = "Rating outside 1..5")
    ),
    security(("bearer_auth" = []))
)]
pub async fn rate_book(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    request: web::Json<RatingRequest>,
) -> HttpResponse {
    let ids = parse_object_id(&path, "book").and_then(|book| Ok((book, user.user_id()?)));
    let (book_id, user_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return e.error_response(),
    };

    match book_service::rate_book(&db, &book_id, &user_id, request.value).await {
        Ok(book) => HttpResponse::Ok().json(json!({
            "success": true,
            "book": book
        })),
        Err(e) => e.error_response(),
    }
}
