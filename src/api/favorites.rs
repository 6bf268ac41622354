use crate::models::{FavoriteRequest, FavoriteResponse};
use crate::services::{auth_service::Claims, favorite_service};
use crate::{database::MongoDB, utils::ids::parse_object_id};
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/api/favorites",
    tag = "Favorites",
    request_body = FavoriteRequest,
    responses(
        (status = 201, description = "Book added to favorites", body = FavoriteResponse),
        (status = 400, description = "Book already in favorites")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_favorite(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    request: web::Json<FavoriteRequest>,
) -> HttpResponse {
    let ids = user
        .user_id()
        .and_then(|u| Ok((u, parse_object_id(&request.book_id, "book")?)));
    let (user_id, book_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return e.error_response(),
    };

    match favorite_service::add_favorite(&db, &user_id, &book_id).await {
        Ok(favorite) => HttpResponse::Created().json(json!({
            "success": true,
            "message": "Book added to favorites",
            "favorite": favorite
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/favorites",
    tag = "Favorites",
    responses((status = 200, description = "Favorites with book details", body = [FavoriteResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_favorites(user: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    let user_id = match user.user_id() {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match favorite_service::list_favorites(&db, &user_id).await {
        Ok(favorites) => HttpResponse::Ok().json(json!({
            "success": true,
            "count": favorites.len(),
            "favorites": favorites
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/favorites/{book_id}",
    tag = "Favorites",
    params(("book_id" = String, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Removed from favorites"),
        (status = 404, description = "Favorite not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_favorite(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    let ids = user
        .user_id()
        .and_then(|u| Ok((u, parse_object_id(&path, "book")?)));
    let (user_id, book_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return e.error_response(),
    };

    match favorite_service::remove_favorite(&db, &user_id, &book_id).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Book removed from favorites"
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/favorites/item/{id}",
    tag = "Favorites",
    params(("id" = String, Path, description = "Favorite ID")),
    responses((status = 200, description = "Favorite", body = FavoriteResponse)),
    security(("bearer_auth" = []))
)]
pub async fn get_favorite(
    user: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> HttpResponse {
    let ids = user
        .user_id()
        .and_then(|u| Ok((u, parse_object_id(&path, "favorite")?)));
    let (user_id, favorite_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return e.error_response(),
    };

    match favorite_service::get_favorite(&db, &user_id, &favorite_id).await {
        Ok(favorite) => HttpResponse::Ok().json(json!({
            "success": true,
            "favorite": favorite
        })),
        Err(e) => e.error_response(),
    }
}
