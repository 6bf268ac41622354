use crate::{
    database::MongoDB,
    models::{Book, BookResponse, Favorite, FavoriteResponse, BOOKS, FAVORITES},
    services::book_service,
    utils::{error::is_duplicate_key, time::now_ts, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use std::collections::HashMap;

pub async fn add_favorite(db: &MongoDB, user_id: &ObjectId, book_id: &ObjectId) -> Result<FavoriteResponse, AppError> {
    let book = book_service::find_book(db, book_id).await?;

    let mut favorite = Favorite {
        id: None,
        user: *user_id,
        book: *book_id,
        created_at: now_ts(),
    };

    let result = db
        .collection::<Favorite>(FAVORITES)
        .insert_one(&favorite)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::InvalidRequest("Book already in favorites".to_string())
            } else {
                AppError::from(e)
            }
        })?;
    favorite.id = result.inserted_id.as_object_id();

    Ok(FavoriteResponse::new(favorite, Some(book.into())))
}

pub async fn remove_favorite(db: &MongoDB, user_id: &ObjectId, book_id: &ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<Favorite>(FAVORITES)
        .delete_one(doc! { "user": user_id, "book": book_id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Book is not in favorites".to_string()));
    }
    Ok(())
}

/// Newest first, each with its book embedded.
pub async fn list_favorites(db: &MongoDB, user_id: &ObjectId) -> Result<Vec<FavoriteResponse>, AppError> {
    let favorites: Vec<Favorite> = db
        .collection::<Favorite>(FAVORITES)
        .find(doc! { "user": user_id })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    let book_ids: Vec<ObjectId> = favorites.iter().map(|f| f.book).collect();
    let books: HashMap<ObjectId, BookResponse> = if book_ids.is_empty() {
        HashMap::new()
    } else {
        let books: Vec<Book> = db
            .collection::<Book>(BOOKS)
            .find(doc! { "_id": { "$in": book_ids } })
            .await?
            .try_collect()
            .await?;
        books
            .into_iter()
            .filter_map(|b| b.id.map(|id| (id, BookResponse::from(b))))
            .collect()
    };

    Ok(favorites
        .into_iter()
        .map(|f| {
            let book = books.get(&f.book).cloned();
            FavoriteResponse::new(f, book)
        })
        .collect())
}

/// Only the owner can read a favorite.
pub async fn get_favorite(db: &MongoDB, user_id: &ObjectId, favorite_id: &ObjectId) -> Result<FavoriteResponse, AppError> {
    let favorite = db
        .collection::<Favorite>(FAVORITES)
        .find_one(doc! { "_id": favorite_id, "user": user_id })
        .await?
        .ok_or_else(|| AppError::not_found("Favorite"))?;

    let book = db
        .collection::<Book>(BOOKS)
        .find_one(doc! { "_id": favorite.book })
        .await?
        .map(BookResponse::from);

    Ok(FavoriteResponse::new(favorite, book))
}
