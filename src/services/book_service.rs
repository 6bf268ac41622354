use crate::{
    database::MongoDB,
    models::{
        Book, BookQuery, BookResponse, Comment, CreateBookRequest, Rating, UpdateBookRequest, BOOKS,
        FAVORITES,
    },
    utils::{error::is_duplicate_key, time::now_ts, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Bson, Document, Regex};
use mongodb::options::ReturnDocument;

const MAX_COMMENT_LEN: usize = 1000;

fn isbn_conflict(e: mongodb::error::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict("A book with this ISBN already exists".to_string())
    } else {
        AppError::from(e)
    }
}

fn contains_ci(value: &str) -> Bson {
    Bson::RegularExpression(Regex {
        pattern: regex::escape(value),
        options: "i".to_string(),
    })
}

pub fn build_filter(query: &BookQuery) -> Document {
    let mut filter = doc! {};

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filter.insert(
            "$or",
            vec![
                doc! { "title": contains_ci(search) },
                doc! { "author": contains_ci(search) },
                doc! { "isbn": contains_ci(search) },
            ],
        );
    }

    if let Some(category) = query.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let exact = Bson::RegularExpression(Regex {
            pattern: format!("^{}$", regex::escape(category)),
            options: "i".to_string(),
        });
        let by_category = vec![
            doc! { "category.name": exact.clone() },
            doc! { "category.type": exact },
        ];
        // Keep a search $or intact by nesting both under $and
        match filter.remove("$or") {
            Some(search) => {
                filter.insert("$and", vec![doc! { "$or": search }, doc! { "$or": by_category }]);
            }
            None => {
                filter.insert("$or", by_category);
            }
        }
    }

    if let Some(language) = query.language {
        filter.insert("language", language.as_str());
    }

    if query.available_only.unwrap_or(false) {
        filter.insert("available", doc! { "$gt": 0 });
    }

    filter
}

fn non_blank(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validates a create request into a storable book.
pub fn build_book(request: CreateBookRequest, now: i64) -> Result<Book, AppError> {
    let title = non_blank(&request.title, "Title")?;
    let author = non_blank(&request.author, "Author")?;

    let mut category = request.category;
    category.name = non_blank(&category.name, "Category name")?;

    let copies = request.copies.unwrap_or_default();
    if copies.hard_copy < 0 {
        return Err(AppError::InvalidRequest("Hard copy count cannot be negative".to_string()));
    }

    let available = request.available.unwrap_or(copies.hard_copy);
    if available < 0 || available > copies.hard_copy {
        return Err(AppError::InvalidRequest(format!(
            "Available copies must be between 0 and {}",
            copies.hard_copy
        )));
    }

    Ok(Book {
        id: None,
        title,
        author,
        image: clean_optional(request.image),
        category,
        language: request.language.unwrap_or_default(),
        publisher: clean_optional(request.publisher),
        year: request.year,
        isbn: clean_optional(request.isbn),
        copies,
        available,
        description: clean_optional(request.description),
        comments: Vec::new(),
        ratings: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_book(db: &MongoDB, book_id: &ObjectId) -> Result<Book, AppError> {
    db.collection::<Book>(BOOKS)
        .find_one(doc! { "_id": book_id })
        .await?
        .ok_or_else(|| AppError::not_found("Book"))
}

pub async fn list_books(db: &MongoDB, query: &BookQuery) -> Result<Vec<BookResponse>, AppError> {
    let books: Vec<Book> = db
        .collection::<Book>(BOOKS)
        .find(build_filter(query))
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(books.into_iter().map(BookResponse::from).collect())
}

pub async fn get_book(db: &MongoDB, book_id: &ObjectId) -> Result<BookResponse, AppError> {
    find_book(db, book_id).await.map(BookResponse::from)
}

pub async fn add_book(db: &MongoDB, request: CreateBookRequest) -> Result<BookResponse, AppError> {
    let mut book = build_book(request, now_ts())?;

    let result = db
        .collection::<Book>(BOOKS)
        .insert_one(&book)
        .await
        .map_err(isbn_conflict)?;
    book.id = result.inserted_id.as_object_id();

    log::info!("📚 Book added: {} by {}", book.title, book.author);

    Ok(book.into())
}

/// Every item is validated before anything is written.
pub async fn add_multiple_books(db: &MongoDB, requests: Vec<CreateBookRequest>) -> Result<Vec<BookResponse>, AppError> {
    if requests.is_empty() {
        return Err(AppError::InvalidRequest("Provide at least one book".to_string()));
    }

    let now = now_ts();
    let mut books = Vec::with_capacity(requests.len());
    for (index, request) in requests.into_iter().enumerate() {
        let book = build_book(request, now)
            .map_err(|e| AppError::InvalidRequest(format!("Book #{}: {}", index + 1, e.message())))?;
        books.push(book);
    }

    let result = db
        .collection::<Book>(BOOKS)
        .insert_many(&books)
        .await
        .map_err(isbn_conflict)?;

    for (index, book) in books.iter_mut().enumerate() {
        book.id = result.inserted_ids.get(&index).and_then(|id| id.as_object_id());
    }

    log::info!("📚 {} books added", books.len());

    Ok(books.into_iter().map(BookResponse::from).collect())
}

/// `$set` document for a partial update plus the shift to apply to `available`.
fn update_changes(book: &Book, request: UpdateBookRequest) -> Result<(Document, i32), AppError> {
    let mut set = doc! { "updated_at": now_ts() };

    if let Some(title) = request.title {
        set.insert("title", non_blank(&title, "Title")?);
    }
    if let Some(author) = request.author {
        set.insert("author", non_blank(&author, "Author")?);
    }
    if let Some(mut category) = request.category {
        category.name = non_blank(&category.name, "Category name")?;
        set.insert("category", to_bson(&category)?);
    }
    if let Some(language) = request.language {
        set.insert("language", language.as_str());
    }
    if let Some(year) = request.year {
        set.insert("year", year);
    }

    let optional_text = [
        ("image", request.image),
        ("publisher", request.publisher),
        ("isbn", request.isbn),
        ("description", request.description),
    ];
    for (name, value) in optional_text {
        if let Some(value) = value {
            // Blank clears the field; isbn must then be absent, not null, for the sparse index
            match clean_optional(Some(value)) {
                Some(v) => {
                    set.insert(name, v);
                }
                None => {
                    set.insert(format!("__unset.{}", name), "");
                }
            }
        }
    }

    let mut delta = 0;
    if let Some(copies) = request.copies {
        if copies.hard_copy < 0 {
            return Err(AppError::InvalidRequest("Hard copy count cannot be negative".to_string()));
        }
        delta = copies.hard_copy - book.copies.hard_copy;
        if book.available + delta < 0 {
            return Err(AppError::InvalidRequest(format!(
                "Cannot reduce copies below the {} currently borrowed",
                book.copies_out()
            )));
        }
        set.insert("copies", to_bson(&copies)?);
    }

    Ok((set, delta))
}

fn split_unsets(set: Document) -> (Document, Document) {
    let mut kept = Document::new();
    let mut unset = Document::new();
    for (key, value) in set {
        match key.strip_prefix("__unset.") {
            Some(field) => {
                unset.insert(field, "");
            }
            None => {
                kept.insert(key, value);
            }
        }
    }
    (kept, unset)
}

pub async fn update_book(db: &MongoDB, book_id: &ObjectId, request: UpdateBookRequest) -> Result<BookResponse, AppError> {
    let book = find_book(db, book_id).await?;
    let (set, delta) = update_changes(&book, request)?;
    let (set, unset) = split_unsets(set);

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }

    // Guard against borrows or returns that happened since the read
    let mut filter = doc! { "_id": book_id };
    if delta != 0 {
        update.insert("$inc", doc! { "available": delta });
        filter.insert("copies.hard_copy", book.copies.hard_copy);
        if delta < 0 {
            filter.insert("available", doc! { "$gte": -delta });
        }
    }

    let updated = db
        .collection::<Book>(BOOKS)
        .find_one_and_update(filter, update)
        .return_document(ReturnDocument::After)
        .await
        .map_err(isbn_conflict)?
        .ok_or_else(|| {
            AppError::Conflict("Book copies changed while updating, please retry".to_string())
        })?;

    log::info!("📚 Book updated: {}", updated.title);

    Ok(updated.into())
}

pub async fn delete_book(db: &MongoDB, book_id: &ObjectId) -> Result<(), AppError> {
    let book = find_book(db, book_id).await?;
    if book.copies_out() > 0 {
        return Err(AppError::Conflict(format!(
            "Cannot delete a book with {} copies currently borrowed",
            book.copies_out()
        )));
    }

    let result = db
        .collection::<Book>(BOOKS)
        .delete_one(doc! {
            "_id": book_id,
            "$expr": { "$eq": ["$available", "$copies.hard_copy"] }
        })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::Conflict("Cannot delete a book with copies currently borrowed".to_string()));
    }

    db.collection::<Document>(FAVORITES)
        .delete_many(doc! { "book": book_id })
        .await?;

    log::info!("🗑️  Book deleted: {}", book.title);

    Ok(())
}

pub async fn add_comment(db: &MongoDB, book_id: &ObjectId, user_id: &ObjectId, text: &str) -> Result<BookResponse, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::InvalidRequest("Comment cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Comment cannot exceed {} characters",
            MAX_COMMENT_LEN
        )));
    }

    let now = now_ts();
    let comment = Comment { user: *user_id, text: text.to_string(), created_at: now };

    db.collection::<Book>(BOOKS)
        .find_one_and_update(
            doc! { "_id": book_id },
            doc! { "$push": { "comments": to_bson(&comment)? }, "$set": { "updated_at": now } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .map(BookResponse::from)
        .ok_or_else(|| AppError::not_found("Book"))
}

/// A user's second rating replaces the first.
pub async fn rate_book(db: &MongoDB, book_id: &ObjectId, user_id: &ObjectId, value: i32) -> Result<BookResponse, AppError> {
    if !(1..=5).contains(&value) {
        return Err(AppError::InvalidRequest("Rating must be between 1 and 5".to_string()));
    }

    let collection = db.collection::<Book>(BOOKS);
    let now = now_ts();

    let replaced = collection
        .find_one_and_update(
            doc! { "_id": book_id, "ratings.user": user_id },
            doc! { "$set": { "ratings.$.value": value, "updated_at": now } },
        )
        .return_document(ReturnDocument::After)
        .await?;
    if let Some(book) = replaced {
        return Ok(book.into());
    }

    let rating = Rating { user: *user_id, value };
    collection
        .find_one_and_update(
            doc! { "_id": book_id, "ratings.user": { "$ne": user_id } },
            doc! { "$push": { "ratings": to_bson(&rating)? }, "$set": { "updated_at": now } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .map(BookResponse::from)
        .ok_or_else(|| AppError::not_found("Book"))
}
