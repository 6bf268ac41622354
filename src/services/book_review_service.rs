use crate::{
    database::MongoDB,
    models::{BookReview, BookReviewResponse, CreateBookReviewRequest, BOOK_REVIEWS},
    utils::{time::{now_ts, parse_rfc3339}, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub fn build_event(request: CreateBookReviewRequest, now: i64) -> Result<BookReview, AppError> {
    let date_time = parse_rfc3339(&request.date_time).ok_or_else(|| {
        AppError::InvalidRequest("date_time must be an RFC 3339 timestamp".to_string())
    })?;

    Ok(BookReview {
        id: None,
        book_title: required(&request.book_title, "Book title")?,
        author: required(&request.author, "Author")?,
        image: request.image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()),
        date_time,
        location: required(&request.location, "Location")?,
        gender: request.gender.unwrap_or_default(),
        event_number: required(&request.event_number, "Event number")?,
        created_at: now,
    })
}

pub async fn list_events(db: &MongoDB) -> Result<Vec<BookReviewResponse>, AppError> {
    let events: Vec<BookReview> = db
        .collection::<BookReview>(BOOK_REVIEWS)
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(events.into_iter().map(BookReviewResponse::from).collect())
}

pub async fn create_event(db: &MongoDB, request: CreateBookReviewRequest) -> Result<BookReviewResponse, AppError> {
    let mut event = build_event(request, now_ts())?;

    let result = db.collection::<BookReview>(BOOK_REVIEWS).insert_one(&event).await?;
    event.id = result.inserted_id.as_object_id();

    log::info!("🗓️  Book review event created: {} ({})", event.event_number, event.book_title);

    Ok(event.into())
}

pub async fn delete_event(db: &MongoDB, event_id: &ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<BookReview>(BOOK_REVIEWS)
        .delete_one(doc! { "_id": event_id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::not_found("Event"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Audience;

    fn request(date_time: &str) -> CreateBookReviewRequest {
        CreateBookReviewRequest {
            book_title: "The Sealed Nectar".into(),
            author: "Safiur-Rahman Mubarakpuri".into(),
            image: None,
            date_time: date_time.into(),
            location: "Main hall".into(),
            gender: None,
            event_number: "#4 Book Review".into(),
        }
    }

    #[test]
    fn test_build_event() {
        let event = build_event(request("2026-11-02T14:00:00+03:00"), 5).unwrap();
        assert_eq!(event.date_time, 1_793_617_200);
        assert_eq!(event.gender, Audience::Both);
        assert_eq!(event.created_at, 5);
    }

    #[test]
    fn test_build_event_rejections() {
        assert!(build_event(request("next friday"), 0).is_err());

        let mut nameless = request("2026-11-02T14:00:00Z");
        nameless.location = " ".into();
        assert_eq!(build_event(nameless, 0).unwrap_err().message(), "Location is required");
    }
}
