use crate::{
    database::MongoDB,
    models::{Feedback, FeedbackResponse, FEEDBACK},
    services::user_service,
    utils::{time::now_ts, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};

const MAX_MESSAGE_LEN: usize = 2000;

pub fn validate_message(message: &str) -> Result<String, AppError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::InvalidRequest("Feedback message is required".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Feedback cannot exceed {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(message.to_string())
}

pub async fn submit_feedback(db: &MongoDB, user_id: &ObjectId, message: &str) -> Result<FeedbackResponse, AppError> {
    let mut feedback = Feedback {
        id: None,
        user: *user_id,
        message: validate_message(message)?,
        created_at: now_ts(),
    };

    let result = db.collection::<Feedback>(FEEDBACK).insert_one(&feedback).await?;
    feedback.id = result.inserted_id.as_object_id();

    log::info!("💬 Feedback received from {}", user_id.to_hex());

    Ok(FeedbackResponse::new(feedback, None))
}

pub async fn list_feedback(db: &MongoDB) -> Result<Vec<FeedbackResponse>, AppError> {
    let entries: Vec<Feedback> = db
        .collection::<Feedback>(FEEDBACK)
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    let ids: Vec<ObjectId> = entries.iter().map(|f| f.user).collect();
    let users = user_service::user_summaries(db, &ids).await?;

    Ok(entries
        .into_iter()
        .map(|f| {
            let user = users.get(&f.user).cloned();
            FeedbackResponse::new(f, user)
        })
        .collect())
}
