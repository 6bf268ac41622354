use crate::database::MongoDB;
use crate::models::{Settings, SETTINGS};
use crate::utils::time::now_ts;
use mongodb::bson::doc;

/// Stores the default library settings when the collection is empty.
/// An existing document is never touched.
pub async fn seed_default_settings(db: &MongoDB) {
    let collection = db.collection::<Settings>(SETTINGS);

    let count = collection.count_documents(doc! {}).await.unwrap_or(0);
    if count > 0 {
        log::info!("⚙️  Settings: already stored, skipping seed");
        return;
    }

    let settings = Settings { updated_at: now_ts(), ..Settings::default() };

    match collection.insert_one(&settings).await {
        Ok(_) => {
            log::info!(
                "   ✅ Default settings stored (borrow limit {}, {} days per loan)",
                settings.max_borrow_limit,
                settings.borrow_duration_days
            );
        }
        Err(e) => {
            log::error!("   ❌ Failed to seed default settings: {}", e);
        }
    }
}
