use crate::{
    database::MongoDB,
    models::{Settings, UpdateSettingsRequest, SETTINGS},
    utils::{time::now_ts, AppError},
};
use mongodb::bson::{doc, Document};

/// Stored settings, or the defaults when none were saved yet.
pub async fn get_settings(db: &MongoDB) -> Result<Settings, AppError> {
    let settings = db
        .collection::<Settings>(SETTINGS)
        .find_one(doc! {})
        .await?
        .unwrap_or_default();
    Ok(settings)
}

pub fn validate_update(request: &UpdateSettingsRequest) -> Result<(), AppError> {
    let non_negative = [
        ("membership_fee", request.membership_fee),
        ("late_fee_per_day", request.late_fee_per_day),
    ];
    for (name, value) in non_negative {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(AppError::InvalidRequest(format!("{} cannot be negative", name)));
            }
        }
    }

    let at_least_one = [
        ("max_borrow_limit", request.max_borrow_limit),
        ("borrow_duration_days", request.borrow_duration_days),
        ("membership_duration", request.membership_duration.map(|m| m as i32)),
    ];
    for (name, value) in at_least_one {
        if matches!(value, Some(v) if v < 1) {
            return Err(AppError::InvalidRequest(format!("{} must be at least 1", name)));
        }
    }

    if matches!(request.notify_before_days, Some(v) if v < 0) {
        return Err(AppError::InvalidRequest("notify_before_days cannot be negative".to_string()));
    }

    Ok(())
}

fn update_document(request: &UpdateSettingsRequest) -> Document {
    let mut set = doc! { "updated_at": now_ts() };

    let text_fields = [
        ("bank_name", &request.bank_name),
        ("account_number", &request.account_number),
        ("account_holder", &request.account_holder),
    ];
    for (name, value) in text_fields {
        if let Some(v) = value {
            set.insert(name, v.trim());
        }
    }

    if let Some(v) = request.membership_fee {
        set.insert("membership_fee", v);
    }
    if let Some(v) = request.membership_duration {
        set.insert("membership_duration", i64::from(v));
    }
    if let Some(v) = request.max_borrow_limit {
        set.insert("max_borrow_limit", v);
    }
    if let Some(v) = request.borrow_duration_days {
        set.insert("borrow_duration_days", v);
    }
    if let Some(v) = request.late_fee_per_day {
        set.insert("late_fee_per_day", v);
    }
    if let Some(v) = request.pay_per_borrow_enabled {
        set.insert("pay_per_borrow_enabled", v);
    }
    if let Some(v) = request.notify_before_days {
        set.insert("notify_before_days", v);
    }
    if let Some(v) = request.notifications_enabled {
        set.insert("notifications_enabled", v);
    }

    set
}

/// Partial upsert of the single settings document.
pub async fn update_settings(db: &MongoDB, request: &UpdateSettingsRequest) -> Result<Settings, AppError> {
    validate_update(request)?;

    let collection = db.collection::<Settings>(SETTINGS);
    let set = update_document(request);

    match collection.find_one(doc! {}).await? {
        Some(_) => {
            collection.update_one(doc! {}, doc! { "$set": set }).await?;
        }
        None => {
            // First save: start from the defaults so every field is stored
            let mut settings = Settings::default();
            settings.updated_at = now_ts();
            collection.insert_one(&settings).await?;
            collection.update_one(doc! {}, doc! { "$set": set }).await?;
        }
    }

    log::info!("⚙️  Settings updated");

    get_settings(db).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_update() {
        assert!(validate_update(&UpdateSettingsRequest::default()).is_ok());

        let ok = UpdateSettingsRequest {
            membership_fee: Some(150.0),
            max_borrow_limit: Some(5),
            notify_before_days: Some(0),
            ..Default::default()
        };
        assert!(validate_update(&ok).is_ok());

        let negative_fee = UpdateSettingsRequest { late_fee_per_day: Some(-1.0), ..Default::default() };
        assert_eq!(
            validate_update(&negative_fee).unwrap_err().message(),
            "late_fee_per_day cannot be negative"
        );

        let zero_limit = UpdateSettingsRequest { max_borrow_limit: Some(0), ..Default::default() };
        assert!(validate_update(&zero_limit).is_err());

        let zero_months = UpdateSettingsRequest { membership_duration: Some(0), ..Default::default() };
        assert!(validate_update(&zero_months).is_err());
    }

    #[test]
    fn test_update_document_only_sets_present_fields() {
        let request = UpdateSettingsRequest {
            bank_name: Some("  Awash Bank ".into()),
            pay_per_borrow_enabled: Some(true),
            membership_duration: Some(12),
            ..Default::default()
        };
        let set = update_document(&request);

        assert_eq!(set.get_str("bank_name").unwrap(), "Awash Bank");
        assert!(set.get_bool("pay_per_borrow_enabled").unwrap());
        assert_eq!(set.get_i64("membership_duration").unwrap(), 12);
        assert!(set.contains_key("updated_at"));
        assert!(!set.contains_key("max_borrow_limit"));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_update_settings_upserts() {
        let db = MongoDB::new("mongodb://localhost:27017/library_test").await.unwrap();
        let updated = update_settings(
            &db,
            &UpdateSettingsRequest { max_borrow_limit: Some(4), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(updated.max_borrow_limit, 4);
    }
}
