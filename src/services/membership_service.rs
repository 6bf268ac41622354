use crate::{
    config::AppConfig,
    database::MongoDB,
    models::{
        Membership, MembershipResponse, MembershipStatus, PaymentMethod, User, MEMBERSHIPS, USERS,
        VERIFICATION_TOKEN_TTL_HOURS,
    },
    services::{
        auth_service::Claims,
        email_service::{self, Mailer},
        settings_service,
        upload_service::{delete_file_if_exists, UploadForm},
        user_service,
    },
    utils::{error::is_duplicate_key, ids::random_hex_token, time::{add_months, now_ts}, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use serde::Serialize;
use std::path::Path;

pub const ID_CARD_FIELD: &str = "id_card";
pub const PAYMENT_IMAGE_FIELD: &str = "payment_image";
pub const DEFAULT_REJECTION_REASON: &str = "No specific reason provided";
const MAX_EXPIRY_MONTHS: u32 = 120;

#[derive(Debug, Serialize)]
pub struct MembershipOutcome {
    pub membership: MembershipResponse,
    pub email_sent: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeletedFiles {
    pub id_card_image: bool,
    pub payment_image: bool,
}

/// Payment fields of an application, already validated.
#[derive(Debug, PartialEq)]
pub struct PaymentDetails {
    pub amount: f64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

pub fn parse_payment_details(form: &UploadForm, minimum: f64) -> Result<PaymentDetails, AppError> {
    let (amount, method) = match (form.text("payment_amount"), form.text("payment_method")) {
        (Some(amount), Some(method)) => (amount, method),
        _ => {
            return Err(AppError::InvalidRequest(
                "Payment amount and method are required".to_string(),
            ))
        }
    };

    let amount: f64 = amount
        .parse()
        .ok()
        .filter(|a: &f64| a.is_finite())
        .ok_or_else(|| AppError::InvalidRequest("Payment amount must be a number".to_string()))?;
    if amount < minimum || amount <= 0.0 {
        return Err(AppError::InvalidRequest(format!(
            "Payment amount must be at least {}",
            minimum
        )));
    }

    let method = PaymentMethod::parse(method).ok_or_else(|| {
        AppError::InvalidRequest("Payment method must be cash, card or online".to_string())
    })?;

    Ok(PaymentDetails {
        amount,
        method,
        reference: form.text("payment_reference").map(String::from),
    })
}

/// Uploaded files are removed whenever the application is refused.
pub async fn request_membership(
    db: &MongoDB,
    mailer: &dyn Mailer,
    config: &AppConfig,
    user_id: &ObjectId,
    form: &UploadForm,
) -> Result<MembershipOutcome, AppError> {
    match submit_application(db, mailer, config, user_id, form).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

async fn submit_application(
    db: &MongoDB,
    mailer: &dyn Mailer,
    config: &AppConfig,
    user_id: &ObjectId,
    form: &UploadForm,
) -> Result<MembershipOutcome, AppError> {
    let id_card = form.require_file(ID_CARD_FIELD, "ID card image is required")?;
    let payment_image = form.require_file(PAYMENT_IMAGE_FIELD, "Payment screenshot is required")?;

    let settings = settings_service::get_settings(db).await?;
    let payment = parse_payment_details(form, settings.membership_fee)?;

    let user = user_service::find_user(db, user_id).await?;
    if user.is_blacklisted {
        return Err(AppError::Forbidden(
            "You are currently blacklisted and cannot apply for a membership".to_string(),
        ));
    }

    let collection = db.collection::<Membership>(MEMBERSHIPS);
    let existing = collection.find_one(doc! { "user": user_id }).await?;
    if let Some(existing) = &existing {
        if !existing.status.allows_reapply() {
            return Err(already_applied());
        }
    }

    let now = now_ts();
    let token = random_hex_token();
    let mut membership = Membership {
        id: None,
        user: *user_id,
        id_card_image: Some(id_card.public_path()),
        payment_image: Some(payment_image.public_path()),
        payment_reference: payment.reference,
        payment_amount: payment.amount,
        payment_method: payment.method,
        status: MembershipStatus::Pending,
        expiry_date: None,
        last_payment_date: None,
        is_email_verified: user.email_verified,
        verification_token: Some(token.clone()),
        verification_token_expiry: Some(now + VERIFICATION_TOKEN_TTL_HOURS * 3600),
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };

    match existing {
        Some(previous) => {
            // Re-application replaces the old record only if it is still rejected/expired
            membership.id = previous.id;
            membership.created_at = previous.created_at;
            let replaced = collection
                .find_one_and_replace(
                    doc! {
                        "_id": previous.id,
                        "status": { "$in": [MembershipStatus::Rejected.as_str(), MembershipStatus::Expired.as_str()] }
                    },
                    &membership,
                )
                .await?;
            if replaced.is_none() {
                return Err(already_applied());
            }
            for path in [previous.id_card_image, previous.payment_image].into_iter().flatten() {
                delete_file_if_exists(&config.upload_dir, &path).await;
            }
            log::info!("🔁 Membership re-application from {}", user.email);
        }
        None => {
            let result = collection.insert_one(&membership).await.map_err(|e| {
                if is_duplicate_key(&e) {
                    already_applied()
                } else {
                    AppError::from(e)
                }
            })?;
            membership.id = result.inserted_id.as_object_id();
            log::info!("📝 Membership request from {}", user.email);
        }
    }

    let mut email_sent = true;
    if !user.email_verified {
        let link = format!("{}/api/membership/verify-email/{}", config.public_base_url, token);
        email_sent = email_service::send_email(mailer, email_service::verification_email(&user.email, &link)).await;
    }
    let confirmation_sent = email_service::send_email(
        mailer,
        email_service::request_received_email(&user.email, &user.full_name),
    )
    .await;

    Ok(MembershipOutcome {
        membership: membership.into(),
        email_sent: email_sent && confirmation_sent,
    })
}

fn already_applied() -> AppError {
    AppError::InvalidRequest("You already have a membership request or active membership".to_string())
}

pub async fn verify_email(db: &MongoDB, token: &str) -> Result<(), AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(invalid_token());
    }

    let now = now_ts();
    let membership = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one_and_update(
            doc! { "verification_token": token, "verification_token_expiry": { "$gt": now } },
            doc! {
                "$set": { "is_email_verified": true, "updated_at": now },
                "$unset": { "verification_token": "", "verification_token_expiry": "" }
            },
        )
        .await?
        .ok_or_else(invalid_token)?;

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": membership.user, "email_verified": { "$ne": true } },
            doc! { "$set": { "email_verified": true, "updated_at": now } },
        )
        .await?;

    log::info!("✅ Email verified for membership {}", membership.id.map(|id| id.to_hex()).unwrap_or_default());

    Ok(())
}

fn invalid_token() -> AppError {
    AppError::InvalidRequest("Invalid or expired verification token".to_string())
}

/// Flips an Active membership past its expiry to Expired; returns the stored state.
async fn refresh_expiry(db: &MongoDB, membership: Membership, now: i64) -> Result<Membership, AppError> {
    if membership.status != MembershipStatus::Active || !membership.is_expired_at(now) {
        return Ok(membership);
    }

    let updated = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one_and_update(
            doc! { "_id": membership.id, "status": MembershipStatus::Active.as_str() },
            doc! { "$set": { "status": MembershipStatus::Expired.as_str(), "updated_at": now } },
        )
        .return_document(ReturnDocument::After)
        .await?;

    Ok(updated.unwrap_or(membership))
}

pub async fn membership_status(db: &MongoDB, user_id: &ObjectId) -> Result<MembershipResponse, AppError> {
    let membership = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one(doc! { "user": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound("No membership found".to_string()))?;

    let membership = refresh_expiry(db, membership, now_ts()).await?;
    Ok(membership.into())
}

pub async fn list_memberships(db: &MongoDB) -> Result<Vec<MembershipResponse>, AppError> {
    let memberships: Vec<Membership> = db
        .collection::<Membership>(MEMBERSHIPS)
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    let user_ids: Vec<ObjectId> = memberships.iter().map(|m| m.user).collect();
    let users = user_service::user_summaries(db, &user_ids).await?;

    Ok(memberships
        .into_iter()
        .map(|m| {
            let user = users.get(&m.user).cloned();
            MembershipResponse::from(m).with_user(user)
        })
        .collect())
}

async fn find_membership(db: &MongoDB, membership_id: &ObjectId) -> Result<Membership, AppError> {
    db.collection::<Membership>(MEMBERSHIPS)
        .find_one(doc! { "_id": membership_id })
        .await?
        .ok_or_else(|| AppError::not_found("Membership"))
}

fn only_pending(membership: &Membership, action: &str) -> Result<(), AppError> {
    if membership.status != MembershipStatus::Pending {
        return Err(AppError::InvalidRequest(format!(
            "Only pending memberships can be {} (current status: {})",
            action,
            membership.status.as_str()
        )));
    }
    Ok(())
}

pub async fn approve_membership(
    db: &MongoDB,
    mailer: &dyn Mailer,
    membership_id: &ObjectId,
    expiry_months: Option<u32>,
) -> Result<MembershipOutcome, AppError> {
    let membership = find_membership(db, membership_id).await?;
    only_pending(&membership, "approved")?;

    let user = user_service::find_user(db, &membership.user).await?;

    // Either record being verified is enough; the other one is brought in line
    match (membership.is_email_verified, user.email_verified) {
        (false, false) => return Err(AppError::InvalidRequest("Email not verified yet".to_string())),
        (true, false) => {
            db.collection::<User>(USERS)
                .update_one(
                    doc! { "_id": user.id },
                    doc! { "$set": { "email_verified": true, "updated_at": now_ts() } },
                )
                .await?;
        }
        _ => {}
    }

    let months = match expiry_months {
        Some(m) => m,
        None => settings_service::get_settings(db).await?.membership_duration,
    };
    if months == 0 || months > MAX_EXPIRY_MONTHS {
        return Err(AppError::InvalidRequest(format!(
            "Expiry months must be between 1 and {}",
            MAX_EXPIRY_MONTHS
        )));
    }

    let now = now_ts();
    let expiry_date = add_months(now, months);

    let updated = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one_and_update(
            doc! { "_id": membership_id, "status": MembershipStatus::Pending.as_str() },
            doc! {
                "$set": {
                    "status": MembershipStatus::Active.as_str(),
                    "is_email_verified": true,
                    "expiry_date": expiry_date,
                    "last_payment_date": now,
                    "updated_at": now,
                },
                "$unset": { "rejection_reason": "" }
            },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Membership was updated by someone else".to_string()))?;

    log::info!("✅ Membership approved for {} until {}", user.email, expiry_date);

    let email_sent = email_service::send_email(
        mailer,
        email_service::approval_email(&user.email, &user.full_name, expiry_date),
    )
    .await;

    Ok(MembershipOutcome { membership: updated.into(), email_sent })
}

pub async fn reject_membership(
    db: &MongoDB,
    mailer: &dyn Mailer,
    membership_id: &ObjectId,
    reason: Option<&str>,
) -> Result<MembershipOutcome, AppError> {
    let membership = find_membership(db, membership_id).await?;
    only_pending(&membership, "rejected")?;

    let user = user_service::find_user(db, &membership.user).await?;
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REJECTION_REASON);

    let updated = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one_and_update(
            doc! { "_id": membership_id, "status": MembershipStatus::Pending.as_str() },
            doc! { "$set": {
                "status": MembershipStatus::Rejected.as_str(),
                "rejection_reason": reason,
                "updated_at": now_ts(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Membership was updated by someone else".to_string()))?;

    log::info!("❌ Membership rejected for {}: {}", user.email, reason);

    let email_sent = email_service::send_email(
        mailer,
        email_service::rejection_email(&user.email, &user.full_name, reason),
    )
    .await;

    Ok(MembershipOutcome { membership: updated.into(), email_sent })
}

pub async fn delete_membership(
    db: &MongoDB,
    upload_dir: &Path,
    membership_id: &ObjectId,
) -> Result<DeletedFiles, AppError> {
    let membership = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one_and_delete(doc! { "_id": membership_id })
        .await?
        .ok_or_else(|| AppError::not_found("Membership"))?;

    let mut deleted = DeletedFiles { id_card_image: false, payment_image: false };
    if let Some(path) = &membership.id_card_image {
        deleted.id_card_image = delete_file_if_exists(upload_dir, path).await;
    }
    if let Some(path) = &membership.payment_image {
        deleted.payment_image = delete_file_if_exists(upload_dir, path).await;
    }

    log::info!("🗑️  Membership {} deleted", membership_id.to_hex());

    Ok(deleted)
}

/// Borrowing gate. Staff always pass.
pub async fn ensure_active_membership(db: &MongoDB, claims: &Claims) -> Result<(), AppError> {
    if claims.is_staff() {
        return Ok(());
    }

    let membership = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one(doc! { "user": claims.user_id()? })
        .await?
        .ok_or_else(not_approved)?;

    let membership = refresh_expiry(db, membership, now_ts()).await?;
    match membership.status {
        MembershipStatus::Active => Ok(()),
        MembershipStatus::Expired => Err(AppError::Forbidden("Membership expired".to_string())),
        _ => Err(not_approved()),
    }
}

fn not_approved() -> AppError {
    AppError::Forbidden("Membership not approved".to_string())
}

/// Active memberships past their expiry become Expired; returns how many changed.
pub async fn expire_memberships(db: &MongoDB) -> Result<u64, AppError> {
    let now = now_ts();
    let result = db
        .collection::<Membership>(MEMBERSHIPS)
        .update_many(
            doc! { "status": MembershipStatus::Active.as_str(), "expiry_date": { "$lt": now } },
            doc! { "$set": { "status": MembershipStatus::Expired.as_str(), "updated_at": now } },
        )
        .await?;
    Ok(result.modified_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn form(fields: &[(&str, &str)]) -> UploadForm {
        let fields: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        UploadForm::with_fields(fields)
    }

    #[test]
    fn test_payment_details() {
        let details = parse_payment_details(
            &form(&[("payment_amount", "150"), ("payment_method", "Online"), ("payment_reference", "TX-9")]),
            100.0,
        )
        .unwrap();
        assert_eq!(details.amount, 150.0);
        assert_eq!(details.method, PaymentMethod::Online);
        assert_eq!(details.reference.as_deref(), Some("TX-9"));
    }

    #[test]
    fn test_payment_details_rejections() {
        let missing = parse_payment_details(&form(&[("payment_amount", "150")]), 0.0).unwrap_err();
        assert_eq!(missing.message(), "Payment amount and method are required");

        let low = parse_payment_details(&form(&[("payment_amount", "40"), ("payment_method", "cash")]), 50.0)
            .unwrap_err();
        assert_eq!(low.message(), "Payment amount must be at least 50");

        let nan = parse_payment_details(&form(&[("payment_amount", "abc"), ("payment_method", "cash")]), 0.0);
        assert!(nan.is_err());

        let zero = parse_payment_details(&form(&[("payment_amount", "0"), ("payment_method", "cash")]), 0.0);
        assert!(zero.is_err());

        let method = parse_payment_details(&form(&[("payment_amount", "60"), ("payment_method", "cheque")]), 0.0);
        assert!(method.is_err());
    }

    #[test]
    fn test_only_pending_can_be_decided() {
        let mut membership = Membership {
            id: Some(ObjectId::new()),
            user: ObjectId::new(),
            id_card_image: None,
            payment_image: None,
            payment_reference: None,
            payment_amount: 100.0,
            payment_method: PaymentMethod::Cash,
            status: MembershipStatus::Pending,
            expiry_date: None,
            last_payment_date: None,
            is_email_verified: true,
            verification_token: None,
            verification_token_expiry: None,
            rejection_reason: None,
            created_at: 0,
            updated_at: 0,
        };
        assert!(only_pending(&membership, "approved").is_ok());

        membership.status = MembershipStatus::Active;
        let err = only_pending(&membership, "approved").unwrap_err();
        assert!(err.message().contains("current status: Active"));
    }

    mod with_mongo {
        use super::*;
        use crate::config::test_config;
        use crate::models::Role;
        use crate::services::auth_service::test_user;
        use crate::services::email_service::testing::RecordingMailer;
        use crate::services::upload_service::testing::{multipart, Part};
        use crate::services::upload_service::{read_upload_form, UploadTarget};
        use crate::utils::ids::parse_object_id;

        async fn test_db() -> MongoDB {
            MongoDB::new("mongodb://localhost:27017/library_test_memberships").await.unwrap()
        }

        async fn insert_student(db: &MongoDB) -> (User, Claims) {
            let mut user = test_user(Role::User);
            user.email = format!("{}@example.com", ObjectId::new().to_hex());
            user.username = user.email.clone();
            db.collection::<User>(USERS).insert_one(&user).await.unwrap();
            let claims = Claims {
                sub: user.id.unwrap().to_hex(),
                email: user.email.clone(),
                role: Role::User,
                iat: 0,
                exp: 0,
                jti: String::new(),
                aud: String::new(),
                iss: String::new(),
            };
            (user, claims)
        }

        fn application() -> actix_multipart::Multipart {
            multipart(&[
                Part::Text("payment_amount", "100"),
                Part::Text("payment_method", "cash"),
                Part::Image(ID_CARD_FIELD, "id.png"),
                Part::Image(PAYMENT_IMAGE_FIELD, "receipt.jpg"),
            ])
        }

        fn stored_files(config: &AppConfig) -> usize {
            std::fs::read_dir(config.upload_dir.join("memberships"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_request_verify_approve_opens_borrowing() {
            let db = test_db().await;
            let mut config = test_config();
            config.upload_dir = std::env::temp_dir().join("library-membership-flow-test");
            let _ = std::fs::remove_dir_all(&config.upload_dir);
            let mailer = RecordingMailer::default();
            let (user, claims) = insert_student(&db).await;
            let user_id = user.id.unwrap();
            let targets = [ID_CARD_FIELD, PAYMENT_IMAGE_FIELD];

            let form = read_upload_form(application(), &config, UploadTarget::Memberships, &targets)
                .await
                .unwrap();
            let outcome = request_membership(&db, &mailer, &config, &user_id, &form).await.unwrap();
            assert_eq!(outcome.membership.status, MembershipStatus::Pending);
            assert!(outcome.email_sent);
            assert!(outcome.membership.id_card_image.as_deref().unwrap().starts_with("uploads/memberships/"));
            assert_eq!(mailer.sent.lock().unwrap().len(), 2);
            assert_eq!(stored_files(&config), 2);

            let membership_id = parse_object_id(&outcome.membership.id, "membership").unwrap();
            assert_eq!(ensure_active_membership(&db, &claims).await.unwrap_err().message(), "Membership not approved");
            let early = approve_membership(&db, &mailer, &membership_id, Some(1)).await.unwrap_err();
            assert_eq!(early.message(), "Email not verified yet");

            let token = find_membership(&db, &membership_id).await.unwrap().verification_token.unwrap();
            verify_email(&db, &token).await.unwrap();
            assert!(matches!(verify_email(&db, &token).await, Err(AppError::InvalidRequest(_))));
            assert!(user_service::find_user(&db, &user_id).await.unwrap().email_verified);

            let approved = approve_membership(&db, &mailer, &membership_id, Some(1)).await.unwrap();
            assert_eq!(approved.membership.status, MembershipStatus::Active);
            assert!(approved.membership.expiry_date.unwrap() > now_ts());
            ensure_active_membership(&db, &claims).await.unwrap();

            // An active member cannot apply again and the new files are dropped
            let again = read_upload_form(application(), &config, UploadTarget::Memberships, &targets)
                .await
                .unwrap();
            let err = request_membership(&db, &mailer, &config, &user_id, &again).await.unwrap_err();
            assert_eq!(err.message(), "You already have a membership request or active membership");
            assert_eq!(stored_files(&config), 2);

            let deleted = delete_membership(&db, &config.upload_dir, &membership_id).await.unwrap();
            assert!(deleted.id_card_image && deleted.payment_image);
            assert_eq!(stored_files(&config), 0);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_lapsed_membership_becomes_expired() {
            let db = test_db().await;
            let now = now_ts();
            let mut ids = Vec::new();
            let mut gates = Vec::new();
            for _ in 0..2 {
                let (user, claims) = insert_student(&db).await;
                let membership = Membership {
                    id: None,
                    user: user.id.unwrap(),
                    id_card_image: None,
                    payment_image: None,
                    payment_reference: None,
                    payment_amount: 100.0,
                    payment_method: PaymentMethod::Cash,
                    status: MembershipStatus::Active,
                    expiry_date: Some(now - 60),
                    last_payment_date: Some(now - 3600),
                    is_email_verified: true,
                    verification_token: None,
                    verification_token_expiry: None,
                    rejection_reason: None,
                    created_at: now,
                    updated_at: now,
                };
                let result = db.collection::<Membership>(MEMBERSHIPS).insert_one(&membership).await.unwrap();
                ids.push(result.inserted_id.as_object_id().unwrap());
                gates.push(claims);
            }

            // Checked lazily at the borrowing gate
            let err = ensure_active_membership(&db, &gates[0]).await.unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
            assert_eq!(err.message(), "Membership expired");
            assert_eq!(find_membership(&db, &ids[0]).await.unwrap().status, MembershipStatus::Expired);

            // and in bulk by the monitor
            assert!(expire_memberships(&db).await.unwrap() >= 1);
            assert_eq!(find_membership(&db, &ids[1]).await.unwrap().status, MembershipStatus::Expired);
            assert_eq!(ensure_active_membership(&db, &gates[1]).await.unwrap_err().message(), "Membership expired");
        }
    }
}
