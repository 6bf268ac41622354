use crate::{
    database::MongoDB,
    models::{
        compute_due_date, late_days, late_fee, Book, Borrow, BorrowDuration, BorrowRequest, BorrowResponse,
        BorrowStatus, Payment, PaymentKind, PaymentMethod, PaymentResponse, PaymentStatus, Settings, User,
        BOOKS, BORROWS, PAYMENTS, USERS,
    },
    services::{
        auth_service::Claims,
        email_service::{self, Mailer},
        membership_service, settings_service,
        upload_service::UploadForm,
        user_service,
    },
    utils::{
        ids::parse_object_id,
        time::{add_days, now_ts},
        AppError,
    },
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::ReturnDocument;
use serde::Serialize;

pub const PAYMENT_IMAGE_FIELD: &str = "payment_image";

#[derive(Debug, Serialize)]
pub struct ReturnOutcome {
    pub borrow: BorrowResponse,
    /// Pending late-fee payment raised by a late return.
    pub late_fee_payment: Option<PaymentResponse>,
}

/// What a new borrow record starts as.
struct NewBorrow {
    book: ObjectId,
    duration: Option<BorrowDuration>,
    status: BorrowStatus,
    payment_image: Option<String>,
    payment_reference: Option<String>,
}

pub fn transition_error(current: BorrowStatus, next: BorrowStatus) -> AppError {
    if current == BorrowStatus::Returned && next == BorrowStatus::Returned {
        return AppError::InvalidRequest("Book already returned".to_string());
    }
    AppError::InvalidRequest(format!("Cannot change borrow from {} to {}", current, next))
}

fn status_names(statuses: &[BorrowStatus]) -> Vec<&'static str> {
    statuses.iter().map(|s| s.as_str()).collect()
}

async fn find_borrow(db: &MongoDB, borrow_id: &ObjectId) -> Result<Borrow, AppError> {
    db.collection::<Borrow>(BORROWS)
        .find_one(doc! { "_id": borrow_id })
        .await?
        .ok_or_else(|| AppError::not_found("Borrow record"))
}

/// Moves a borrow to `next` only if it is still in a status that allows it.
async fn transition(db: &MongoDB, borrow_id: &ObjectId, next: BorrowStatus, mut set: Document) -> Result<Borrow, AppError> {
    set.insert("status", next.as_str());
    set.insert("updated_at", now_ts());

    let updated = db
        .collection::<Borrow>(BORROWS)
        .find_one_and_update(
            doc! { "_id": borrow_id, "status": { "$in": status_names(&BorrowStatus::sources_of(next)) } },
            doc! { "$set": set },
        )
        .return_document(ReturnDocument::After)
        .await?;

    match updated {
        Some(borrow) => Ok(borrow),
        None => {
            let current = find_borrow(db, borrow_id).await?;
            Err(transition_error(current.status, next))
        }
    }
}

async fn release_slot(db: &MongoDB, student: &ObjectId) -> Result<(), AppError> {
    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": student, "active_borrows_count": { "$gt": 0 } },
            doc! { "$inc": { "active_borrows_count": -1 } },
        )
        .await?;
    Ok(())
}

async fn release_copy(db: &MongoDB, book: &ObjectId) -> Result<(), AppError> {
    db.collection::<Book>(BOOKS)
        .update_one(
            doc! { "_id": book, "$expr": { "$lt": ["$available", "$copies.hard_copy"] } },
            doc! { "$inc": { "available": 1 } },
        )
        .await?;
    Ok(())
}

/// Gives back the copy and the slot held by an active borrow.
async fn release(db: &MongoDB, borrow: &Borrow) {
    if let Err(e) = release_copy(db, &borrow.book).await {
        log::error!("❌ Failed to release copy of book {}: {}", borrow.book.to_hex(), e);
    }
    if let Err(e) = release_slot(db, &borrow.student).await {
        log::error!("❌ Failed to release borrow slot of {}: {}", borrow.student.to_hex(), e);
    }
}

/// Reserves a borrow slot, then a copy, then inserts the record; each step is
/// undone when a later one fails.
async fn reserve_and_insert(db: &MongoDB, student: &ObjectId, new: NewBorrow, settings: &Settings) -> Result<Borrow, AppError> {
    let duplicate = db
        .collection::<Borrow>(BORROWS)
        .count_documents(doc! {
            "student": student,
            "book": new.book,
            "status": { "$in": BorrowStatus::active_names() },
        })
        .await?;
    if duplicate > 0 {
        return Err(AppError::Conflict("You already have an active borrow for this book".to_string()));
    }

    // 1. borrow slot
    let slot = db
        .collection::<User>(USERS)
        .find_one_and_update(
            doc! {
                "_id": student,
                "is_blacklisted": { "$ne": true },
                "active_borrows_count": { "$lt": settings.max_borrow_limit },
            },
            doc! { "$inc": { "active_borrows_count": 1 } },
        )
        .await?;
    if slot.is_none() {
        let user = user_service::find_user(db, student).await?;
        if user.is_blacklisted {
            return Err(AppError::Forbidden("This account has been blacklisted".to_string()));
        }
        return Err(AppError::Conflict(format!(
            "Borrow limit of {} reached",
            settings.max_borrow_limit
        )));
    }

    // 2. copy
    let copy = db
        .collection::<Book>(BOOKS)
        .find_one_and_update(
            doc! { "_id": new.book, "available": { "$gt": 0 } },
            doc! { "$inc": { "available": -1 } },
        )
        .await;
    let book = match copy {
        Ok(Some(book)) => book,
        Ok(None) => {
            release_slot(db, student).await?;
            let exists = db.collection::<Book>(BOOKS).count_documents(doc! { "_id": new.book }).await?;
            return Err(if exists == 0 {
                AppError::not_found("Book")
            } else {
                AppError::Conflict("No available copies".to_string())
            });
        }
        Err(e) => {
            release_slot(db, student).await?;
            return Err(e.into());
        }
    };

    // 3. record
    let now = now_ts();
    let (borrow_date, due_date) = if new.status == BorrowStatus::Borrowed {
        (Some(now), Some(compute_due_date(now, new.duration, settings.borrow_duration_days)))
    } else {
        (None, None)
    };

    let mut borrow = Borrow {
        id: None,
        student: *student,
        book: new.book,
        status: new.status,
        duration: new.duration,
        borrow_date,
        due_date,
        return_date: None,
        payment_image: new.payment_image,
        payment_reference: new.payment_reference,
        late_days: 0,
        late_fee: 0.0,
        rejection_reason: None,
        reminder_sent: false,
        created_at: now,
        updated_at: now,
    };

    let inserted = db.collection::<Borrow>(BORROWS).insert_one(&borrow).await;
    match inserted {
        Ok(result) => borrow.id = result.inserted_id.as_object_id(),
        Err(e) => {
            release(db, &borrow).await;
            return Err(e.into());
        }
    }

    log::info!(
        "📖 {} borrow of \"{}\" by {} ({} copies left)",
        borrow.status,
        book.title,
        student.to_hex(),
        book.available - 1
    );

    Ok(borrow)
}

/// Immediate borrow. Refused while pay per borrow is enabled.
pub async fn borrow_book(db: &MongoDB, claims: &Claims, request: &BorrowRequest) -> Result<BorrowResponse, AppError> {
    membership_service::ensure_active_membership(db, claims).await?;

    let settings = settings_service::get_settings(db).await?;
    if settings.pay_per_borrow_enabled {
        return Err(AppError::InvalidRequest(
            "Pay per borrow is enabled: submit a borrow request with payment proof".to_string(),
        ));
    }

    let new = NewBorrow {
        book: parse_object_id(&request.book_id, "book")?,
        duration: request.duration,
        status: BorrowStatus::Borrowed,
        payment_image: None,
        payment_reference: None,
    };

    reserve_and_insert(db, &claims.user_id()?, new, &settings)
        .await
        .map(BorrowResponse::from)
}

/// Pending borrow awaiting staff approval; the payment proof is required while pay per borrow is on.
pub async fn request_borrow(db: &MongoDB, claims: &Claims, form: &UploadForm) -> Result<BorrowResponse, AppError> {
    match create_request(db, claims, form).await {
        Ok(borrow) => Ok(borrow),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

async fn create_request(db: &MongoDB, claims: &Claims, form: &UploadForm) -> Result<BorrowResponse, AppError> {
    membership_service::ensure_active_membership(db, claims).await?;

    let settings = settings_service::get_settings(db).await?;

    let book_id = form
        .text("book_id")
        .ok_or_else(|| AppError::InvalidRequest("book_id is required".to_string()))?;
    let duration = match form.text("duration") {
        Some(raw) => Some(
            BorrowDuration::parse(raw)
                .ok_or_else(|| AppError::InvalidRequest("Invalid duration option".to_string()))?,
        ),
        None => None,
    };

    let proof = form.file(PAYMENT_IMAGE_FIELD);
    if settings.pay_per_borrow_enabled && proof.is_none() {
        return Err(AppError::InvalidRequest("Payment proof image is required".to_string()));
    }

    let new = NewBorrow {
        book: parse_object_id(book_id, "book")?,
        duration,
        status: BorrowStatus::Pending,
        payment_image: proof.map(|f| f.public_path()),
        payment_reference: form.text("payment_reference").map(String::from),
    };

    reserve_and_insert(db, &claims.user_id()?, new, &settings)
        .await
        .map(BorrowResponse::from)
}

/// The loan period starts at approval.
pub async fn approve_borrow(db: &MongoDB, borrow_id: &ObjectId) -> Result<BorrowResponse, AppError> {
    let settings = settings_service::get_settings(db).await?;
    let borrow = find_borrow(db, borrow_id).await?;
    if !borrow.status.can_transition_to(BorrowStatus::Borrowed) {
        return Err(transition_error(borrow.status, BorrowStatus::Borrowed));
    }

    let now = now_ts();
    let due_date = compute_due_date(now, borrow.duration, settings.borrow_duration_days);

    let updated = transition(
        db,
        borrow_id,
        BorrowStatus::Borrowed,
        doc! { "borrow_date": now, "due_date": due_date },
    )
    .await?;

    log::info!("✅ Borrow {} approved, due {}", borrow_id.to_hex(), due_date);

    Ok(updated.into())
}

pub async fn reject_borrow(db: &MongoDB, borrow_id: &ObjectId, reason: Option<&str>) -> Result<BorrowResponse, AppError> {
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("No specific reason provided");

    let updated = transition(db, borrow_id, BorrowStatus::Rejected, doc! { "rejection_reason": reason }).await?;
    release(db, &updated).await;

    log::info!("❌ Borrow {} rejected: {}", borrow_id.to_hex(), reason);

    Ok(updated.into())
}

/// Borrower or staff. A late return records the fee and raises a pending payment for it.
pub async fn return_book(db: &MongoDB, claims: &Claims, borrow_id: &ObjectId) -> Result<ReturnOutcome, AppError> {
    let borrow = find_borrow(db, borrow_id).await?;
    if borrow.student.to_hex() != claims.sub && !claims.is_staff() {
        return Err(AppError::access_denied());
    }
    if !borrow.status.can_transition_to(BorrowStatus::Returned) {
        return Err(transition_error(borrow.status, BorrowStatus::Returned));
    }

    let settings = settings_service::get_settings(db).await?;
    let now = now_ts();
    let days = borrow.due_date.map_or(0, |due| late_days(due, now));
    let fee = late_fee(days, settings.late_fee_per_day);

    let updated = transition(
        db,
        borrow_id,
        BorrowStatus::Returned,
        doc! { "return_date": now, "late_days": days, "late_fee": fee },
    )
    .await?;
    release(db, &updated).await;

    // The return already happened; a lost fee record must not turn it into an error
    let late_fee_payment = match late_fee_payment_for(&updated, days, fee, now) {
        Some(payment) => record_late_fee(db, payment).await,
        None => None,
    };

    log::info!(
        "📗 Borrow {} returned ({} late days, fee {:.2})",
        borrow_id.to_hex(),
        days,
        fee
    );

    Ok(ReturnOutcome { borrow: updated.into(), late_fee_payment })
}

/// Pending cash payment for a late return, `None` when nothing is owed.
fn late_fee_payment_for(borrow: &Borrow, days: i64, fee: f64, now: i64) -> Option<Payment> {
    if fee <= 0.0 {
        return None;
    }
    Some(Payment {
        id: Some(ObjectId::new()),
        student: borrow.student,
        borrow: borrow.id,
        kind: PaymentKind::LateFee,
        amount: fee,
        method: PaymentMethod::Cash,
        reference: None,
        screenshot: None,
        description: Some(format!("Late fee for {} day(s)", days)),
        status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

async fn record_late_fee(db: &MongoDB, payment: Payment) -> Option<PaymentResponse> {
    match db.collection::<Payment>(PAYMENTS).insert_one(&payment).await {
        Ok(_) => Some(PaymentResponse::from(payment)),
        Err(e) => {
            log::error!(
                "❌ Late fee of {:.2} for borrow {} not recorded: {}",
                payment.amount,
                payment.borrow.map(|id| id.to_hex()).unwrap_or_default(),
                e
            );
            None
        }
    }
}

async fn find_borrows(db: &MongoDB, filter: Document) -> Result<Vec<BorrowResponse>, AppError> {
    let borrows: Vec<Borrow> = db
        .collection::<Borrow>(BORROWS)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(borrows.into_iter().map(BorrowResponse::from).collect())
}

pub async fn my_borrows(db: &MongoDB, student: &ObjectId) -> Result<Vec<BorrowResponse>, AppError> {
    find_borrows(db, doc! { "student": student }).await
}

pub async fn list_borrows(db: &MongoDB, status: Option<BorrowStatus>) -> Result<Vec<BorrowResponse>, AppError> {
    let filter = match status {
        Some(status) => doc! { "status": status.as_str() },
        None => doc! {},
    };
    find_borrows(db, filter).await
}

pub async fn get_borrow(db: &MongoDB, claims: &Claims, borrow_id: &ObjectId) -> Result<BorrowResponse, AppError> {
    let borrow = find_borrow(db, borrow_id).await?;
    if borrow.student.to_hex() != claims.sub && !claims.is_staff() {
        return Err(AppError::access_denied());
    }
    Ok(borrow.into())
}

/// Loads the borrower and book title used in notification emails.
async fn notification_target(db: &MongoDB, borrow: &Borrow) -> Result<Option<(User, String)>, AppError> {
    let user = db.collection::<User>(USERS).find_one(doc! { "_id": borrow.student }).await?;
    let book = db.collection::<Book>(BOOKS).find_one(doc! { "_id": borrow.book }).await?;
    Ok(user.map(|u| (u, book.map(|b| b.title).unwrap_or_else(|| "your book".to_string()))))
}

/// Borrowed records past their due date become Overdue; returns how many changed.
pub async fn mark_overdue(db: &MongoDB, mailer: &dyn Mailer, settings: &Settings) -> Result<u64, AppError> {
    let now = now_ts();
    let due: Vec<Borrow> = db
        .collection::<Borrow>(BORROWS)
        .find(doc! { "status": BorrowStatus::Borrowed.as_str(), "due_date": { "$lt": now } })
        .await?
        .try_collect()
        .await?;

    let mut marked = 0;
    for borrow in due {
        let Some(borrow_id) = borrow.id else { continue };
        let updated = match transition(db, &borrow_id, BorrowStatus::Overdue, doc! {}).await {
            Ok(updated) => updated,
            // Returned or removed in the meantime
            Err(AppError::InvalidRequest(_) | AppError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        marked += 1;

        if settings.notifications_enabled {
            if let Some((user, title)) = notification_target(db, &updated).await? {
                let message = email_service::overdue_email(
                    &user.email,
                    &user.full_name,
                    &title,
                    updated.due_date.unwrap_or(now),
                    settings.late_fee_per_day,
                );
                email_service::send_email(mailer, message).await;
            }
        }
    }

    Ok(marked)
}

/// One reminder per Borrowed record due within `notify_before_days`.
pub async fn send_due_reminders(db: &MongoDB, mailer: &dyn Mailer, settings: &Settings) -> Result<u64, AppError> {
    if !settings.notifications_enabled || settings.notify_before_days <= 0 {
        return Ok(0);
    }

    let now = now_ts();
    let horizon = add_days(now, i64::from(settings.notify_before_days));
    let collection = db.collection::<Borrow>(BORROWS);

    let due_soon: Vec<Borrow> = collection
        .find(doc! {
            "status": BorrowStatus::Borrowed.as_str(),
            "reminder_sent": { "$ne": true },
            "due_date": { "$gte": now, "$lte": horizon },
        })
        .await?
        .try_collect()
        .await?;

    let mut sent = 0;
    for borrow in due_soon {
        // Claim the reminder first so concurrent runs never send twice
        let claimed = collection
            .update_one(
                doc! { "_id": borrow.id, "reminder_sent": { "$ne": true } },
                doc! { "$set": { "reminder_sent": true } },
            )
            .await?;
        if claimed.modified_count == 0 {
            continue;
        }

        if let Some((user, title)) = notification_target(db, &borrow).await? {
            let message = email_service::due_soon_email(&user.email, &user.full_name, &title, borrow.due_date.unwrap_or(now));
            if email_service::send_email(mailer, message).await {
                sent += 1;
            }
        }
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_errors() {
        assert_eq!(
            transition_error(BorrowStatus::Returned, BorrowStatus::Returned).message(),
            "Book already returned"
        );
        assert_eq!(
            transition_error(BorrowStatus::Pending, BorrowStatus::Returned).message(),
            "Cannot change borrow from Pending to Returned"
        );
        assert!(matches!(
            transition_error(BorrowStatus::Rejected, BorrowStatus::Borrowed),
            AppError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_status_filter_names() {
        assert_eq!(
            status_names(&BorrowStatus::sources_of(BorrowStatus::Returned)),
            vec!["Borrowed", "Overdue"]
        );
        assert_eq!(status_names(&BorrowStatus::sources_of(BorrowStatus::Rejected)), vec!["Pending"]);
    }

    #[test]
    fn test_late_fee_payment_only_when_owed() {
        let mut borrow = Borrow {
            id: Some(ObjectId::new()),
            student: ObjectId::new(),
            book: ObjectId::new(),
            status: BorrowStatus::Returned,
            duration: None,
            borrow_date: Some(0),
            due_date: Some(0),
            return_date: Some(100),
            payment_image: None,
            payment_reference: None,
            late_days: 0,
            late_fee: 0.0,
            rejection_reason: None,
            reminder_sent: false,
            created_at: 0,
            updated_at: 0,
        };
        assert!(late_fee_payment_for(&borrow, 0, 0.0, 100).is_none());

        borrow.late_days = 2;
        let payment = late_fee_payment_for(&borrow, 2, 5.5, 100).unwrap();
        assert!(payment.id.is_some());
        assert_eq!(payment.borrow, borrow.id);
        assert_eq!(payment.student, borrow.student);
        assert_eq!(payment.kind, PaymentKind::LateFee);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, 5.5);
        assert_eq!(payment.description.as_deref(), Some("Late fee for 2 day(s)"));
    }

    mod with_mongo {
        use super::*;
        use crate::models::{Category, Copies, CreateBookRequest, Role, UpdateSettingsRequest};
        use crate::services::email_service::testing::RecordingMailer;
        use crate::services::{auth_service::test_user, book_service};

        const DAY: i64 = 86_400;

        async fn test_db(name: &str) -> MongoDB {
            MongoDB::new(&format!("mongodb://localhost:27017/{}", name)).await.unwrap()
        }

        async fn insert_book(db: &MongoDB, hard_copy: i32) -> ObjectId {
            let book = book_service::add_book(
                db,
                CreateBookRequest {
                    title: format!("Book {}", ObjectId::new().to_hex()),
                    author: "Tester".into(),
                    image: None,
                    category: Category { name: "Test".into(), kind: Default::default() },
                    language: None,
                    publisher: None,
                    year: None,
                    isbn: None,
                    copies: Some(Copies { hard_copy, e_book: false }),
                    available: None,
                    description: None,
                },
            )
            .await
            .unwrap();
            parse_object_id(&book.id, "book").unwrap()
        }

        async fn insert_student(db: &MongoDB) -> User {
            let mut user = test_user(Role::User);
            user.email = format!("{}@example.com", ObjectId::new().to_hex());
            user.username = user.email.clone();
            db.collection::<User>(USERS).insert_one(&user).await.unwrap();
            user
        }

        fn claims_for(user: &User) -> Claims {
            Claims {
                sub: user.id.unwrap().to_hex(),
                email: user.email.clone(),
                role: user.role,
                iat: 0,
                exp: 0,
                jti: String::new(),
                aud: String::new(),
                iss: String::new(),
            }
        }

        fn new_borrow(book: ObjectId, status: BorrowStatus) -> NewBorrow {
            NewBorrow { book, duration: None, status, payment_image: None, payment_reference: None }
        }

        async fn available(db: &MongoDB, book: &ObjectId) -> i32 {
            db.collection::<Book>(BOOKS).find_one(doc! { "_id": book }).await.unwrap().unwrap().available
        }

        async fn slots(db: &MongoDB, student: &ObjectId) -> i32 {
            user_service::find_user(db, student).await.unwrap().active_borrows_count
        }

        async fn set_due_date(db: &MongoDB, borrow: &ObjectId, due: i64) {
            db.collection::<Borrow>(BORROWS)
                .update_one(doc! { "_id": borrow }, doc! { "$set": { "due_date": due } })
                .await
                .unwrap();
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_last_copy_goes_to_one_borrower() {
            let db = test_db("library_test").await;
            let book_id = insert_book(&db, 1).await;
            let mut students = Vec::new();
            for _ in 0..2 {
                students.push(insert_student(&db).await.id.unwrap());
            }

            let settings = Settings::default();
            let attempt = |student: ObjectId| {
                let db = db.clone();
                let settings = settings.clone();
                async move {
                    reserve_and_insert(&db, &student, new_borrow(book_id, BorrowStatus::Borrowed), &settings).await
                }
            };

            let (a, b) = tokio::join!(attempt(students[0]), attempt(students[1]));
            assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

            let loser = if a.is_ok() { students[1] } else { students[0] };
            assert_eq!(slots(&db, &loser).await, 0);
            assert_eq!(available(&db, &book_id).await, 0);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_borrow_limit_is_a_conflict_and_reserves_nothing() {
            let db = test_db("library_test").await;
            let settings = Settings { max_borrow_limit: 1, ..Default::default() };
            let student = insert_student(&db).await.id.unwrap();
            let first = insert_book(&db, 1).await;
            let second = insert_book(&db, 1).await;

            reserve_and_insert(&db, &student, new_borrow(first, BorrowStatus::Borrowed), &settings)
                .await
                .unwrap();
            let err = reserve_and_insert(&db, &student, new_borrow(second, BorrowStatus::Borrowed), &settings)
                .await
                .unwrap_err();

            assert!(matches!(err, AppError::Conflict(_)));
            assert_eq!(err.message(), "Borrow limit of 1 reached");
            assert_eq!(slots(&db, &student).await, 1);
            assert_eq!(available(&db, &second).await, 1);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_missing_copy_gives_back_the_slot() {
            let db = test_db("library_test").await;
            let settings = Settings::default();
            let book = insert_book(&db, 1).await;
            let holder = insert_student(&db).await.id.unwrap();
            let latecomer = insert_student(&db).await.id.unwrap();

            reserve_and_insert(&db, &holder, new_borrow(book, BorrowStatus::Borrowed), &settings)
                .await
                .unwrap();
            let err = reserve_and_insert(&db, &latecomer, new_borrow(book, BorrowStatus::Borrowed), &settings)
                .await
                .unwrap_err();

            assert_eq!(err.message(), "No available copies");
            assert_eq!(slots(&db, &latecomer).await, 0);
            assert_eq!(available(&db, &book).await, 0);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_same_book_cannot_be_held_twice() {
            let db = test_db("library_test").await;
            let settings = Settings::default();
            let book = insert_book(&db, 2).await;
            let student = insert_student(&db).await.id.unwrap();

            reserve_and_insert(&db, &student, new_borrow(book, BorrowStatus::Pending), &settings)
                .await
                .unwrap();
            let err = reserve_and_insert(&db, &student, new_borrow(book, BorrowStatus::Borrowed), &settings)
                .await
                .unwrap_err();

            assert!(matches!(err, AppError::Conflict(_)));
            assert_eq!(err.message(), "You already have an active borrow for this book");
            assert_eq!(slots(&db, &student).await, 1);
            assert_eq!(available(&db, &book).await, 1);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_reject_releases_copy_and_slot() {
            let db = test_db("library_test").await;
            let book = insert_book(&db, 1).await;
            let student = insert_student(&db).await;
            let student_id = student.id.unwrap();

            let pending = reserve_and_insert(&db, &student_id, new_borrow(book, BorrowStatus::Pending), &Settings::default())
                .await
                .unwrap();
            let borrow_id = pending.id.unwrap();
            assert_eq!(available(&db, &book).await, 0);
            assert_eq!(slots(&db, &student_id).await, 1);

            let rejected = reject_borrow(&db, &borrow_id, Some("  ")).await.unwrap();
            assert_eq!(rejected.status, BorrowStatus::Rejected);
            assert_eq!(rejected.rejection_reason.as_deref(), Some("No specific reason provided"));
            assert_eq!(available(&db, &book).await, 1);
            assert_eq!(slots(&db, &student_id).await, 0);

            // A second decision changes nothing
            assert!(matches!(reject_borrow(&db, &borrow_id, None).await, Err(AppError::InvalidRequest(_))));
            let err = return_book(&db, &claims_for(&student), &borrow_id).await.unwrap_err();
            assert_eq!(err.message(), "Cannot change borrow from Rejected to Returned");
            assert_eq!(available(&db, &book).await, 1);
            assert_eq!(slots(&db, &student_id).await, 0);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_late_return_releases_and_raises_fee() {
            let db = test_db("library_test_returns").await;
            settings_service::update_settings(
                &db,
                &UpdateSettingsRequest { late_fee_per_day: Some(2.0), ..Default::default() },
            )
            .await
            .unwrap();

            let book = insert_book(&db, 1).await;
            let student = insert_student(&db).await;
            let student_id = student.id.unwrap();
            let borrow = reserve_and_insert(&db, &student_id, new_borrow(book, BorrowStatus::Borrowed), &Settings::default())
                .await
                .unwrap();
            let borrow_id = borrow.id.unwrap();
            set_due_date(&db, &borrow_id, now_ts() - 3 * DAY + 600).await;

            let outcome = return_book(&db, &claims_for(&student), &borrow_id).await.unwrap();
            assert_eq!(outcome.borrow.status, BorrowStatus::Returned);
            assert_eq!(outcome.borrow.late_days, 3);
            assert_eq!(outcome.borrow.late_fee, 6.0);
            assert_eq!(available(&db, &book).await, 1);
            assert_eq!(slots(&db, &student_id).await, 0);

            let payment = outcome.late_fee_payment.unwrap();
            assert_eq!(payment.kind, PaymentKind::LateFee);
            assert_eq!(payment.amount, 6.0);
            assert_eq!(payment.borrow.as_deref(), Some(borrow_id.to_hex().as_str()));
            let stored = db
                .collection::<Payment>(PAYMENTS)
                .count_documents(doc! { "_id": parse_object_id(&payment.id, "payment").unwrap() })
                .await
                .unwrap();
            assert_eq!(stored, 1);

            let again = return_book(&db, &claims_for(&student), &borrow_id).await.unwrap_err();
            assert!(matches!(again, AppError::InvalidRequest(_)));
            assert_eq!(again.message(), "Book already returned");
            assert_eq!(available(&db, &book).await, 1);
            assert_eq!(slots(&db, &student_id).await, 0);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_unrecorded_late_fee_does_not_fail() {
            let db = test_db("library_test").await;
            let borrow = Borrow {
                id: Some(ObjectId::new()),
                student: ObjectId::new(),
                book: ObjectId::new(),
                status: BorrowStatus::Returned,
                duration: None,
                borrow_date: None,
                due_date: None,
                return_date: None,
                payment_image: None,
                payment_reference: None,
                late_days: 1,
                late_fee: 1.0,
                rejection_reason: None,
                reminder_sent: false,
                created_at: 0,
                updated_at: 0,
            };
            let payment = late_fee_payment_for(&borrow, 1, 1.0, now_ts()).unwrap();
            db.collection::<Payment>(PAYMENTS).insert_one(&payment).await.unwrap();

            // Same _id again: the insert fails and the return keeps going without a payment
            assert!(record_late_fee(&db, payment.clone()).await.is_none());
            let stored = db
                .collection::<Payment>(PAYMENTS)
                .count_documents(doc! { "_id": payment.id })
                .await
                .unwrap();
            assert_eq!(stored, 1);
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn test_overdue_marked_once_with_notice() {
            let db = test_db("library_test_overdue").await;
            let book = insert_book(&db, 1).await;
            let student = insert_student(&db).await;
            let borrow = reserve_and_insert(&db, &student.id.unwrap(), new_borrow(book, BorrowStatus::Borrowed), &Settings::default())
                .await
                .unwrap();
            let borrow_id = borrow.id.unwrap();
            set_due_date(&db, &borrow_id, now_ts() - DAY).await;

            let mailer = RecordingMailer::default();
            let settings = Settings { late_fee_per_day: 1.5, ..Default::default() };
            assert!(mark_overdue(&db, &mailer, &settings).await.unwrap() >= 1);
            assert_eq!(find_borrow(&db, &borrow_id).await.unwrap().status, BorrowStatus::Overdue);
            assert_eq!(mark_overdue(&db, &mailer, &settings).await.unwrap(), 0);

            let sent = mailer.sent.lock().unwrap();
            let notices: Vec<_> = sent.iter().filter(|m| m.to == student.email).collect();
            assert_eq!(notices.len(), 1);
            assert!(notices[0].subject.starts_with("Overdue"));
        }
    }
}
