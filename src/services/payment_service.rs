use crate::{
    database::MongoDB,
    models::{
        Borrow, Payment, PaymentKind, PaymentMethod, PaymentResponse, PaymentStatus, BORROWS, PAYMENTS,
    },
    services::{upload_service::UploadForm, user_service},
    utils::{ids::parse_object_id, time::now_ts, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::ReturnDocument;

pub const SCREENSHOT_FIELD: &str = "screenshot";

/// Validated text fields of a payment submission.
#[derive(Debug, PartialEq)]
pub struct PaymentFields {
    pub amount: f64,
    pub method: PaymentMethod,
    pub kind: PaymentKind,
    pub reference: Option<String>,
    pub borrow: Option<ObjectId>,
    pub description: Option<String>,
}

pub fn parse_payment_fields(form: &UploadForm) -> Result<PaymentFields, AppError> {
    let amount: f64 = form
        .text("amount")
        .ok_or_else(|| AppError::InvalidRequest("Amount is required".to_string()))?
        .parse()
        .ok()
        .filter(|a: &f64| a.is_finite() && *a > 0.0)
        .ok_or_else(|| AppError::InvalidRequest("Amount must be a positive number".to_string()))?;

    let method = match form.text("method") {
        Some(raw) => PaymentMethod::parse(raw).ok_or_else(|| {
            AppError::InvalidRequest("Payment method must be cash, card or online".to_string())
        })?,
        None => PaymentMethod::Online,
    };

    let kind = match form.text("kind") {
        Some(raw) => PaymentKind::parse(raw).ok_or_else(|| {
            AppError::InvalidRequest("Payment kind must be membership, borrow, late_fee or other".to_string())
        })?,
        None => PaymentKind::default(),
    };

    let borrow = form
        .text("borrow_id")
        .map(|id| parse_object_id(id, "borrow"))
        .transpose()?;

    Ok(PaymentFields {
        amount,
        method,
        kind,
        reference: form.text("reference").map(String::from),
        borrow,
        description: form.text("description").map(String::from),
    })
}

/// Stores the payment; the uploaded screenshot is removed if it is refused.
pub async fn submit_payment(db: &MongoDB, student: &ObjectId, form: &UploadForm) -> Result<PaymentResponse, AppError> {
    match create_payment(db, student, form).await {
        Ok(payment) => Ok(payment),
        Err(e) => {
            form.discard().await;
            Err(e)
        }
    }
}

async fn create_payment(db: &MongoDB, student: &ObjectId, form: &UploadForm) -> Result<PaymentResponse, AppError> {
    let screenshot = form.require_file(SCREENSHOT_FIELD, "Payment screenshot is required")?;
    let fields = parse_payment_fields(form)?;

    if let Some(borrow_id) = &fields.borrow {
        let owned = db
            .collection::<Borrow>(BORROWS)
            .count_documents(doc! { "_id": borrow_id, "student": student })
            .await?;
        if owned == 0 {
            return Err(AppError::not_found("Borrow record"));
        }
    }

    let now = now_ts();
    let mut payment = Payment {
        id: None,
        student: *student,
        borrow: fields.borrow,
        kind: fields.kind,
        amount: fields.amount,
        method: fields.method,
        reference: fields.reference,
        screenshot: Some(screenshot.public_path()),
        description: fields.description,
        status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let result = db.collection::<Payment>(PAYMENTS).insert_one(&payment).await?;
    payment.id = result.inserted_id.as_object_id();

    log::info!("💳 Payment of {:.2} submitted by {}", payment.amount, student.to_hex());

    Ok(payment.into())
}

async fn find_payments(db: &MongoDB, filter: Document) -> Result<Vec<Payment>, AppError> {
    let payments = db
        .collection::<Payment>(PAYMENTS)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;
    Ok(payments)
}

pub async fn my_payments(db: &MongoDB, student: &ObjectId) -> Result<Vec<PaymentResponse>, AppError> {
    let payments = find_payments(db, doc! { "student": student }).await?;
    Ok(payments.into_iter().map(PaymentResponse::from).collect())
}

pub async fn list_payments(db: &MongoDB) -> Result<Vec<PaymentResponse>, AppError> {
    let payments = find_payments(db, doc! {}).await?;

    let ids: Vec<ObjectId> = payments.iter().map(|p| p.student).collect();
    let students = user_service::user_summaries(db, &ids).await?;

    Ok(payments
        .into_iter()
        .map(|p| {
            let student = students.get(&p.student).cloned();
            PaymentResponse::from(p).with_student(student)
        })
        .collect())
}

/// Pending payments can be approved or rejected once.
pub async fn update_payment_status(db: &MongoDB, payment_id: &ObjectId, status: PaymentStatus) -> Result<PaymentResponse, AppError> {
    if status == PaymentStatus::Pending {
        return Err(AppError::InvalidRequest("Status must be Approved or Rejected".to_string()));
    }

    let collection = db.collection::<Payment>(PAYMENTS);
    let updated = collection
        .find_one_and_update(
            doc! { "_id": payment_id, "status": PaymentStatus::Pending.as_str() },
            doc! { "$set": { "status": status.as_str(), "updated_at": now_ts() } },
        )
        .return_document(ReturnDocument::After)
        .await?;

    match updated {
        Some(payment) => {
            log::info!("💳 Payment {} {}", payment_id.to_hex(), status.as_str());
            Ok(payment.into())
        }
        None => {
            let current = collection
                .find_one(doc! { "_id": payment_id })
                .await?
                .ok_or_else(|| AppError::not_found("Payment"))?;
            Err(AppError::InvalidRequest(format!(
                "Payment already {}",
                current.status.as_str().to_lowercase()
            )))
        }
    }
}
