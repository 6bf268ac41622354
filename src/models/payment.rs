use crate::models::membership::PaymentMethod;
use crate::models::user::UserSummary;
use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const PAYMENTS: &str = "payments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Approved => "Approved",
            PaymentStatus::Rejected => "Rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Membership,
    Borrow,
    LateFee,
    #[default]
    Other,
}

impl PaymentKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "membership" => Some(PaymentKind::Membership),
            "borrow" => Some(PaymentKind::Borrow),
            "late_fee" => Some(PaymentKind::LateFee),
            "other" => Some(PaymentKind::Other),
            _ => None,
        }
    }
}

/// Payment submitted by a student or raised by the system (late fees)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub student: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borrow: Option<ObjectId>,
    #[serde(default)]
    pub kind: PaymentKind,
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: PaymentStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PaymentResponse {
    pub id: String,
    pub student: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_info: Option<UserSummary>,
    pub borrow: Option<String>,
    pub kind: PaymentKind,
    pub amount: f64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub screenshot: Option<String>,
    pub description: Option<String>,
    pub status: PaymentStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PaymentResponse {
    pub fn with_student(mut self, student: Option<UserSummary>) -> Self {
        self.student_info = student;
        self
    }
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        PaymentResponse {
            id: hex_id(&p.id),
            student: p.student.to_hex(),
            student_info: None,
            borrow: p.borrow.map(|b| b.to_hex()),
            kind: p.kind,
            amount: p.amount,
            method: p.method,
            reference: p.reference,
            screenshot: p.screenshot,
            description: p.description,
            status: p.status,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_string(&PaymentKind::LateFee).unwrap(), "\"late_fee\"");
        assert_eq!(PaymentKind::parse("membership"), Some(PaymentKind::Membership));
        assert_eq!(PaymentKind::parse("donation"), None);
    }
}
