use crate::models::user::UserSummary;
use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const MEMBERSHIPS: &str = "memberships";

/// Hours a verification link stays valid.
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum MembershipStatus {
    Pending,
    Active,
    Rejected,
    Expired,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "Pending",
            MembershipStatus::Active => "Active",
            MembershipStatus::Rejected => "Rejected",
            MembershipStatus::Expired => "Expired",
        }
    }

    /// Rejected or expired applicants may apply again; pending and active ones may not.
    pub fn allows_reapply(&self) -> bool {
        matches!(self, MembershipStatus::Rejected | MembershipStatus::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
}

impl PaymentMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

/// Membership subscription (stored in MongoDB, one per user)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub id_card_image: Option<String>,
    pub payment_image: Option<String>,
    #[serde(default)]
    pub payment_reference: Option<String>,
    pub payment_amount: f64,
    pub payment_method: PaymentMethod,
    pub status: MembershipStatus,
    #[serde(default)]
    pub expiry_date: Option<i64>,
    #[serde(default)]
    pub last_payment_date: Option<i64>,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token_expiry: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Membership {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiry_date.map_or(false, |expiry| expiry < now)
    }
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ApproveMembershipRequest {
    pub expiry_months: Option<u32>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MembershipResponse {
    pub id: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserSummary>,
    pub id_card_image: Option<String>,
    pub payment_image: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_amount: f64,
    pub payment_method: PaymentMethod,
    pub status: MembershipStatus,
    pub expiry_date: Option<i64>,
    pub last_payment_date: Option<i64>,
    pub is_email_verified: bool,
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MembershipResponse {
    pub fn with_user(mut self, user: Option<UserSummary>) -> Self {
        self.user_info = user;
        self
    }
}

impl From<Membership> for MembershipResponse {
    fn from(m: Membership) -> Self {
        MembershipResponse {
            id: hex_id(&m.id),
            user: m.user.to_hex(),
            user_info: None,
            id_card_image: m.id_card_image,
            payment_image: m.payment_image,
            payment_reference: m.payment_reference,
            payment_amount: m.payment_amount,
            payment_method: m.payment_method,
            status: m.status,
            expiry_date: m.expiry_date,
            last_payment_date: m.last_payment_date,
            is_email_verified: m.is_email_verified,
            rejection_reason: m.rejection_reason,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}
