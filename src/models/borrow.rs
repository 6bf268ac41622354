use crate::utils::ids::hex_id;
use crate::utils::time::{add_days, add_months, SECONDS_PER_DAY};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BORROWS: &str = "borrows";

/// Lifecycle of a borrow record.
///
/// ```text
/// Pending  -> Borrowed | Rejected
/// Borrowed -> Overdue  | Returned
/// Overdue  -> Returned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum BorrowStatus {
    Pending,
    Borrowed,
    Returned,
    Overdue,
    Rejected,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "Pending",
            BorrowStatus::Borrowed => "Borrowed",
            BorrowStatus::Returned => "Returned",
            BorrowStatus::Overdue => "Overdue",
            BorrowStatus::Rejected => "Rejected",
        }
    }

    pub fn can_transition_to(&self, next: BorrowStatus) -> bool {
        use BorrowStatus::*;
        matches!(
            (self, next),
            (Pending, Borrowed) | (Pending, Rejected) | (Borrowed, Overdue) | (Borrowed, Returned) | (Overdue, Returned)
        )
    }

    /// Statuses from which `next` is reachable; used as the status filter of conditional updates.
    pub fn sources_of(next: BorrowStatus) -> Vec<BorrowStatus> {
        BorrowStatus::ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Holds a copy and a borrow slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BorrowStatus::Pending | BorrowStatus::Borrowed | BorrowStatus::Overdue)
    }

    pub const ALL: [BorrowStatus; 5] = [
        BorrowStatus::Pending,
        BorrowStatus::Borrowed,
        BorrowStatus::Returned,
        BorrowStatus::Overdue,
        BorrowStatus::Rejected,
    ];

    pub fn active_names() -> Vec<&'static str> {
        BorrowStatus::ALL
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.as_str())
            .collect()
    }
}

impl fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loan length chosen by the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum BorrowDuration {
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "2m")]
    TwoMonths,
    #[serde(rename = "6m")]
    SixMonths,
}

impl BorrowDuration {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1w" => Some(BorrowDuration::OneWeek),
            "1m" => Some(BorrowDuration::OneMonth),
            "2m" => Some(BorrowDuration::TwoMonths),
            "6m" => Some(BorrowDuration::SixMonths),
            _ => None,
        }
    }
}

/// Due date for a loan starting at `start`; without a duration the settings default applies.
pub fn compute_due_date(start: i64, duration: Option<BorrowDuration>, default_days: i32) -> i64 {
    match duration {
        Some(BorrowDuration::OneWeek) => add_days(start, 7),
        Some(BorrowDuration::OneMonth) => add_months(start, 1),
        Some(BorrowDuration::TwoMonths) => add_months(start, 2),
        Some(BorrowDuration::SixMonths) => add_months(start, 6),
        None => add_days(start, i64::from(default_days.max(1))),
    }
}

/// Whole days past due, any started day counting as one.
pub fn late_days(due_date: i64, returned_at: i64) -> i64 {
    if returned_at <= due_date {
        return 0;
    }
    (returned_at - due_date + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

pub fn late_fee(days: i64, fee_per_day: f64) -> f64 {
    if days <= 0 || fee_per_day <= 0.0 {
        return 0.0;
    }
    ((days as f64) * fee_per_day * 100.0).round() / 100.0
}

/// Borrow record (stored in MongoDB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Borrow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub student: ObjectId,
    pub book: ObjectId,
    pub status: BorrowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<BorrowDuration>,
    #[serde(default)]
    pub borrow_date: Option<i64>,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub return_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub late_days: i64,
    #[serde(default)]
    pub late_fee: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub reminder_sent: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BorrowRequest {
    pub book_id: String,
    pub duration: Option<BorrowDuration>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BorrowQuery {
    pub status: Option<BorrowStatus>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct BorrowResponse {
    pub id: String,
    pub student: String,
    pub book: String,
    pub status: BorrowStatus,
    pub duration: Option<BorrowDuration>,
    pub borrow_date: Option<i64>,
    pub due_date: Option<i64>,
    pub return_date: Option<i64>,
    pub payment_image: Option<String>,
    pub payment_reference: Option<String>,
    pub late_days: i64,
    pub late_fee: f64,
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Borrow> for BorrowResponse {
    fn from(b: Borrow) -> Self {
        BorrowResponse {
            id: hex_id(&b.id),
            student: b.student.to_hex(),
            book: b.book.to_hex(),
            status: b.status,
            duration: b.duration,
            borrow_date: b.borrow_date,
            due_date: b.due_date,
            return_date: b.return_date,
            payment_image: b.payment_image,
            payment_reference: b.payment_reference,
            late_days: b.late_days,
            late_fee: b.late_fee,
            rejection_reason: b.rejection_reason,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn test_transitions() {
        use BorrowStatus::*;
        assert!(Pending.can_transition_to(Borrowed));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Borrowed.can_transition_to(Overdue));
        assert!(Overdue.can_transition_to(Returned));

        assert!(!Returned.can_transition_to(Returned));
        assert!(!Rejected.can_transition_to(Borrowed));
        assert!(!Pending.can_transition_to(Returned));
        assert!(!Overdue.can_transition_to(Borrowed));
    }

    #[test]
    fn test_sources_of() {
        assert_eq!(
            BorrowStatus::sources_of(BorrowStatus::Returned),
            vec![BorrowStatus::Borrowed, BorrowStatus::Overdue]
        );
        assert_eq!(BorrowStatus::sources_of(BorrowStatus::Borrowed), vec![BorrowStatus::Pending]);
        assert!(BorrowStatus::sources_of(BorrowStatus::Pending).is_empty());
    }

    #[test]
    fn test_active_statuses() {
        assert_eq!(BorrowStatus::active_names(), vec!["Pending", "Borrowed", "Overdue"]);
    }

    #[test]
    fn test_due_dates() {
        let start = ts(2026, 1, 31);
        assert_eq!(compute_due_date(start, Some(BorrowDuration::OneWeek), 14), ts(2026, 2, 7));
        assert_eq!(compute_due_date(start, Some(BorrowDuration::OneMonth), 14), ts(2026, 2, 28));
        assert_eq!(compute_due_date(start, Some(BorrowDuration::SixMonths), 14), ts(2026, 7, 31));
        assert_eq!(compute_due_date(start, None, 14), ts(2026, 2, 14));
        assert_eq!(compute_due_date(start, None, 0), ts(2026, 2, 1));
    }

    #[test]
    fn test_duration_wire_format() {
        let d: BorrowDuration = serde_json::from_str("\"2m\"").unwrap();
        assert_eq!(d, BorrowDuration::TwoMonths);
        assert_eq!(BorrowDuration::parse(" 1w "), Some(BorrowDuration::OneWeek));
        assert_eq!(BorrowDuration::parse("3y"), None);
    }

    #[test]
    fn test_late_days_and_fee() {
        let due = ts(2026, 3, 1);
        assert_eq!(late_days(due, due - 10), 0);
        assert_eq!(late_days(due, due), 0);
        assert_eq!(late_days(due, due + 60), 1);
        assert_eq!(late_days(due, due + 3 * SECONDS_PER_DAY), 3);
        assert_eq!(late_days(due, due + 3 * SECONDS_PER_DAY + 1), 4);

        assert_eq!(late_fee(0, 5.0), 0.0);
        assert_eq!(late_fee(3, 0.0), 0.0);
        assert_eq!(late_fee(3, 2.5), 7.5);
    }
}
