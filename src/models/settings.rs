use serde::{Deserialize, Serialize};

pub const SETTINGS: &str = "settings";

/// Global library settings (single document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct Settings {
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_holder: Option<String>,

    pub membership_fee: f64,
    /// Months
    pub membership_duration: u32,
    pub max_borrow_limit: i32,
    pub borrow_duration_days: i32,
    pub late_fee_per_day: f64,
    pub pay_per_borrow_enabled: bool,

    pub notify_before_days: i32,
    pub notifications_enabled: bool,

    pub updated_at: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bank_name: None,
            account_number: None,
            account_holder: None,
            membership_fee: 0.0,
            membership_duration: 6,
            max_borrow_limit: 3,
            borrow_duration_days: 14,
            late_fee_per_day: 0.0,
            pay_per_borrow_enabled: false,
            notify_before_days: 3,
            notifications_enabled: true,
            updated_at: 0,
        }
    }
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateSettingsRequest {
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_holder: Option<String>,
    pub membership_fee: Option<f64>,
    pub membership_duration: Option<u32>,
    pub max_borrow_limit: Option<i32>,
    pub borrow_duration_days: Option<i32>,
    pub late_fee_per_day: Option<f64>,
    pub pay_per_borrow_enabled: Option<bool>,
    pub notify_before_days: Option<i32>,
    pub notifications_enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"max_borrow_limit": 5}"#).unwrap();
        assert_eq!(settings.max_borrow_limit, 5);
        assert_eq!(settings.borrow_duration_days, 14);
        assert_eq!(settings.membership_duration, 6);
        assert!(settings.notifications_enabled);
        assert!(!settings.pay_per_borrow_enabled);
    }
}
