pub mod auth_service;
pub mod book_review_service;
pub mod book_service;
pub mod borrow_service;
pub mod email_service;
pub mod favorite_service;
pub mod feedback_service;
pub mod membership_service;
pub mod payment_service;
pub mod settings_service;
pub mod stats_service;
pub mod upload_service;
pub mod user_service;
