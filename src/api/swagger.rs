use utoipa::OpenApi;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Service API",
        version = "1.0.0",
        description = "Library management backend: catalog, memberships, borrowing, payments and staff administration.\n\n**Authentication:** Most endpoints require a JWT Bearer access token obtained from `/api/auth/login`.\n\n**Uploads:** Membership, borrow and payment submissions are `multipart/form-data`; stored images are served under `/uploads`.",
        contact(
            name = "Library Service Team",
            email = "support@library-service.local"
        )
    ),
    paths(
        // Auth
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::auth::refresh_token,
        crate::api::auth::logout,
        crate::api::auth::profile,
        crate::api::auth::verify_token,

        // Users
        crate::api::users::list_users,
        crate::api::users::delete_user,
        crate::api::users::update_role,
        crate::api::users::toggle_blacklist,

        // Books
        crate::api::books::list_books,
        crate::api::books::get_book,
        crate::api::books::add_book,
        crate::api::books::add_multiple_books,
        crate::api::books::update_book,
        crate::api::books::delete_book,
        crate::api::books::add_comment,
        crate::api::books::rate_book,

        // Borrows
        crate::api::borrows::borrow_book,
        crate::api::borrows::request_borrow,
        crate::api::borrows::return_book,
        crate::api::borrows::my_borrows,
        crate::api::borrows::list_borrows,
        crate::api::borrows::get_borrow,
        crate::api::borrows::approve_borrow,
        crate::api::borrows::reject_borrow,

        // Membership
        crate::api::memberships::request_membership,
        crate::api::memberships::verify_email,
        crate::api::memberships::membership_status,
        crate::api::memberships::list_memberships,
        crate::api::memberships::approve_membership,
        crate::api::memberships::reject_membership,
        crate::api::memberships::delete_membership,

        // Payments
        crate::api::payments::submit_payment,
        crate::api::payments::my_payments,
        crate::api::payments::list_payments,
        crate::api::payments::update_payment_status,

        // Settings
        crate::api::settings::get_settings,
        crate::api::settings::update_settings,

        // Favorites & feedback
        crate::api::favorites::add_favorite,
        crate::api::favorites::list_favorites,
        crate::api::favorites::remove_favorite,
        crate::api::favorites::get_favorite,
        crate::api::feedback::submit_feedback,
        crate::api::feedback::list_feedback,

        // Book review events
        crate::api::book_reviews::list_events,
        crate::api::book_reviews::create_event,
        crate::api::book_reviews::delete_event,

        // Admin
        crate::api::admin::dashboard_stats,

        // Health & Metrics
        crate::api::health::health_check,
        crate::api::metrics::get_metrics,
    ),
    components(
        schemas(
            // Auth & users
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::RefreshTokenRequest,
            crate::services::auth_service::AuthResponse,
            crate::services::auth_service::TokenPair,
            crate::models::Role,
            crate::models::UserResponse,
            crate::models::UserSummary,
            crate::models::UpdateRoleRequest,
            crate::models::BlacklistRequest,

            // Books
            crate::models::Category,
            crate::models::CategoryType,
            crate::models::Language,
            crate::models::Copies,
            crate::models::CreateBookRequest,
            crate::models::UpdateBookRequest,
            crate::models::CommentRequest,
            crate::models::RatingRequest,
            crate::models::CommentResponse,
            crate::models::BookResponse,

            // Borrows & payments
            crate::models::BorrowStatus,
            crate::models::BorrowDuration,
            crate::models::BorrowRequest,
            crate::models::RejectRequest,
            crate::models::BorrowResponse,
            crate::models::PaymentStatus,
            crate::models::PaymentKind,
            crate::models::PaymentMethod,
            crate::models::UpdatePaymentStatusRequest,
            crate::models::PaymentResponse,

            // Membership
            crate::models::MembershipStatus,
            crate::models::ApproveMembershipRequest,
            crate::models::MembershipResponse,
            crate::services::membership_service::DeletedFiles,

            // Settings, favorites, feedback, events
            crate::models::Settings,
            crate::models::UpdateSettingsRequest,
            crate::models::FavoriteRequest,
            crate::models::FavoriteResponse,
            crate::models::FeedbackRequest,
            crate::models::FeedbackResponse,
            crate::models::Audience,
            crate::models::CreateBookReviewRequest,
            crate::models::BookReviewResponse,
            crate::services::stats_service::LibraryStats,

            // Health & Metrics
            crate::api::health::HealthResponse,
            crate::api::metrics::MetricsResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login, token refresh and profile."),
        (name = "Users", description = "Staff user administration: roles, blacklist and deletion."),
        (name = "Books", description = "Catalog browsing (public) and management (staff), comments and ratings."),
        (name = "Borrows", description = "Borrowing lifecycle: request, approval, return and overdue tracking."),
        (name = "Membership", description = "Membership applications, email verification and staff review."),
        (name = "Payments", description = "Payment submissions with screenshot and staff review."),
        (name = "Settings", description = "Library-wide settings such as fees and borrow limits."),
        (name = "Favorites", description = "Per-user favorite books."),
        (name = "Feedback", description = "User feedback for the library staff."),
        (name = "Book Reviews", description = "Book review events."),
        (name = "Admin", description = "Dashboard statistics."),
        (name = "Health", description = "Health check and request metrics."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token from /api/auth/login"))
                        .build()
                ),
            );
        }
    }
}
