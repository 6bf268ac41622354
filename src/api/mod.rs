pub mod admin;
pub mod auth;
pub mod book_reviews;
pub mod books;
pub mod borrows;
pub mod favorites;
pub mod feedback;
pub mod health;
pub mod memberships;
pub mod metrics;
pub mod payments;
pub mod settings;
pub mod swagger;
pub mod users;

use crate::middleware::AuthMiddleware;
use actix_web::{guard, web};

/// Every `/api` route. Public reads are registered as GET-guarded scopes ahead
/// of the authenticated scope sharing the same prefix.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Auth & user administration
        .service(
            web::scope("/api/auth")
                .route("/register", web::post().to(auth::register))
                .route("/login", web::post().to(auth::login))
                .route("/refresh", web::post().to(auth::refresh_token))
                .route("/verify", web::get().to(auth::verify_token))
                .service(
                    web::resource("/logout")
                        .wrap(AuthMiddleware)
                        .route(web::post().to(auth::logout))
                )
                .service(
                    web::resource("/profile")
                        .wrap(AuthMiddleware)
                        .route(web::get().to(auth::profile))
                )
                .service(
                    web::scope("/users")
                        .wrap(AuthMiddleware)
                        .route("", web::get().to(users::list_users))
                        .route("/{id}", web::delete().to(users::delete_user))
                        .route("/{id}/role", web::put().to(users::update_role))
                        .route("/{id}/blacklist", web::put().to(users::toggle_blacklist))
                )
        )

        // Books: catalog reads are public
        .service(
            web::scope("/api/books")
                .guard(guard::Get())
                .route("", web::get().to(books::list_books))
                .route("/{id}", web::get().to(books::get_book))
        )
        .service(
            web::scope("/api/books")
                .wrap(AuthMiddleware)
                .route("", web::post().to(books::add_book))
                .route("/multiple", web::post().to(books::add_multiple_books))
                .route("/{id}", web::put().to(books::update_book))
                .route("/{id}", web::delete().to(books::delete_book))
                .route("/{id}/comments", web::post().to(books::add_comment))
                .route("/{id}/ratings", web::post().to(books::rate_book))
        )

        // Borrows
        .service(
            web::scope("/api/borrow")
                .wrap(AuthMiddleware)
                .route("", web::post().to(borrows::borrow_book))
                .route("", web::get().to(borrows::list_borrows))
                .route("/request", web::post().to(borrows::request_borrow))
                .route("/return/{id}", web::put().to(borrows::return_book))
                .route("/my", web::get().to(borrows::my_borrows))
                .route("/{id}", web::get().to(borrows::get_borrow))
                .route("/{id}/approve", web::put().to(borrows::approve_borrow))
                .route("/{id}/reject", web::put().to(borrows::reject_borrow))
        )

        // Membership: the emailed verification link carries no token
        .route(
            "/api/membership/verify-email/{token}",
            web::get().to(memberships::verify_email),
        )
        .service(
            web::scope("/api/membership")
                .wrap(AuthMiddleware)
                .route("/request", web::post().to(memberships::request_membership))
                .route("/status", web::get().to(memberships::membership_status))
                .route("/admin/all", web::get().to(memberships::list_memberships))
                .route("/admin/approve/{id}", web::put().to(memberships::approve_membership))
                .route("/admin/reject/{id}", web::put().to(memberships::reject_membership))
                .route("/admin/delete/{id}", web::delete().to(memberships::delete_membership))
        )

        // Payments
        .service(
            web::scope("/api/payments")
                .wrap(AuthMiddleware)
                .route("", web::post().to(payments::submit_payment))
                .route("", web::get().to(payments::list_payments))
                .route("/my", web::get().to(payments::my_payments))
                .route("/{id}", web::put().to(payments::update_payment_status))
        )

        // Settings
        .service(
            web::scope("/api/settings")
                .guard(guard::Get())
                .route("", web::get().to(settings::get_settings))
        )
        .service(
            web::scope("/api/settings")
                .wrap(AuthMiddleware)
                .route("", web::put().to(settings::update_settings))
        )

        // Favorites & feedback
        .service(
            web::scope("/api/favorites")
                .wrap(AuthMiddleware)
                .route("", web::post().to(favorites::add_favorite))
                .route("", web::get().to(favorites::list_favorites))
                .route("/item/{id}", web::get().to(favorites::get_favorite))
                .route("/{book_id}", web::delete().to(favorites::remove_favorite))
        )
        .service(
            web::scope("/api/feedback")
                .wrap(AuthMiddleware)
                .route("", web::post().to(feedback::submit_feedback))
                .route("", web::get().to(feedback::list_feedback))
        )

        // Book review events
        .service(
            web::scope("/api/book-reviews")
                .guard(guard::Get())
                .route("", web::get().to(book_reviews::list_events))
        )
        .service(
            web::scope("/api/book-reviews")
                .wrap(AuthMiddleware)
                .route("", web::post().to(book_reviews::create_event))
                .route("/{id}", web::delete().to(book_reviews::delete_event))
        )

        // Admin dashboard
        .service(
            web::scope("/api/admin")
                .wrap(AuthMiddleware)
                .route("/stats", web::get().to(admin::dashboard_stats))
        );
}
