use crate::{
    database::MongoDB,
    models::{Book, Borrow, BorrowStatus, Membership, MembershipStatus, User, BOOKS, BORROWS, MEMBERSHIPS, USERS},
    utils::AppError,
};
use mongodb::bson::doc;
use serde::Serialize;
use std::future::IntoFuture;

#[derive(Debug, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LibraryStats {
    pub total_books: u64,
    pub total_users: u64,
    /// Borrowed and Overdue records.
    pub borrowed_count: u64,
    pub overdue_count: u64,
    pub pending_borrows: u64,
    pub pending_memberships: u64,
    pub active_memberships: u64,
}

pub async fn dashboard_stats(db: &MongoDB) -> Result<LibraryStats, AppError> {
    let books = db.collection::<Book>(BOOKS);
    let users = db.collection::<User>(USERS);
    let borrows = db.collection::<Borrow>(BORROWS);
    let memberships = db.collection::<Membership>(MEMBERSHIPS);

    let (total_books, total_users, borrowed_count, overdue_count, pending_borrows, pending_memberships, active_memberships) =
        tokio::try_join!(
            books.count_documents(doc! {}).into_future(),
            users.count_documents(doc! {}).into_future(),
            borrows
                .count_documents(doc! {
                    "status": { "$in": [BorrowStatus::Borrowed.as_str(), BorrowStatus::Overdue.as_str()] }
                })
                .into_future(),
            borrows.count_documents(doc! { "status": BorrowStatus::Overdue.as_str() }).into_future(),
            borrows.count_documents(doc! { "status": BorrowStatus::Pending.as_str() }).into_future(),
            memberships.count_documents(doc! { "status": MembershipStatus::Pending.as_str() }).into_future(),
            memberships.count_documents(doc! { "status": MembershipStatus::Active.as_str() }).into_future(),
        )?;

    Ok(LibraryStats {
        total_books,
        total_users,
        borrowed_count,
        overdue_count,
        pending_borrows,
        pending_memberships,
        active_memberships,
    })
}
