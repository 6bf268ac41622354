pub mod book;
pub mod book_review;
pub mod borrow;
pub mod favorite;
pub mod feedback;
pub mod membership;
pub mod payment;
pub mod settings;
pub mod user;

pub use book::*;
pub use book_review::*;
pub use borrow::*;
pub use favorite::*;
pub use feedback::*;
pub use membership::*;
pub use payment::*;
pub use settings::*;
pub use user::*;
