use crate::utils::ids::hex_id;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const USERS: &str = "users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Role {
    #[serde(rename = "super-admin")]
    SuperAdmin,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "user")]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Admins and super-admins.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account (stored in MongoDB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub full_name: String,
    pub username: String,
    pub email: String,
    /// bcrypt hash
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_blacklisted: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Borrow slots in use (Pending + Borrowed + Overdue records).
    #[serde(default)]
    pub active_borrows_count: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_blacklisted: bool,
    pub email_verified: bool,
    pub active_borrows_count: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: hex_id(&user.id),
            full_name: user.full_name,
            username: user.username,
            email: user.email,
            role: user.role,
            is_blacklisted: user.is_blacklisted,
            email_verified: user.email_verified,
            active_borrows_count: user.active_borrows_count,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Name and email embedded in staff listings (memberships, payments, feedback).
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub full_name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: hex_id(&user.id),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Without a value the flag is toggled.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct BlacklistRequest {
    pub blacklisted: Option<bool>,
}
