use crate::{
    database::MongoDB,
    models::{
        Borrow, BorrowStatus, Favorite, Feedback, Membership, Role, User, UserResponse, UserSummary,
        BORROWS, FAVORITES, FEEDBACK, MEMBERSHIPS, USERS,
    },
    services::{auth_service::Claims, upload_service::delete_file_if_exists},
    utils::{time::now_ts, AppError},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use std::collections::HashMap;
use std::path::Path;

pub async fn find_user(db: &MongoDB, user_id: &ObjectId) -> Result<User, AppError> {
    db.collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Name/email of each referenced user, keyed by id; unknown ids are simply absent.
pub async fn user_summaries(db: &MongoDB, ids: &[ObjectId]) -> Result<HashMap<ObjectId, UserSummary>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users: Vec<User> = db
        .collection::<User>(USERS)
        .find(doc! { "_id": { "$in": ids.to_vec() } })
        .await?
        .try_collect()
        .await?;

    Ok(users
        .iter()
        .filter_map(|u| u.id.map(|id| (id, UserSummary::from(u))))
        .collect())
}

pub async fn list_users(db: &MongoDB) -> Result<Vec<UserResponse>, AppError> {
    let users: Vec<User> = db
        .collection::<User>(USERS)
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(users.into_iter().map(UserResponse::from).collect())
}

fn check_target(actor: &Claims, target: &User, action: &str) -> Result<(), AppError> {
    if target.id.map(|id| id.to_hex()).as_deref() == Some(actor.sub.as_str()) {
        return Err(AppError::InvalidRequest(format!("You cannot {} yourself", action)));
    }
    if target.role == Role::SuperAdmin && actor.role != Role::SuperAdmin {
        return Err(AppError::Forbidden(format!("Only a super-admin can {} a super-admin", action)));
    }
    Ok(())
}

/// Removes the account with its favorites, feedback and membership (files included).
pub async fn delete_user(
    db: &MongoDB,
    upload_dir: &Path,
    actor: &Claims,
    user_id: &ObjectId,
) -> Result<(), AppError> {
    let user = find_user(db, user_id).await?;
    check_target(actor, &user, "delete")?;

    let active = db
        .collection::<Borrow>(BORROWS)
        .count_documents(doc! { "student": user_id, "status": { "$in": BorrowStatus::active_names() } })
        .await?;
    if active > 0 || user.active_borrows_count > 0 {
        return Err(AppError::Conflict("User still has active borrows".to_string()));
    }

    db.collection::<User>(USERS).delete_one(doc! { "_id": user_id }).await?;

    let favorites = db.collection::<Favorite>(FAVORITES).delete_many(doc! { "user": user_id }).await?;
    let feedback = db.collection::<Feedback>(FEEDBACK).delete_many(doc! { "user": user_id }).await?;

    if let Some(membership) = db
        .collection::<Membership>(MEMBERSHIPS)
        .find_one_and_delete(doc! { "user": user_id })
        .await?
    {
        for path in [membership.id_card_image, membership.payment_image].into_iter().flatten() {
            delete_file_if_exists(upload_dir, &path).await;
        }
    }

    log::info!(
        "🗑️  User deleted: {} ({} favorites, {} feedback removed)",
        user.email,
        favorites.deleted_count,
        feedback.deleted_count
    );

    Ok(())
}

pub async fn update_user_role(db: &MongoDB, actor: &Claims, user_id: &ObjectId, role: Role) -> Result<UserResponse, AppError> {
    if actor.role != Role::SuperAdmin {
        return Err(AppError::access_denied());
    }

    let user = find_user(db, user_id).await?;
    check_target(actor, &user, "change the role of")?;

    let updated = db
        .collection::<User>(USERS)
        .find_one_and_update(
            doc! { "_id": user_id },
            doc! { "$set": { "role": role.as_str(), "updated_at": now_ts() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    log::info!("👤 Role of {} set to {}", updated.email, role);

    Ok(updated.into())
}

/// Sets or toggles the blacklist flag; blacklisting also revokes the refresh token.
pub async fn set_blacklist(db: &MongoDB, actor: &Claims, user_id: &ObjectId, value: Option<bool>) -> Result<UserResponse, AppError> {
    let user = find_user(db, user_id).await?;
    check_target(actor, &user, "blacklist")?;

    let blacklisted = value.unwrap_or(!user.is_blacklisted);
    let mut update = doc! { "$set": { "is_blacklisted": blacklisted, "updated_at": now_ts() } };
    if blacklisted {
        update.insert("$unset", doc! { "refresh_token": "" });
    }

    let updated = db
        .collection::<User>(USERS)
        .find_one_and_update(doc! { "_id": user_id }, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    log::info!(
        "🚫 {} {}",
        updated.email,
        if blacklisted { "blacklisted" } else { "removed from blacklist" }
    );

    Ok(updated.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::test_user;

    fn claims_for(user: &User) -> Claims {
        Claims {
            sub: user.id.unwrap().to_hex(),
            email: user.email.clone(),
            role: user.role,
            iat: 0,
            exp: 0,
            jti: String::new(),
            aud: String::new(),
            iss: String::new(),
        }
    }

    #[test]
    fn test_cannot_target_yourself() {
        let admin = test_user(Role::Admin);
        let err = check_target(&claims_for(&admin), &admin, "blacklist").unwrap_err();
        assert_eq!(err.message(), "You cannot blacklist yourself");
    }

    #[test]
    fn test_admin_cannot_target_super_admin() {
        let admin = test_user(Role::Admin);
        let owner = test_user(Role::SuperAdmin);
        let err = check_target(&claims_for(&admin), &owner, "delete").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let member = test_user(Role::User);
        assert!(check_target(&claims_for(&admin), &member, "delete").is_ok());
        assert!(check_target(&claims_for(&owner), &admin, "delete").is_ok());
    }
}
