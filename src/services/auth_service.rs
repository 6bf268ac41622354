use crate::{
    config::JwtConfig,
    database::MongoDB,
    models::{Role, User, UserResponse, USERS},
    utils::{error::is_duplicate_key, ids::parse_object_id, time::now_ts, AppError},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id (hex ObjectId)
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<ObjectId, AppError> {
        parse_object_id(&self.sub, "user")
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Registration fields after trimming and normalisation.
#[derive(Debug, PartialEq, Validate)]
pub struct NewAccount {
    pub full_name: String,
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

pub fn normalize_registration(request: &RegisterRequest) -> Result<NewAccount, AppError> {
    let full_name = request.full_name.as_deref().map(str::trim).unwrap_or("");
    let email = request
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    let password = request.password.clone().unwrap_or_default();

    if full_name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::InvalidRequest("All fields are required".to_string()));
    }
    let username = match request.username.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u.to_lowercase(),
        _ => email.split('@').next().unwrap_or_default().to_string(),
    };

    let account = NewAccount {
        full_name: full_name.to_string(),
        username,
        email,
        password,
    };
    account.validate()?;
    if account.username.chars().any(char::is_whitespace) {
        return Err(AppError::InvalidRequest("Username cannot contain spaces".to_string()));
    }
    Ok(account)
}

fn sign(claims: &Claims, secret: &str) -> Result<String, AppError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

fn build_claims(user: &User, ttl: Duration, config: &JwtConfig) -> Claims {
    let now = Utc::now();
    Claims {
        sub: user.id.map(|id| id.to_hex()).unwrap_or_default(),
        email: user.email.clone(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.audience.clone(),
        iss: config.issuer.clone(),
    }
}

pub fn generate_access_token(user: &User, config: &JwtConfig) -> Result<String, AppError> {
    let claims = build_claims(user, Duration::hours(config.access_ttl_hours), config);
    sign(&claims, &config.secret)
}

pub fn generate_refresh_token(user: &User, config: &JwtConfig) -> Result<String, AppError> {
    let claims = build_claims(user, Duration::days(config.refresh_ttl_days), config);
    sign(&claims, &config.refresh_secret)
}

fn decode_with(token: &str, secret: &str, config: &JwtConfig) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.audience.clone()]);

    let mut issuers = HashSet::new();
    issuers.insert(config.issuer.clone());
    validation.iss = Some(issuers);

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)
        .map(|data| data.claims)
        .map_err(AppError::from)
}

// Verify JWT access token
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<Claims, AppError> {
    decode_with(token, &config.secret, config)
}

pub fn verify_refresh_token(token: &str, config: &JwtConfig) -> Result<Claims, AppError> {
    decode_with(token, &config.refresh_secret, config)
}

/// Issues a fresh pair and stores the refresh token as the only valid one for the user.
async fn issue_tokens(db: &MongoDB, user: &User, config: &JwtConfig) -> Result<TokenPair, AppError> {
    let access_token = generate_access_token(user, config)?;
    let refresh_token = generate_refresh_token(user, config)?;

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "refresh_token": &refresh_token, "updated_at": now_ts() } },
        )
        .await?;

    Ok(TokenPair { access_token, refresh_token })
}

// User registration
pub async fn register(db: &MongoDB, config: &JwtConfig, request: &RegisterRequest) -> Result<AuthResponse, AppError> {
    let account = normalize_registration(request)?;
    let collection = db.collection::<User>(USERS);

    let existing = collection
        .find_one(doc! { "$or": [ { "email": &account.email }, { "username": &account.username } ] })
        .await?;
    if let Some(existing) = existing {
        let message = if existing.email == account.email {
            "Email already registered"
        } else {
            "Username already taken"
        };
        return Err(AppError::InvalidRequest(message.to_string()));
    }

    // The first account bootstraps the library
    let role = if collection.count_documents(doc! {}).await? == 0 {
        Role::SuperAdmin
    } else {
        Role::User
    };

    let now = now_ts();
    let mut user = User {
        id: None,
        full_name: account.full_name,
        username: account.username,
        email: account.email,
        password: hash(&account.password, DEFAULT_COST)?,
        role,
        is_blacklisted: false,
        email_verified: false,
        refresh_token: None,
        active_borrows_count: 0,
        created_at: now,
        updated_at: now,
    };

    let result = collection.insert_one(&user).await.map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::InvalidRequest("Email already registered".to_string())
        } else {
            AppError::from(e)
        }
    })?;
    user.id = result.inserted_id.as_object_id();

    let tokens = issue_tokens(db, &user, config).await?;

    log::info!("✅ User registered: {} (role: {})", user.email, user.role);

    Ok(AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        user: user.into(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    })
}

// User login
pub async fn login(db: &MongoDB, config: &JwtConfig, request: &LoginRequest) -> Result<AuthResponse, AppError> {
    let email = request.email.trim().to_lowercase();

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(|| AppError::InvalidRequest("Email not registered".to_string()))?;

    if user.is_blacklisted {
        return Err(AppError::Forbidden("This account has been blacklisted".to_string()));
    }

    if !verify(&request.password, &user.password)? {
        return Err(AppError::InvalidRequest("Incorrect password".to_string()));
    }

    let tokens = issue_tokens(db, &user, config).await?;

    Ok(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: user.into(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    })
}

// Refresh token (rotation: only the last issued refresh token is accepted)
pub async fn refresh(db: &MongoDB, config: &JwtConfig, request: &RefreshTokenRequest) -> Result<TokenPair, AppError> {
    let token = request
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Refresh token required".to_string()))?;

    let claims = verify_refresh_token(token, config)
        .map_err(|_| AppError::Forbidden("Invalid refresh token".to_string()))?;

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": claims.user_id()? })
        .await?
        .filter(|u| u.refresh_token.as_deref() == Some(token) && !u.is_blacklisted)
        .ok_or_else(|| AppError::Forbidden("Refresh token not valid".to_string()))?;

    issue_tokens(db, &user, config).await
}

pub async fn logout(db: &MongoDB, user_id: &ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$unset": { "refresh_token": "" }, "$set": { "updated_at": now_ts() } },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::not_found("User"));
    }
    Ok(())
}

// Get current user
pub async fn get_profile(db: &MongoDB, user_id: &ObjectId) -> Result<UserResponse, AppError> {
    db.collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| AppError::not_found("User"))
}

#[cfg(test)]
pub(crate) fn test_user(role: Role) -> User {
    User {
        id: Some(ObjectId::new()),
        full_name: "Hamza Ali".into(),
        username: "hamza".into(),
        email: "hamza@example.com".into(),
        password: String::new(),
        role,
        is_blacklisted: false,
        email_verified: false,
        refresh_token: None,
        active_borrows_count: 0,
        created_at: 0,
        updated_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use actix_web::ResponseError;

    fn request(full_name: &str, email: &str, password: &str, username: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            full_name: Some(full_name.into()),
            username: username.map(String::from),
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    #[test]
    fn test_normalize_registration() {
        let account = normalize_registration(&request(" Sara Kemal ", " Sara.K@Example.COM ", "longenough", None)).unwrap();
        assert_eq!(account.full_name, "Sara Kemal");
        assert_eq!(account.email, "sara.k@example.com");
        assert_eq!(account.username, "sara.k");

        let account = normalize_registration(&request("Sara", "sara@example.com", "longenough", Some("SaraK"))).unwrap();
        assert_eq!(account.username, "sarak");
    }

    #[test]
    fn test_registration_rejections() {
        let missing = RegisterRequest { full_name: None, username: None, email: Some("a@b.co".into()), password: Some("12345678".into()) };
        assert_eq!(normalize_registration(&missing).unwrap_err().message(), "All fields are required");

        let short = request("Sara", "sara@example.com", "short", None);
        assert!(normalize_registration(&short).unwrap_err().message().contains("at least 8"));

        for bad in ["sara", "sara@", "@example.com", "sa ra@example.com", "sara@exa mple.com"] {
            let err = normalize_registration(&request("Sara", bad, "longenough", None)).unwrap_err();
            assert_eq!(err.message(), "Invalid email address", "{}", bad);
        }

        let spaced = request("Sara", "sara@example.com", "longenough", Some("sara k"));
        assert!(normalize_registration(&spaced).is_err());
    }

    #[test]
    fn test_password_length_counts_characters() {
        // eight multi-byte characters pass, seven do not
        assert!(normalize_registration(&request("Sara", "sara@example.com", "ሰላምሰላምሰ", None)).is_err());
        assert!(normalize_registration(&request("Sara", "sara@example.com", "ሰላምሰላምሰላ", None)).is_ok());

        let err = normalize_registration(&request("Sara", "sara@example.com", "1234567", None)).unwrap_err();
        assert_eq!(err.message(), "Password must be at least 8 characters");
        assert_eq!(ResponseError::status_code(&err), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_access_token_roundtrip() {
        let config = test_config();
        let user = test_user(Role::Admin);

        let token = generate_access_token(&user, &config.jwt).unwrap();
        let claims = verify_token(&token, &config.jwt).unwrap();

        assert_eq!(claims.sub, user.id.unwrap().to_hex());
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.user_id().unwrap(), user.id.unwrap());
        assert!(claims.is_staff());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_access_and_refresh_tokens_are_not_interchangeable() {
        let config = test_config();
        let user = test_user(Role::User);

        let refresh = generate_refresh_token(&user, &config.jwt).unwrap();
        assert!(verify_token(&refresh, &config.jwt).is_err());
        assert!(verify_refresh_token(&refresh, &config.jwt).is_ok());

        let access = generate_access_token(&user, &config.jwt).unwrap();
        assert!(verify_refresh_token(&access, &config.jwt).is_err());
    }

    #[test]
    fn test_token_from_other_issuer_rejected() {
        let config = test_config();
        let mut other = config.jwt.clone();
        other.issuer = "someone-else".into();

        let token = generate_access_token(&test_user(Role::User), &other).unwrap();
        let err = verify_token(&token, &config.jwt).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = test_config();
        let mut jwt = config.jwt.clone();
        jwt.access_ttl_hours = -2;

        let token = generate_access_token(&test_user(Role::User), &jwt).unwrap();
        assert!(verify_token(&token, &config.jwt).is_err());
    }
}
