use crate::{
    config::AppConfig,
    database::MongoDB,
    models::{Role, User, USERS},
    services::auth_service::{verify_token, Claims},
    utils::AppError,
};
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use mongodb::bson::doc;
use std::future::{ready, Ready};
use std::rc::Rc;

/// Requires a valid bearer access token of an existing, non-blacklisted user
/// and stores its `Claims` (with the role as currently stored) in the request extensions.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service: Rc::new(service) }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let claims = authenticate(&req).await.map_err(|e| {
                log::debug!("🔒 {} {} rejected: {}", req.method(), req.path(), e);
                e
            })?;
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(req: &ServiceRequest) -> Result<Claims, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;

    let config = req
        .app_data::<web::Data<AppConfig>>()
        .ok_or_else(|| AppError::Internal("Auth configuration missing".to_string()))?;

    let claims = verify_token(token, &config.jwt)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let db = req
        .app_data::<web::Data<MongoDB>>()
        .ok_or_else(|| AppError::Internal("Database not configured".to_string()))?;

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    if user.is_blacklisted {
        return Err(AppError::Forbidden("This account has been blacklisted".to_string()));
    }

    Ok(Claims {
        email: user.email,
        role: user.role,
        ..claims
    })
}

pub fn require_staff(claims: &Claims) -> Result<(), AppError> {
    if claims.role.is_staff() {
        Ok(())
    } else {
        Err(AppError::access_denied())
    }
}

pub fn require_super_admin(claims: &Claims) -> Result<(), AppError> {
    if claims.role == Role::SuperAdmin {
        Ok(())
    } else {
        Err(AppError::access_denied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use actix_web::test::{init_service, TestRequest};
    use actix_web::{http::StatusCode, App, HttpResponse};

    fn claims(role: Role) -> Claims {
        Claims {
            sub: String::new(),
            email: String::new(),
            role,
            iat: 0,
            exp: 0,
            jti: String::new(),
            aud: String::new(),
            iss: String::new(),
        }
    }

    #[test]
    fn test_role_guards() {
        assert!(require_staff(&claims(Role::Admin)).is_ok());
        assert!(require_staff(&claims(Role::User)).is_err());
        assert!(require_super_admin(&claims(Role::SuperAdmin)).is_ok());
        assert_eq!(require_super_admin(&claims(Role::Admin)).unwrap_err().message(), "Access denied");
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[actix_web::test]
    async fn test_rejects_missing_and_invalid_tokens() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .service(
                    web::scope("/api/private")
                        .wrap(AuthMiddleware)
                        .route("", web::get().to(|| async { HttpResponse::Ok().finish() })),
                ),
        )
        .await;

        let missing = TestRequest::get().uri("/api/private").to_request();
        let err = app.call(missing).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);

        let forged = TestRequest::get()
            .uri("/api/private")
            .insert_header((AUTHORIZATION, "Bearer not-a-jwt"))
            .to_request();
        let err = app.call(forged).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }
}
