// JWT Authentication Middleware untuk Order Service

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use shared::utils::{jwt, token_extraction::extract_bearer_token};

use crate::{config::AppState, domain::order::Actor, error::AppError};

// Authentication context untuk user yang sudah terautentikasi
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Actor state machine sesuai role
    pub fn actor(&self) -> Actor {
        if self.is_admin() {
            Actor::Admin { user_id: self.user_id }
        } else {
            Actor::Customer { user_id: self.user_id }
        }
    }

    pub fn require_admin(&self) -> Result<Actor, AppError> {
        if self.is_admin() {
            Ok(self.actor())
        } else {
            Err(AppError::forbidden("Endpoint ini khusus admin"))
        }
    }
}

// Axum extractor implementation untuk AuthUser
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

// Path yang tidak butuh token: health check dan notifikasi gateway
fn is_public_path(path: &str) -> bool {
    path == "/health" || path.ends_with("/payments/webhook") || path.ends_with("/payments/midtrans/notification")
}

// JWT authentication middleware
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    if is_public_path(&path) {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Authorization header dengan Bearer token diperlukan"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Invalid Authorization header format"))?;

    let token = extract_bearer_token(auth_header)
        .ok_or_else(|| AppError::unauthorized("Bearer token format diperlukan"))?;

    let claims = jwt::validate_access_token(token, &state.config.jwt_secret)
        .map_err(|_| AppError::unauthorized("Token tidak valid atau expired"))?;

    let auth_user = AuthUser {
        user_id: claims.sub,
        email: claims.email.clone(),
        role: claims.role.clone(),
    };

    // Inject ke request extensions agar bisa di-extract oleh handlers
    request.extensions_mut().insert(auth_user.clone());

    tracing::debug!(
        "User authenticated - ID: {}, Email: {}, Role: {}, Endpoint: {}",
        auth_user.user_id,
        auth_user.email,
        auth_user.role,
        path
    );

    Ok(next.run(request).await)
}
