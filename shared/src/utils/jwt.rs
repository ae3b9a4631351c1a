use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::models::claims::TokenClaims;

#[derive(Debug, Error, PartialEq)]
pub enum JwtError {
    #[error("Token invalid atau expired")]
    InvalidToken,

    #[error("JWT secret kosong")]
    MissingSecret,

    #[error("Token type tidak valid untuk endpoint ini")]
    InvalidTokenType,
}

/// Validate access token dengan secret dari konfigurasi service
pub fn validate_access_token(token: &str, secret: &str) -> Result<TokenClaims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::MissingSecret);
    }

    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("JWT decode gagal: {}", e);
        JwtError::InvalidToken
    })?;

    // Business services hanya terima access token
    if !token_data.claims.is_access_token() {
        tracing::warn!("Token type '{}' ditolak untuk user {}", token_data.claims.token_type, token_data.claims.sub);
        return Err(JwtError::InvalidTokenType);
    }

    Ok(token_data.claims)
}
