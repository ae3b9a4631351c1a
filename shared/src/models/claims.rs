use serde::{Deserialize, Serialize};

/// JWT claims yang dipakai storefront dan dashboard admin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub sub: i32,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String,
    pub jti: String,
}

impl TokenClaims {
    /// Cek apakah token adalah access token
    pub fn is_access_token(&self) -> bool {
        self.token_type == "access"
    }

    /// Cek apakah user adalah admin toko
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
