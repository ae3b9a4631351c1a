use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::domain::order::TransitionError;
use crate::domain::payment::{MalformedCorrelationKey, PaymentError};
use crate::domain::stock::StockError;

// Struktur response error yang konsisten untuk semua endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// Enum untuk semua jenis error yang mungkin terjadi di order service
#[derive(Debug)]
pub enum AppError {
    DatabaseError(sqlx::Error),
    ValidationError(String),
    UnauthorizedError(String),
    ForbiddenError(String),
    NotFoundError(String),
    ConflictError(String),
    Stock(StockError),
    Transition(TransitionError),
    Payment(PaymentError),
    Correlation(MalformedCorrelationKey),
    MidtransError(String),
    InternalError(String),
    HttpClientError(reqwest::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::UnauthorizedError(msg) => write!(f, "Unauthorized error: {}", msg),
            AppError::ForbiddenError(msg) => write!(f, "Forbidden error: {}", msg),
            AppError::NotFoundError(msg) => write!(f, "Not found: {}", msg),
            AppError::ConflictError(msg) => write!(f, "Conflict: {}", msg),
            AppError::Stock(e) => write!(f, "Stock error: {}", e),
            AppError::Transition(e) => write!(f, "Transition error: {}", e),
            AppError::Payment(e) => write!(f, "Payment error: {}", e),
            AppError::Correlation(e) => write!(f, "Correlation error: {}", e),
            AppError::MidtransError(msg) => write!(f, "Midtrans error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::HttpClientError(e) => write!(f, "HTTP client error: {}", e),
        }
    }
}

impl std::error::Error for AppError {}

// Konversi dari sqlx::Error ke AppError
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

// Konversi dari reqwest::Error ke AppError
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpClientError(err)
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::ProductNotFound(id) => AppError::NotFoundError(format!("Produk {} tidak ditemukan", id)),
            other => AppError::Stock(other),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::Transition(err)
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::Payment(err)
    }
}

impl From<MalformedCorrelationKey> for AppError {
    fn from(err: MalformedCorrelationKey) -> Self {
        AppError::Correlation(err)
    }
}

fn debug_details(msg: String) -> Option<String> {
    if cfg!(debug_assertions) {
        Some(msg)
    } else {
        None
    }
}

// Implementasi IntoResponse untuk AppError agar bisa langsung digunakan sebagai response di axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match &self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Terjadi kesalahan pada database".to_string(),
                    debug_details(e.to_string()),
                )
            }
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone(), None),
            AppError::UnauthorizedError(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone(), None),
            AppError::ForbiddenError(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            AppError::ConflictError(msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, "conflict", msg.clone(), None)
            }
            AppError::Stock(e) => {
                let error_type = match e {
                    StockError::InsufficientStock { .. } => "insufficient_stock",
                    StockError::CounterOverflow { .. } => "stock_overflow",
                    StockError::InvalidQuantity(_) | StockError::ProductNotFound(_) => "invalid_stock_request",
                };
                (StatusCode::BAD_REQUEST, error_type, e.to_string(), None)
            }
            AppError::Transition(e) => {
                let error_type = match e {
                    TransitionError::InvalidTransition { .. } => "invalid_transition",
                    TransitionError::OrderTerminal { .. } => "order_terminal",
                    TransitionError::TrackingNumberRequired => "tracking_number_required",
                };
                (
                    StatusCode::BAD_REQUEST,
                    error_type,
                    "Status order tidak bisa diubah ke status tersebut".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Payment(e) => {
                tracing::warn!("Payment error: {}", e);
                (StatusCode::BAD_REQUEST, "payment_error", e.to_string(), None)
            }
            AppError::Correlation(e) => (StatusCode::BAD_REQUEST, "malformed_correlation_key", e.to_string(), None),
            AppError::MidtransError(msg) => {
                tracing::error!("Midtrans error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "payment_gateway_error",
                    "Terjadi kesalahan pada payment gateway".to_string(),
                    debug_details(msg.clone()),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Terjadi kesalahan internal server".to_string(),
                    debug_details(msg.clone()),
                )
            }
            AppError::HttpClientError(e) => {
                tracing::error!("HTTP client error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "http_client_error",
                    "Terjadi kesalahan komunikasi dengan payment gateway".to_string(),
                    debug_details(e.to_string()),
                )
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(error_response)).into_response()
    }
}

// Helper functions untuk membuat error dengan mudah
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFoundError(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::ConflictError(msg.into())
    }

    pub fn midtrans(msg: impl Into<String>) -> Self {
        AppError::MidtransError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::InternalError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::UnauthorizedError(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::ForbiddenError(msg.into())
    }
}

// Type alias untuk Result dengan AppError sebagai error type
pub type AppResult<T> = Result<T, AppError>;
