use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::domain::order::{Money, PaymentMethod};

// Status payment internal (1:1 dengan order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Success => write!(f, "success"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

// Hasil evaluasi update status payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentUpdate {
    Apply(PaymentStatus),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment {from} tidak boleh diturunkan ke {to}")]
    IllegalPaymentDowngrade { from: PaymentStatus, to: PaymentStatus },

    #[error("Payment berstatus {0} tidak bisa direfund")]
    NotRefundable(PaymentStatus),
}

impl PaymentStatus {
    /// Transisi payment dari notifikasi gateway. Success dan Refunded adalah sink.
    pub fn reconcile(self, target: PaymentStatus) -> Result<PaymentUpdate, PaymentError> {
        use PaymentStatus::*;

        match (self, target) {
            (current, target) if current == target => Ok(PaymentUpdate::Unchanged),
            (Success, Failed) => Err(PaymentError::IllegalPaymentDowngrade { from: Success, to: Failed }),
            (Success, _) | (Refunded, _) => Ok(PaymentUpdate::Unchanged),
            (Pending, Success) | (Pending, Failed) => Ok(PaymentUpdate::Apply(target)),
            // Settlement terlambat setelah expire: uang sudah masuk, tetap dicatat
            (Failed, Success) => Ok(PaymentUpdate::Apply(Success)),
            (Failed, Pending) => Ok(PaymentUpdate::Unchanged),
            // Refund hanya lewat jalur admin
            (_, Refunded) => Ok(PaymentUpdate::Unchanged),
            _ => Ok(PaymentUpdate::Unchanged),
        }
    }

    /// Refund manual oleh admin, hanya dari Success
    pub fn refund(self) -> Result<PaymentStatus, PaymentError> {
        match self {
            PaymentStatus::Success => Ok(PaymentStatus::Refunded),
            other => Err(PaymentError::NotRefundable(other)),
        }
    }
}

// Status transaksi di sisi Midtrans yang disimpan lokal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Settlement,
    Expire,
    Cancel,
    Deny,
}

impl TransactionStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Settlement)
    }

    /// Status payment internal yang sesuai
    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            TransactionStatus::Pending => PaymentStatus::Pending,
            TransactionStatus::Settlement => PaymentStatus::Success,
            TransactionStatus::Expire | TransactionStatus::Cancel | TransactionStatus::Deny => {
                PaymentStatus::Failed
            }
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Settlement => "settlement",
            TransactionStatus::Expire => "expire",
            TransactionStatus::Cancel => "cancel",
            TransactionStatus::Deny => "deny",
        };
        f.write_str(s)
    }
}

// Hasil mapping vocabulary status Midtrans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Known(TransactionStatus),
    Unrecognized(String),
}

impl GatewayStatus {
    /// Mapping exact dan case-sensitive dari transaction_status + fraud_status Midtrans
    pub fn from_midtrans(transaction_status: &str, fraud_status: Option<&str>) -> Self {
        if fraud_status == Some("deny") {
            return GatewayStatus::Known(TransactionStatus::Deny);
        }

        match transaction_status {
            "capture" if fraud_status == Some("challenge") => GatewayStatus::Known(TransactionStatus::Pending),
            "capture" | "settlement" => GatewayStatus::Known(TransactionStatus::Settlement),
            "pending" => GatewayStatus::Known(TransactionStatus::Pending),
            "expire" => GatewayStatus::Known(TransactionStatus::Expire),
            "cancel" => GatewayStatus::Known(TransactionStatus::Cancel),
            "deny" | "failure" => GatewayStatus::Known(TransactionStatus::Deny),
            other => GatewayStatus::Unrecognized(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Correlation key Midtrans tidak dikenali: {0}")]
pub struct MalformedCorrelationKey(pub String);

lazy_static! {
    // ORDER-{order_id}-{timestamp}
    static ref TIMESTAMPED_KEY: Regex = Regex::new(r"^ORDER-(\d+)-(\d+)$").unwrap();
    // {order_id}-{nonce}
    static ref NONCE_KEY: Regex = Regex::new(r"^(\d+)-([A-Za-z0-9]+)$").unwrap();
}

/// Ambil order_id internal dari order_id Midtrans. Tidak menebak format lain.
pub fn parse_correlation_key(gateway_order_id: &str) -> Result<i64, MalformedCorrelationKey> {
    let captures = TIMESTAMPED_KEY
        .captures(gateway_order_id)
        .or_else(|| NONCE_KEY.captures(gateway_order_id))
        .ok_or_else(|| MalformedCorrelationKey(gateway_order_id.to_string()))?;

    captures[1]
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| MalformedCorrelationKey(gateway_order_id.to_string()))
}

/// Correlation key baru untuk setiap percobaan charge
pub fn correlation_key(order_id: i64, at: DateTime<Utc>) -> String {
    format!("ORDER-{}-{}", order_id, at.timestamp())
}

// Model data payment (1:1 dengan order)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub method: PaymentMethod,
    pub amount: Money,
    pub status: PaymentStatus,
    pub transaction_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Detail transaksi QRIS di Midtrans (1:1 dengan order, di-update in place)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentTransaction {
    pub id: i64,
    pub order_id: i64,
    pub midtrans_order_id: String,
    pub midtrans_transaction_id: Option<String>,
    pub gross_amount: Money,
    pub qr_url: Option<String>,
    pub status: TransactionStatus,
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub raw_notification: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Cek apakah QR code sudah lewat masa berlaku
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.map(|expired| now >= expired).unwrap_or(false)
    }

    /// QR masih bisa dipakai ulang tanpa charge baru
    pub fn is_reusable(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending && self.qr_url.is_some() && !self.is_expired(now)
    }
}

// Data untuk insert/update payment transaction
#[derive(Debug, Clone)]
pub struct PaymentTransactionUpsert {
    pub order_id: i64,
    pub midtrans_order_id: String,
    pub midtrans_transaction_id: Option<String>,
    pub gross_amount: Money,
    pub qr_url: Option<String>,
    pub status: TransactionStatus,
    pub expired_at: Option<DateTime<Utc>>,
}

// Payload notifikasi HTTP dari Midtrans (juga bentuk response status API)
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MidtransNotification {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub gross_amount: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub signature_key: Option<String>,
}

impl MidtransNotification {
    pub fn gateway_status(&self) -> GatewayStatus {
        GatewayStatus::from_midtrans(&self.transaction_status, self.fraud_status.as_deref())
    }

    /// Parse gross_amount string ("150000.00") ke Money
    pub fn gross_amount(&self) -> Option<Money> {
        use bigdecimal::{BigDecimal, ToPrimitive};
        use std::str::FromStr;

        let raw = self.gross_amount.as_deref()?;
        let amount = BigDecimal::from_str(raw.trim()).ok()?;
        (amount * BigDecimal::from(100)).round(0).to_i64().map(Money)
    }
}

// Request charge QRIS ke Midtrans
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrisChargeRequest {
    pub payment_type: String,
    pub transaction_details: TransactionDetails,
    pub qris: QrisOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrisOptions {
    pub acquirer: String,
}

// Hasil charge QRIS yang relevan untuk disimpan
#[derive(Debug, Clone)]
pub struct QrisCharge {
    pub transaction_id: String,
    pub qr_url: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
}

// Request buat charge QRIS untuk order
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateQrisRequest {
    #[schema(example = 1024)]
    pub order_id: i64,
}
