use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha512};

use crate::config::MidtransConfig;
use crate::domain::payment::{MidtransNotification, QrisCharge, QrisChargeRequest};
use crate::error::AppError;

// Midtrans mengirim expiry_time dalam waktu lokal WIB (UTC+7)
const GATEWAY_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Kontrak ke payment gateway, di-mock saat test
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge_qris(&self, request: &QrisChargeRequest) -> Result<QrisCharge, AppError>;

    /// Status transaksi terbaru versi gateway, dalam bentuk payload notifikasi
    async fn transaction_status(&self, gateway_order_id: &str) -> Result<MidtransNotification, AppError>;
}

#[derive(Debug, Deserialize)]
struct MidtransAction {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct MidtransChargeResponse {
    #[serde(default)]
    status_code: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    actions: Vec<MidtransAction>,
    #[serde(default)]
    expiry_time: Option<String>,
}

// Service untuk integrasi Midtrans Core API
pub struct MidtransService {
    client: Client,
    config: MidtransConfig,
}

impl MidtransService {
    // Buat Midtrans Service baru
    pub fn new(config: MidtransConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Encode auth credentials
    fn encode_auth(&self) -> String {
        let credentials = format!("{}:", self.config.server_key);
        format!("Basic {}", general_purpose::STANDARD.encode(credentials.as_bytes()))
    }

    fn fallback_expiry(&self) -> DateTime<Utc> {
        Utc::now() + Duration::minutes(self.config.qris_expiry_minutes)
    }
}

#[async_trait]
impl PaymentGateway for MidtransService {
    async fn charge_qris(&self, request: &QrisChargeRequest) -> Result<QrisCharge, AppError> {
        let response = self
            .client
            .post(format!("{}/v2/charge", self.config.api_url))
            .header("Authorization", self.encode_auth())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::midtrans(format!("Midtrans API error: {}", error_text)));
        }

        let charge: MidtransChargeResponse = response
            .json()
            .await
            .map_err(|e| AppError::midtrans(format!("Failed to parse Midtrans response: {}", e)))?;

        // Midtrans bisa balas HTTP 200 dengan status_code error di body
        if let Some(code) = charge.status_code.as_deref() {
            if !code.starts_with('2') {
                return Err(AppError::midtrans(format!(
                    "Midtrans menolak charge {}: {} {}",
                    request.transaction_details.order_id,
                    code,
                    charge.status_message.unwrap_or_default()
                )));
            }
        }

        let transaction_id = charge
            .transaction_id
            .ok_or_else(|| AppError::midtrans("Response charge tanpa transaction_id"))?;

        let qr_url = charge
            .actions
            .into_iter()
            .find(|action| action.name == "generate-qr-code")
            .map(|action| action.url);

        let expired_at = charge
            .expiry_time
            .as_deref()
            .and_then(parse_expiry_time)
            .unwrap_or_else(|| self.fallback_expiry());

        tracing::info!(
            "✅ QRIS charge dibuat: {} (transaction {})",
            request.transaction_details.order_id,
            transaction_id
        );

        Ok(QrisCharge {
            transaction_id,
            qr_url,
            expired_at: Some(expired_at),
        })
    }

    async fn transaction_status(&self, gateway_order_id: &str) -> Result<MidtransNotification, AppError> {
        let url = format!("{}/v2/{}/status", self.config.api_url, gateway_order_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.encode_auth())
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("❌ Midtrans status check failed: {}", error_text);
            return Err(AppError::midtrans(format!("Midtrans API error: {}", error_text)));
        }

        let status: MidtransNotification = response
            .json()
            .await
            .map_err(|e| AppError::midtrans(format!("Failed to parse Midtrans status: {}", e)))?;

        tracing::info!(
            "Midtrans status check {}: {}",
            gateway_order_id,
            status.transaction_status
        );
        Ok(status)
    }
}

/// Signature notifikasi: hex(sha512(order_id + status_code + gross_amount + server_key))
pub fn notification_signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// "2026-10-19 15:30:00" (WIB) ke UTC
pub fn parse_expiry_time(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let offset = FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
