use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};

use crate::config::AppState;
use crate::domain::payment::CreateQrisRequest;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Buat atau pakai ulang charge QRIS untuk order
#[utoipa::path(
    post,
    path = "/payments/qris",
    tag = "payments",
    summary = "Charge QRIS",
    description = "Idempotent per order: QR yang masih berlaku dikembalikan tanpa charge baru",
    request_body = CreateQrisRequest,
    responses(
        (status = 200, description = "Transaksi QRIS", body = serde_json::Value),
        (status = 400, description = "Order bukan QRIS atau tidak menunggu pembayaran"),
        (status = 403, description = "Order milik user lain"),
        (status = 502, description = "Payment gateway error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_qris_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateQrisRequest>,
) -> Result<Json<Value>, AppError> {
    let transaction = state
        .pipeline
        .create_or_reuse_qris_charge(auth.user_id, request.order_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "order_id": transaction.order_id,
            "midtrans_order_id": transaction.midtrans_order_id,
            "transaction_id": transaction.midtrans_transaction_id,
            "gross_amount": transaction.gross_amount,
            "qr_url": transaction.qr_url,
            "status": transaction.status,
            "expired_at": transaction.expired_at,
            "client_key": state.config.midtrans.client_key
        }
    })))
}

/// Notifikasi HTTP dari Midtrans
#[utoipa::path(
    post,
    path = "/payments/webhook",
    tag = "payments",
    summary = "Webhook payment gateway",
    description = "Selalu membalas 200 {\"status\":\"ok\"}; kegagalan proses hanya dicatat di log",
    request_body = crate::domain::payment::MidtransNotification,
    responses(
        (status = 200, description = "Notifikasi diterima", body = serde_json::Value)
    )
)]
pub async fn payment_webhook(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    receive_notification(&state, &body).await
}

/// Endpoint notifikasi khusus Midtrans (alias webhook)
#[utoipa::path(
    post,
    path = "/payments/midtrans/notification",
    tag = "payments",
    summary = "Midtrans HTTP notification",
    request_body = crate::domain::payment::MidtransNotification,
    responses(
        (status = 200, description = "Notifikasi diterima", body = serde_json::Value)
    )
)]
pub async fn midtrans_notification(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    receive_notification(&state, &body).await
}

async fn receive_notification(state: &AppState, body: &[u8]) -> (StatusCode, Json<Value>) {
    match serde_json::from_slice::<Value>(body) {
        Ok(payload) => {
            // Task terpisah: koneksi gateway yang putus tidak memotong rekonsiliasi di tengah jalan
            let pipeline = state.pipeline.clone();
            let processing = tokio::spawn(async move { pipeline.acknowledge(payload).await });
            if let Err(e) = processing.await {
                tracing::error!("❌ Task rekonsiliasi webhook gagal: {}", e);
            }
        }
        Err(e) => tracing::warn!("⚠️ Body webhook bukan JSON valid: {}", e),
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Admin menarik status transaksi terbaru dari Midtrans
#[utoipa::path(
    post,
    path = "/admin/orders/{id}/payment-sync",
    tag = "admin",
    summary = "Sinkronisasi status pembayaran",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    responses(
        (status = 200, description = "Hasil rekonsiliasi", body = serde_json::Value),
        (status = 403, description = "Bukan admin"),
        (status = 404, description = "Transaksi QRIS tidak ditemukan"),
        (status = 502, description = "Payment gateway error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sync_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    auth.require_admin()?;
    let outcome = state.pipeline.sync_from_gateway(id).await?;
    let view = state.orders.payment_status(auth.actor(), id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{:?}", outcome),
        "data": view
    })))
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service sehat", body = serde_json::Value),
        (status = 503, description = "Database tidak bisa dihubungi")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let health = state.health_check().await;
    let status = if health.database == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "service": "order-service",
            "status": health.overall,
            "database": health.database,
            "version": health.version
        })),
    )
}
