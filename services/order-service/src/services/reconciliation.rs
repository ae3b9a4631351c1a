use std::sync::Arc;

use chrono::Utc;

use crate::config::MidtransConfig;
use crate::domain::order::{Actor, Order, OrderStatus, PaymentMethod, TransitionError};
use crate::domain::payment::{
    correlation_key, parse_correlation_key, GatewayStatus, MidtransNotification, PaymentStatus,
    PaymentTransaction, PaymentTransactionUpsert, PaymentUpdate, QrisChargeRequest, QrisOptions,
    TransactionDetails, TransactionStatus,
};
use crate::error::{AppError, AppResult};
use crate::handlers::midtrans_service::{notification_signature, PaymentGateway};
use crate::repositories::CommerceStore;
use crate::services::order_service::OrderService;

const MAX_APPLY_ATTEMPTS: usize = 5;

/// Hasil pemrosesan satu notifikasi gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        order_id: i64,
        transaction_status: TransactionStatus,
        payment_status: PaymentStatus,
        order_status: OrderStatus,
    },
    /// Transaksi sudah settlement, update dibuang
    SettledSink { order_id: i64 },
    /// Notifikasi gagal untuk charge lama yang sudah diganti charge baru
    StaleAttempt { order_id: i64 },
    UnknownOrder { order_id: i64 },
    UnrecognizedStatus { order_id: i64, status: String },
}

// Pipeline rekonsiliasi notifikasi Midtrans ke Payment dan Order
#[derive(Clone)]
pub struct ReconciliationPipeline {
    store: Arc<dyn CommerceStore>,
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
    config: MidtransConfig,
}

impl ReconciliationPipeline {
    pub fn new(store: Arc<dyn CommerceStore>, gateway: Arc<dyn PaymentGateway>, config: MidtransConfig) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            store,
            gateway,
            config,
        }
    }

    /// Entry point webhook. Selalu selesai tanpa error; kegagalan hanya di-log.
    pub async fn acknowledge(&self, payload: serde_json::Value) -> Option<ReconcileOutcome> {
        let notification: MidtransNotification = match serde_json::from_value(payload.clone()) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!("⚠️ Payload webhook Midtrans tidak valid: {}", e);
                return None;
            }
        };

        if !self.verify_signature(&notification) {
            tracing::warn!(
                "⚠️ Signature webhook tidak valid untuk {} ({}), diabaikan",
                notification.order_id,
                notification.transaction_status
            );
            return None;
        }

        match self.process_notification(&notification, &payload).await {
            Ok(outcome) => {
                tracing::info!("📨 Webhook {} diproses: {:?}", notification.order_id, outcome);
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(
                    "❌ Webhook {} ({}) diterima tapi gagal diproses: {}",
                    notification.order_id,
                    notification.transaction_status,
                    e
                );
                None
            }
        }
    }

    pub fn verify_signature(&self, notification: &MidtransNotification) -> bool {
        let (Some(status_code), Some(gross_amount), Some(signature)) = (
            notification.status_code.as_deref(),
            notification.gross_amount.as_deref(),
            notification.signature_key.as_deref(),
        ) else {
            return false;
        };

        let expected = notification_signature(&notification.order_id, status_code, gross_amount, &self.config.server_key);
        expected.eq_ignore_ascii_case(signature)
    }

    /// Terapkan notifikasi secara idempotent. Aman untuk delivery berulang.
    pub async fn process_notification(
        &self,
        notification: &MidtransNotification,
        raw: &serde_json::Value,
    ) -> AppResult<ReconcileOutcome> {
        let order_id = parse_correlation_key(&notification.order_id)?;

        let Some(order) = self.store.find_order(order_id).await? else {
            tracing::warn!(
                "Webhook {} untuk order {} yang tidak ada, di-ack tanpa proses",
                notification.order_id,
                order_id
            );
            return Ok(ReconcileOutcome::UnknownOrder { order_id });
        };

        let transaction = self.ensure_transaction(&order, notification).await?;
        self.store.record_raw_notification(order_id, raw).await?;

        let target = match notification.gateway_status() {
            GatewayStatus::Known(status) => status,
            GatewayStatus::Unrecognized(status) => {
                tracing::warn!("Status Midtrans '{}' tidak dikenal untuk order {}, tidak ada transisi", status, order_id);
                return Ok(ReconcileOutcome::UnrecognizedStatus { order_id, status });
            }
        };

        if transaction.status.is_settled() {
            tracing::info!("Order {} sudah settlement, notifikasi {} dibuang", order_id, target);
            self.complete_settlement(&order).await?;
            return Ok(ReconcileOutcome::SettledSink { order_id });
        }

        if transaction.midtrans_order_id != notification.order_id && !target.is_settled() {
            tracing::warn!(
                "Notifikasi {} untuk charge lama {} (aktif: {}), diabaikan",
                target,
                notification.order_id,
                transaction.midtrans_order_id
            );
            return Ok(ReconcileOutcome::StaleAttempt { order_id });
        }

        let Some(transaction_status) = self
            .apply_transaction(order_id, target, notification.transaction_id.as_deref())
            .await?
        else {
            self.complete_settlement(&order).await?;
            return Ok(ReconcileOutcome::SettledSink { order_id });
        };

        let payment_status = self.apply_payment(order_id, transaction_status.payment_status()).await?;
        let order_status = self.drive_order(&order, payment_status).await?;

        Ok(ReconcileOutcome::Applied {
            order_id,
            transaction_status,
            payment_status,
            order_status,
        })
    }

    /// Ambil status terbaru dari gateway dan proses seperti notifikasi terpercaya
    pub async fn sync_from_gateway(&self, order_id: i64) -> AppResult<ReconcileOutcome> {
        let transaction = self
            .store
            .find_payment_transaction(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Transaksi QRIS order {} tidak ditemukan", order_id)))?;

        let status = self.gateway.transaction_status(&transaction.midtrans_order_id).await?;
        let raw = serde_json::to_value(&status)
            .map_err(|e| AppError::internal(format!("Gagal serialisasi status Midtrans: {}", e)))?;

        self.process_notification(&status, &raw).await
    }

    /// Buat charge QRIS atau pakai ulang yang masih berlaku. Idempotent per order.
    pub async fn create_or_reuse_qris_charge(&self, user_id: i32, order_id: i64) -> AppResult<PaymentTransaction> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Order {} tidak ditemukan", order_id)))?;

        if !order.is_owned_by(user_id) {
            return Err(AppError::forbidden("Order ini bukan milik Anda"));
        }

        if order.payment_method != PaymentMethod::Qris {
            return Err(AppError::validation("Order ini tidak dibayar dengan QRIS"));
        }

        let existing = self.store.find_payment_transaction(order_id).await?;
        let now = Utc::now();

        if let Some(transaction) = &existing {
            if transaction.status.is_settled() || transaction.is_reusable(now) {
                tracing::debug!("Pakai ulang transaksi QRIS {} untuk order {}", transaction.midtrans_order_id, order_id);
                return Ok(transaction.clone());
            }
        }

        if order.status != OrderStatus::Pending {
            return Err(AppError::validation(format!("Order berstatus {} tidak menunggu pembayaran", order.status)));
        }

        let request = QrisChargeRequest {
            payment_type: "qris".to_string(),
            transaction_details: TransactionDetails {
                order_id: correlation_key(order_id, now),
                gross_amount: order.total_price.to_whole_rupiah(),
            },
            qris: QrisOptions {
                acquirer: self.config.qris_acquirer.clone(),
            },
        };

        // Timeout di sini meninggalkan order tetap Pending, client boleh ulang
        let charge = self.gateway.charge_qris(&request).await?;

        let transaction = self
            .store
            .upsert_payment_transaction(&PaymentTransactionUpsert {
                order_id,
                midtrans_order_id: request.transaction_details.order_id.clone(),
                midtrans_transaction_id: Some(charge.transaction_id),
                gross_amount: order.total_price,
                qr_url: charge.qr_url,
                status: TransactionStatus::Pending,
                expired_at: charge.expired_at,
            })
            .await?;

        tracing::info!("💳 Charge QRIS {} dibuat untuk order {}", transaction.midtrans_order_id, order_id);
        Ok(transaction)
    }

    // Buat PaymentTransaction secara lazy kalau notifikasi datang sebelum charge tercatat.
    // Row yang sudah ada (mungkin sudah expire/cancel oleh delivery lain) tidak pernah ditimpa.
    async fn ensure_transaction(
        &self,
        order: &Order,
        notification: &MidtransNotification,
    ) -> AppResult<PaymentTransaction> {
        if let Some(transaction) = self.store.find_payment_transaction(order.id).await? {
            return Ok(transaction);
        }

        self.store
            .insert_payment_transaction_if_absent(&PaymentTransactionUpsert {
                order_id: order.id,
                midtrans_order_id: notification.order_id.clone(),
                midtrans_transaction_id: notification.transaction_id.clone(),
                gross_amount: notification.gross_amount().unwrap_or(order.total_price),
                qr_url: None,
                status: TransactionStatus::Pending,
                expired_at: None,
            })
            .await
    }

    // Transaksi settlement: pastikan payment dan order ikut, walau apply sebelumnya terputus
    async fn complete_settlement(&self, order: &Order) -> AppResult<()> {
        let payment_status = self.apply_payment(order.id, PaymentStatus::Success).await?;
        self.drive_order(order, payment_status).await?;
        Ok(())
    }

    // None berarti transaksi sudah settlement
    async fn apply_transaction(
        &self,
        order_id: i64,
        target: TransactionStatus,
        gateway_transaction_id: Option<&str>,
    ) -> AppResult<Option<TransactionStatus>> {
        for _ in 0..MAX_APPLY_ATTEMPTS {
            let transaction = self
                .store
                .find_payment_transaction(order_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Transaksi QRIS order {} tidak ditemukan", order_id)))?;

            if transaction.status.is_settled() {
                return Ok(None);
            }

            // Pending terlambat tidak menghidupkan lagi transaksi yang sudah gagal
            if transaction.status == target || target == TransactionStatus::Pending {
                return Ok(Some(transaction.status));
            }

            if self
                .store
                .update_transaction_status(order_id, transaction.status, target, gateway_transaction_id)
                .await?
            {
                tracing::info!("Transaksi order {}: {} -> {}", order_id, transaction.status, target);
                return Ok(Some(target));
            }
        }

        Err(AppError::conflict(format!("Transaksi order {} sedang diubah", order_id)))
    }

    async fn apply_payment(&self, order_id: i64, target: PaymentStatus) -> AppResult<PaymentStatus> {
        for _ in 0..MAX_APPLY_ATTEMPTS {
            let payment = self
                .store
                .find_payment(order_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Payment order {} tidak ditemukan", order_id)))?;

            let next = match payment.status.reconcile(target) {
                Ok(PaymentUpdate::Unchanged) => return Ok(payment.status),
                Ok(PaymentUpdate::Apply(next)) => next,
                Err(e) => {
                    tracing::error!("🚨 Anomali payment order {}: {}", order_id, e);
                    return Err(e.into());
                }
            };

            if self.store.update_payment_status(order_id, payment.status, next).await? {
                if payment.status == PaymentStatus::Failed {
                    tracing::warn!("Settlement terlambat untuk payment order {} yang sudah Failed", order_id);
                }
                tracing::info!("Payment order {}: {} -> {}", order_id, payment.status, next);
                return Ok(next);
            }
        }

        Err(AppError::conflict(format!("Payment order {} sedang diubah", order_id)))
    }

    // Arahkan order ke status yang sesuai dengan payment, termasuk memulihkan apply yang terputus
    async fn drive_order(&self, order: &Order, payment_status: PaymentStatus) -> AppResult<OrderStatus> {
        let desired = match payment_status {
            PaymentStatus::Success => OrderStatus::Packaging,
            PaymentStatus::Failed => OrderStatus::Cancelled,
            PaymentStatus::Pending | PaymentStatus::Refunded => return Ok(order.status),
        };

        if order.status == desired {
            return Ok(order.status);
        }

        // Order yang sudah dikirim atau diterima tidak perlu digerakkan ulang oleh settlement
        if desired == OrderStatus::Packaging
            && matches!(order.status, OrderStatus::Shipping | OrderStatus::Delivered)
        {
            return Ok(order.status);
        }

        match self.orders.transition(order.id, Actor::Pipeline, desired, None).await {
            Ok(updated) => Ok(updated.status),
            Err(AppError::Transition(e)) => {
                let current = match e {
                    TransitionError::OrderTerminal { status } => status,
                    TransitionError::InvalidTransition { from, .. } => from,
                    TransitionError::TrackingNumberRequired => order.status,
                };

                if payment_status == PaymentStatus::Success && current == OrderStatus::Cancelled {
                    tracing::error!(
                        "🚨 Pembayaran masuk untuk order {} yang sudah Cancelled, perlu refund manual",
                        order.id
                    );
                } else {
                    tracing::info!("Order {} tetap {}: {}", order.id, current, e);
                }
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }
}
