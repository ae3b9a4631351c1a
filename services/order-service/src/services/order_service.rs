use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::utils::validation::{
    is_valid_quantity, is_valid_shipping_address, is_valid_tracking_number, sanitize_html,
};

use crate::domain::order::{
    Actor, CheckoutRequest, DraftLine, Money, Order, OrderDraft, OrderLineItem, OrderStatus,
    OrderStatusChange, PaymentMethod, PriceBreakdown,
};
use crate::domain::payment::{Payment, PaymentStatus, TransactionStatus};
use crate::error::{AppError, AppResult};
use crate::repositories::CommerceStore;

// Batas percobaan ulang saat kalah optimistic lock
const MAX_TRANSITION_ATTEMPTS: usize = 5;

// Proyeksi status untuk polling client
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub order_id: i64,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub transaction_status: Option<TransactionStatus>,
    pub qr_url: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

// Order beserta line item-nya
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn CommerceStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn CommerceStore>) -> Self {
        Self { store }
    }

    /// Checkout keranjang: reserve stok, buat order + payment, hapus cart. All-or-nothing.
    pub async fn checkout(&self, user_id: i32, request: CheckoutRequest) -> AppResult<(Order, Payment)> {
        let shipping_address = sanitize_html(request.shipping_address.trim());
        if !is_valid_shipping_address(&shipping_address) {
            return Err(AppError::validation("Alamat pengiriman harus 10-500 karakter"));
        }

        let cart_ids: Vec<i64> = request.cart_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if cart_ids.is_empty() {
            return Err(AppError::validation("Keranjang kosong"));
        }

        let cart_lines = self.store.load_cart_lines(user_id, &cart_ids).await?;
        if cart_lines.is_empty() {
            return Err(AppError::validation("Keranjang kosong"));
        }
        if cart_lines.len() != cart_ids.len() {
            return Err(AppError::validation("Sebagian item keranjang tidak ditemukan"));
        }

        let mut lines = Vec::with_capacity(cart_lines.len());
        for cart in &cart_lines {
            if !is_valid_quantity(cart.quantity) {
                return Err(AppError::validation(format!("Jumlah item keranjang {} tidak valid", cart.cart_id)));
            }

            let line_subtotal = cart
                .unit_price
                .checked_mul(cart.quantity)
                .ok_or_else(|| AppError::validation("Total harga melebihi batas"))?;

            lines.push(DraftLine {
                product_id: cart.product_id,
                size: cart.size,
                quantity: cart.quantity,
                unit_price: cart.unit_price,
                line_subtotal,
            });
        }

        let subtotal: Money = lines.iter().map(|line| line.line_subtotal).sum();
        let draft = OrderDraft {
            user_id,
            status: OrderStatus::initial_for(request.payment_method),
            prices: PriceBreakdown::from_subtotal(subtotal),
            shipping_address,
            payment_method: request.payment_method,
            lines,
            cart_ids,
        };

        let (order, payment) = self.store.create_order(&draft).await?;

        tracing::info!(
            "🛒 Order {} dibuat untuk user {} ({:?}, total {}, status {})",
            order.id,
            user_id,
            order.payment_method,
            order.total_price,
            order.status
        );
        self.notify(
            order.user_id,
            "Pesanan dibuat",
            format!("Pesanan #{} berhasil dibuat dengan total Rp {}", order.id, order.total_price),
        );

        Ok((order, payment))
    }

    pub async fn get_order(&self, actor: Actor, order_id: i64) -> AppResult<OrderDetail> {
        let order = self.load_order(order_id).await?;
        authorize(&actor, &order)?;

        let items = self.store.order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Jalankan transisi order dengan optimistic lock. Kalah race = baca ulang dan validasi ulang.
    pub async fn transition(
        &self,
        order_id: i64,
        actor: Actor,
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> AppResult<Order> {
        let tracking_number = tracking_number.map(str::trim).filter(|t| !t.is_empty());

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self.load_order(order_id).await?;
            authorize(&actor, &current)?;

            let next = current.status.transition(to, actor.kind(), tracking_number)?;

            if next == OrderStatus::Shipping {
                if let Some(tracking) = tracking_number {
                    if !is_valid_tracking_number(tracking) {
                        return Err(AppError::validation("Format nomor resi tidak valid"));
                    }
                }
            }

            let change = OrderStatusChange {
                order_id,
                expected_version: current.version,
                status: next,
                tracking_number: tracking_number.filter(|_| next == OrderStatus::Shipping).map(str::to_string),
                release_stock: next == OrderStatus::Cancelled,
            };

            match self.store.commit_transition(&change).await? {
                Some(updated) => {
                    tracing::info!(
                        "🔄 Order {}: {} -> {} oleh {}{}",
                        order_id,
                        current.status,
                        updated.status,
                        actor,
                        if updated.stock_released && !current.stock_released { " (stok dikembalikan)" } else { "" }
                    );
                    self.after_transition(&updated).await;
                    return Ok(updated);
                }
                None => {
                    tracing::warn!("Order {} berubah saat transisi oleh {} (percobaan {})", order_id, actor, attempt);
                }
            }
        }

        Err(AppError::conflict(format!("Order {} sedang diubah, coba lagi", order_id)))
    }

    /// Refund manual untuk order Cancelled yang pembayarannya sudah masuk
    pub async fn refund(&self, order_id: i64, actor: Actor) -> AppResult<Payment> {
        if !matches!(actor, Actor::Admin { .. }) {
            return Err(AppError::forbidden("Hanya admin yang bisa melakukan refund"));
        }

        let order = self.load_order(order_id).await?;
        if order.status != OrderStatus::Cancelled {
            return Err(AppError::validation("Refund hanya untuk order yang sudah Cancelled"));
        }

        let payment = self.load_payment(order_id).await?;
        let next = payment.status.refund()?;

        if !self.store.update_payment_status(order_id, payment.status, next).await? {
            return Err(AppError::conflict(format!("Payment order {} sedang diubah, coba lagi", order_id)));
        }

        tracing::info!("💸 Payment order {} direfund oleh {}", order_id, actor);
        self.notify(
            order.user_id,
            "Dana dikembalikan",
            format!("Pembayaran pesanan #{} sebesar Rp {} telah direfund", order_id, payment.amount),
        );

        self.load_payment(order_id).await
    }

    pub async fn payment_status(&self, actor: Actor, order_id: i64) -> AppResult<PaymentStatusView> {
        let order = self.load_order(order_id).await?;
        authorize(&actor, &order)?;

        let payment = self.load_payment(order_id).await?;
        let transaction = self.store.find_payment_transaction(order_id).await?;

        Ok(PaymentStatusView {
            order_id,
            order_status: order.status,
            payment_status: payment.status,
            payment_method: payment.method,
            amount: payment.amount,
            transaction_status: transaction.as_ref().map(|t| t.status),
            qr_url: transaction.as_ref().and_then(|t| t.qr_url.clone()),
            expired_at: transaction.as_ref().and_then(|t| t.expired_at),
            paid_at: payment.transaction_time,
        })
    }

    async fn load_order(&self, order_id: i64) -> AppResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Order {} tidak ditemukan", order_id)))
    }

    async fn load_payment(&self, order_id: i64) -> AppResult<Payment> {
        self.store
            .find_payment(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment order {} tidak ditemukan", order_id)))
    }

    // Efek samping setelah transisi di-commit. Gagal di sini tidak membatalkan transisi.
    async fn after_transition(&self, order: &Order) {
        let payment_change = match order.status {
            OrderStatus::Cancelled => Some((PaymentStatus::Pending, PaymentStatus::Failed)),
            OrderStatus::Delivered if order.payment_method == PaymentMethod::Cash => {
                Some((PaymentStatus::Pending, PaymentStatus::Success))
            }
            _ => None,
        };

        if let Some((expected, next)) = payment_change {
            match self.store.update_payment_status(order.id, expected, next).await {
                Ok(true) => tracing::info!("Payment order {}: {} -> {}", order.id, expected, next),
                Ok(false) => tracing::debug!("Payment order {} bukan {}, dilewati", order.id, expected),
                Err(e) => tracing::error!("❌ Gagal update payment order {}: {}", order.id, e),
            }
        }

        let message = match order.status {
            OrderStatus::Packaging => format!("Pesanan #{} sedang dikemas", order.id),
            OrderStatus::Shipping => format!(
                "Pesanan #{} dikirim dengan resi {}",
                order.id,
                order.tracking_number.as_deref().unwrap_or("-")
            ),
            OrderStatus::Delivered => format!("Pesanan #{} telah diterima", order.id),
            OrderStatus::Cancelled => format!("Pesanan #{} dibatalkan", order.id),
            OrderStatus::Pending => return,
        };
        self.notify(order.user_id, "Status pesanan", message);
    }

    // Best-effort, tidak menahan response
    fn notify(&self, user_id: i32, title: &'static str, message: String) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.create_notification(user_id, title, &message).await {
                tracing::warn!("Gagal membuat notifikasi untuk user {}: {}", user_id, e);
            }
        });
    }
}

// Customer hanya boleh menyentuh order miliknya sendiri
fn authorize(actor: &Actor, order: &Order) -> AppResult<()> {
    match actor {
        Actor::Customer { user_id } if !order.is_owned_by(*user_id) => {
            Err(AppError::forbidden("Order ini bukan milik Anda"))
        }
        _ => Ok(()),
    }
}
