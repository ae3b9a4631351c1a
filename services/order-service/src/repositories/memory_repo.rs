// Store in-memory untuk unit test service dan pipeline
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::order::{CartLine, Money, Order, OrderDraft, OrderLineItem, OrderStatusChange};
use crate::domain::payment::{
    Payment, PaymentStatus, PaymentTransaction, PaymentTransactionUpsert, TransactionStatus,
};
use crate::domain::stock::{release_into, reserve_from, Size, StockError, StockLevel};
use crate::error::AppError;
use crate::repositories::{CommerceStore, StoreError};

#[derive(Debug, Clone)]
struct ProductRow {
    stock_30ml: i32,
    stock_50ml: i32,
    price_30ml: Money,
    price_50ml: Money,
}

impl ProductRow {
    fn stock_mut(&mut self, size: Size) -> &mut i32 {
        match size {
            Size::Ml30 => &mut self.stock_30ml,
            Size::Ml50 => &mut self.stock_50ml,
        }
    }

    fn price(&self, size: Size) -> Money {
        match size {
            Size::Ml30 => self.price_30ml,
            Size::Ml50 => self.price_50ml,
        }
    }
}

#[derive(Debug, Clone)]
struct CartRow {
    user_id: i32,
    product_id: i64,
    size: Size,
    quantity: i32,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<i64, ProductRow>,
    carts: HashMap<i64, CartRow>,
    orders: HashMap<i64, Order>,
    items: Vec<OrderLineItem>,
    payments: HashMap<i64, Payment>,
    transactions: HashMap<i64, PaymentTransaction>,
    last_synced: HashMap<i64, DateTime<Utc>>,
    notifications: Vec<(i32, String, String)>,
    next_id: i64,
    lost_commits: usize,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_transaction(&mut self, insert: &PaymentTransactionUpsert) -> PaymentTransaction {
        let now = Utc::now();
        let transaction = PaymentTransaction {
            id: self.next_id(),
            order_id: insert.order_id,
            midtrans_order_id: insert.midtrans_order_id.clone(),
            midtrans_transaction_id: insert.midtrans_transaction_id.clone(),
            gross_amount: insert.gross_amount,
            qr_url: insert.qr_url.clone(),
            status: insert.status,
            expired_at: insert.expired_at,
            raw_notification: None,
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(insert.order_id, transaction.clone());
        transaction
    }

    fn reserve(&mut self, product_id: i64, size: Size, qty: i32) -> Result<i32, StockError> {
        let product = self
            .products
            .get_mut(&product_id)
            .ok_or(StockError::ProductNotFound(product_id))?;
        let counter = product.stock_mut(size);
        *counter = reserve_from(product_id, size, *counter, qty)?;
        Ok(*counter)
    }

    fn release(&mut self, product_id: i64, size: Size, qty: i32) -> Result<i32, StockError> {
        let product = self
            .products
            .get_mut(&product_id)
            .ok_or(StockError::ProductNotFound(product_id))?;
        let counter = product.stock_mut(size);
        *counter = release_into(product_id, size, *counter, qty)?;
        Ok(*counter)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, product_id: i64, price: Money, stock_30ml: i32, stock_50ml: i32) {
        let mut state = self.state.lock().unwrap();
        state.products.insert(
            product_id,
            ProductRow {
                stock_30ml,
                stock_50ml,
                price_30ml: price,
                price_50ml: Money(price.0 * 3 / 2),
            },
        );
    }

    pub fn add_cart(&self, user_id: i32, product_id: i64, size: Size, quantity: i32) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.carts.insert(id, CartRow { user_id, product_id, size, quantity });
        id
    }

    pub fn stock(&self, product_id: i64, size: Size) -> i32 {
        let mut state = self.state.lock().unwrap();
        *state.products.get_mut(&product_id).unwrap().stock_mut(size)
    }

    pub fn cart_count(&self) -> usize {
        self.state.lock().unwrap().carts.len()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    /// Simulasikan writer lain yang menang race pada N commit berikutnya
    pub fn lose_next_commits(&self, n: usize) {
        self.state.lock().unwrap().lost_commits = n;
    }

    /// Perlambat find_order, mensimulasikan pool database yang sesak
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_transaction_expiry(&self, order_id: i64, expired_at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.transactions.get_mut(&order_id) {
            tx.expired_at = Some(expired_at);
        }
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn reserve_stock(&self, product_id: i64, size: Size, qty: i32) -> Result<i32, StoreError> {
        Ok(self.state.lock().unwrap().reserve(product_id, size, qty)?)
    }

    async fn release_stock(&self, product_id: i64, size: Size, qty: i32) -> Result<i32, StoreError> {
        Ok(self.state.lock().unwrap().release(product_id, size, qty)?)
    }

    async fn stock_level(&self, product_id: i64) -> Result<Option<StockLevel>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.products.get(&product_id).map(|p| StockLevel {
            product_id,
            stock_30ml: p.stock_30ml,
            stock_50ml: p.stock_50ml,
        }))
    }

    async fn load_cart_lines(&self, user_id: i32, cart_ids: &[i64]) -> Result<Vec<CartLine>, AppError> {
        let state = self.state.lock().unwrap();
        let mut lines: Vec<CartLine> = cart_ids
            .iter()
            .filter_map(|id| state.carts.get(id).map(|cart| (*id, cart)))
            .filter(|(_, cart)| cart.user_id == user_id)
            .filter_map(|(cart_id, cart)| {
                state.products.get(&cart.product_id).map(|product| CartLine {
                    cart_id,
                    product_id: cart.product_id,
                    size: cart.size,
                    quantity: cart.quantity,
                    unit_price: product.price(cart.size),
                })
            })
            .collect();
        lines.sort_by_key(|line| line.cart_id);
        lines.dedup_by_key(|line| line.cart_id);
        Ok(lines)
    }

    async fn create_order(&self, draft: &OrderDraft) -> Result<(Order, Payment), StoreError> {
        let mut state = self.state.lock().unwrap();

        // Reserve di salinan counter, commit hanya kalau semua line berhasil
        let snapshot = state.products.clone();
        for line in &draft.lines {
            if let Err(e) = state.reserve(line.product_id, line.size, line.quantity) {
                state.products = snapshot;
                return Err(e.into());
            }
        }

        let now = Utc::now();
        let order_id = state.next_id();
        let order = Order {
            id: order_id,
            user_id: draft.user_id,
            status: draft.status,
            subtotal: draft.prices.subtotal,
            tax: draft.prices.tax,
            total_price: draft.prices.total,
            shipping_address: draft.shipping_address.clone(),
            tracking_number: None,
            payment_method: draft.payment_method,
            version: 0,
            stock_released: false,
            created_at: now,
            updated_at: now,
        };

        for line in &draft.lines {
            let id = state.next_id();
            state.items.push(OrderLineItem {
                id,
                order_id,
                product_id: line.product_id,
                size: line.size,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_subtotal: line.line_subtotal,
            });
        }

        let payment = Payment {
            id: state.next_id(),
            order_id,
            method: draft.payment_method,
            amount: draft.prices.total,
            status: PaymentStatus::Pending,
            transaction_time: None,
            created_at: now,
            updated_at: now,
        };

        for cart_id in &draft.cart_ids {
            state.carts.remove(cart_id);
        }
        state.orders.insert(order_id, order.clone());
        state.payments.insert(order_id, payment.clone());

        Ok((order, payment))
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, AppError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(self.state.lock().unwrap().orders.get(&order_id).cloned())
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderLineItem>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.items.iter().filter(|item| item.order_id == order_id).cloned().collect())
    }

    async fn commit_transition(&self, change: &OrderStatusChange) -> Result<Option<Order>, AppError> {
        let mut state = self.state.lock().unwrap();

        if state.lost_commits > 0 {
            state.lost_commits -= 1;
            if let Some(order) = state.orders.get_mut(&change.order_id) {
                order.version += 1;
            }
            return Ok(None);
        }

        let Some(current) = state.orders.get(&change.order_id).cloned() else {
            return Ok(None);
        };
        if current.version != change.expected_version {
            return Ok(None);
        }

        let mut order = current;
        order.status = change.status;
        if change.tracking_number.is_some() {
            order.tracking_number = change.tracking_number.clone();
        }
        order.version += 1;
        order.updated_at = Utc::now();

        if change.release_stock && !order.stock_released {
            let items: Vec<OrderLineItem> = state
                .items
                .iter()
                .filter(|item| item.order_id == change.order_id)
                .cloned()
                .collect();
            for item in &items {
                state.release(item.product_id, item.size, item.quantity)?;
            }
            order.stock_released = true;
        }

        state.orders.insert(order.id, order.clone());
        Ok(Some(order))
    }

    async fn find_payment(&self, order_id: i64) -> Result<Option<Payment>, AppError> {
        Ok(self.state.lock().unwrap().payments.get(&order_id).cloned())
    }

    async fn update_payment_status(
        &self,
        order_id: i64,
        expected: PaymentStatus,
        status: PaymentStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        match state.payments.get_mut(&order_id) {
            Some(payment) if payment.status == expected => {
                payment.status = status;
                if status == PaymentStatus::Success {
                    payment.transaction_time = Some(Utc::now());
                }
                payment.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_payment_transaction(&self, order_id: i64) -> Result<Option<PaymentTransaction>, AppError> {
        Ok(self.state.lock().unwrap().transactions.get(&order_id).cloned())
    }

    async fn upsert_payment_transaction(
        &self,
        upsert: &PaymentTransactionUpsert,
    ) -> Result<PaymentTransaction, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = state.transactions.get_mut(&upsert.order_id) {
            if existing.status != TransactionStatus::Settlement {
                existing.midtrans_order_id = upsert.midtrans_order_id.clone();
                if upsert.midtrans_transaction_id.is_some() {
                    existing.midtrans_transaction_id = upsert.midtrans_transaction_id.clone();
                }
                existing.gross_amount = upsert.gross_amount;
                if upsert.qr_url.is_some() {
                    existing.qr_url = upsert.qr_url.clone();
                }
                existing.status = upsert.status;
                if upsert.expired_at.is_some() {
                    existing.expired_at = upsert.expired_at;
                }
                existing.updated_at = now;
            }
            return Ok(existing.clone());
        }

        Ok(state.insert_transaction(upsert))
    }

    async fn insert_payment_transaction_if_absent(
        &self,
        insert: &PaymentTransactionUpsert,
    ) -> Result<PaymentTransaction, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.transactions.get(&insert.order_id) {
            return Ok(existing.clone());
        }
        Ok(state.insert_transaction(insert))
    }

    async fn update_transaction_status(
        &self,
        order_id: i64,
        expected: TransactionStatus,
        status: TransactionStatus,
        midtrans_transaction_id: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        match state.transactions.get_mut(&order_id) {
            Some(tx) if tx.status == expected && !tx.status.is_settled() => {
                tx.status = status;
                if let Some(id) = midtrans_transaction_id {
                    tx.midtrans_transaction_id = Some(id.to_string());
                }
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_raw_notification(&self, order_id: i64, raw: &serde_json::Value) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.transactions.get_mut(&order_id) {
            tx.raw_notification = Some(raw.clone());
        }
        Ok(())
    }

    async fn transactions_due_for_sync(
        &self,
        now: DateTime<Utc>,
        retry_before: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, AppError> {
        let state = self.state.lock().unwrap();
        let mut due: Vec<PaymentTransaction> = state
            .transactions
            .values()
            .filter(|tx| match tx.status {
                TransactionStatus::Pending => tx.expired_at.is_some_and(|at| at < now),
                TransactionStatus::Settlement => state
                    .payments
                    .get(&tx.order_id)
                    .is_some_and(|p| matches!(p.status, PaymentStatus::Pending | PaymentStatus::Failed)),
                _ => false,
            })
            .filter(|tx| state.last_synced.get(&tx.order_id).map_or(true, |at| *at < retry_before))
            .cloned()
            .collect();
        due.sort_by_key(|tx| (state.last_synced.get(&tx.order_id).copied(), tx.expired_at));
        Ok(due)
    }

    async fn mark_sync_attempt(&self, order_id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        self.state.lock().unwrap().last_synced.insert(order_id, at);
        Ok(())
    }

    async fn create_notification(&self, user_id: i32, title: &str, message: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.notifications.push((user_id, title.to_string(), message.to_string()));
        Ok(())
    }
}
