// Persistence layer: satu trait, satu implementasi Postgres, satu in-memory untuk test
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::order::{CartLine, Order, OrderDraft, OrderLineItem, OrderStatusChange};
use crate::domain::payment::{Payment, PaymentStatus, PaymentTransaction, PaymentTransactionUpsert, TransactionStatus};
use crate::domain::stock::{Size, StockError, StockLevel};
use crate::error::AppError;

pub mod order_repo;

#[cfg(test)]
pub mod memory_repo;

/// Setiap method adalah satu unit kerja atomik
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Conditional decrement, gagal dengan InsufficientStock tanpa mengubah counter
    async fn reserve_stock(&self, product_id: i64, size: Size, qty: i32) -> Result<i32, StoreError>;

    async fn release_stock(&self, product_id: i64, size: Size, qty: i32) -> Result<i32, StoreError>;

    async fn stock_level(&self, product_id: i64) -> Result<Option<StockLevel>, AppError>;

    async fn load_cart_lines(&self, user_id: i32, cart_ids: &[i64]) -> Result<Vec<CartLine>, AppError>;

    /// Reserve semua line + insert order, item, payment + hapus cart. All-or-nothing.
    async fn create_order(&self, draft: &OrderDraft) -> Result<(Order, Payment), StoreError>;

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, AppError>;

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderLineItem>, AppError>;

    /// Optimistic compare-and-swap pada orders.version. None kalau kalah race.
    async fn commit_transition(&self, change: &OrderStatusChange) -> Result<Option<Order>, AppError>;

    async fn find_payment(&self, order_id: i64) -> Result<Option<Payment>, AppError>;

    /// CAS status payment, true kalau row berubah
    async fn update_payment_status(
        &self,
        order_id: i64,
        expected: PaymentStatus,
        status: PaymentStatus,
    ) -> Result<bool, AppError>;

    async fn find_payment_transaction(&self, order_id: i64) -> Result<Option<PaymentTransaction>, AppError>;

    /// Satu row per order, di-update in place. Row settlement tidak pernah ditimpa.
    async fn upsert_payment_transaction(
        &self,
        upsert: &PaymentTransactionUpsert,
    ) -> Result<PaymentTransaction, AppError>;

    /// CAS status transaksi, tidak pernah keluar dari settlement
    async fn update_transaction_status(
        &self,
        order_id: i64,
        expected: TransactionStatus,
        status: TransactionStatus,
        midtrans_transaction_id: Option<&str>,
    ) -> Result<bool, AppError>;

    /// Insert hanya kalau order belum punya transaksi, row yang ada tidak disentuh
    async fn insert_payment_transaction_if_absent(
        &self,
        insert: &PaymentTransactionUpsert,
    ) -> Result<PaymentTransaction, AppError>;

    async fn record_raw_notification(&self, order_id: i64, raw: &serde_json::Value) -> Result<(), AppError>;

    /// Transaksi pending yang sudah lewat expiry, plus settlement yang payment-nya belum Success.
    /// Row yang terakhir di-sync setelah `retry_before` dilewati.
    async fn transactions_due_for_sync(
        &self,
        now: DateTime<Utc>,
        retry_before: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, AppError>;

    async fn mark_sync_attempt(&self, order_id: i64, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn create_notification(&self, user_id: i32, title: &str, message: &str) -> Result<(), AppError>;
}

// Error dari operasi yang menyentuh counter stok
#[derive(Debug)]
pub enum StoreError {
    Stock(StockError),
    App(AppError),
}

impl From<StockError> for StoreError {
    fn from(err: StockError) -> Self {
        StoreError::Stock(err)
    }
}

impl From<AppError> for StoreError {
    fn from(err: AppError) -> Self {
        StoreError::App(err)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::App(AppError::DatabaseError(err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Stock(e) => AppError::from(e),
            StoreError::App(e) => e,
        }
    }
}
