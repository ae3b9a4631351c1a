use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::order::{CartLine, Order, OrderDraft, OrderLineItem, OrderStatusChange};
use crate::domain::payment::{
    Payment, PaymentStatus, PaymentTransaction, PaymentTransactionUpsert, TransactionStatus,
};
use crate::domain::stock::{Size, StockError, StockLevel};
use crate::error::AppError;
use crate::repositories::{CommerceStore, StoreError};

const ORDER_COLUMNS: &str = "id, user_id, status, subtotal, tax, total_price, shipping_address, \
     tracking_number, payment_method, version, stock_released, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, size, quantity, unit_price, line_subtotal";

const PAYMENT_COLUMNS: &str = "id, order_id, method, amount, status, transaction_time, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, order_id, midtrans_order_id, midtrans_transaction_id, gross_amount, \
     qr_url, status, expired_at, raw_notification, created_at, updated_at";

// Repository Postgres untuk order, payment, dan stok
#[derive(Clone)]
pub struct PgCommerceStore {
    pool: PgPool,
}

impl PgCommerceStore {
    // Buat repository baru
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Conditional decrement: tidak pernah read-then-write
async fn reserve_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
    size: Size,
    qty: i32,
) -> Result<i32, StoreError> {
    if qty <= 0 {
        return Err(StockError::InvalidQuantity(qty).into());
    }

    let column = size.stock_column();
    let remaining: Option<i32> = sqlx::query_scalar(&format!(
        "UPDATE products SET {column} = {column} - $1, updated_at = NOW() \
         WHERE id = $2 AND {column} >= $1 RETURNING {column}"
    ))
    .bind(qty)
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(remaining) = remaining {
        return Ok(remaining);
    }

    // Update gagal: bedakan produk hilang vs stok kurang
    let available: Option<i32> = sqlx::query_scalar(&format!("SELECT {column} FROM products WHERE id = $1"))
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?;

    match available {
        Some(available) => Err(StockError::InsufficientStock {
            product_id,
            size,
            available,
        }
        .into()),
        None => Err(StockError::ProductNotFound(product_id).into()),
    }
}

async fn release_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
    size: Size,
    qty: i32,
) -> Result<i32, StoreError> {
    if qty <= 0 {
        return Err(StockError::InvalidQuantity(qty).into());
    }

    let column = size.stock_column();
    let restored: Option<i32> = sqlx::query_scalar(&format!(
        "UPDATE products SET {column} = {column} + $1, updated_at = NOW() \
         WHERE id = $2 AND {column} <= 2147483647 - $1 RETURNING {column}"
    ))
    .bind(qty)
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(restored) = restored {
        return Ok(restored);
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?;

    match exists {
        Some(_) => Err(StockError::CounterOverflow { product_id, size }.into()),
        None => Err(StockError::ProductNotFound(product_id).into()),
    }
}

#[async_trait]
impl CommerceStore for PgCommerceStore {
    async fn reserve_stock(&self, product_id: i64, size: Size, qty: i32) -> Result<i32, StoreError> {
        let mut tx = self.pool.begin().await?;
        let remaining = reserve_in_tx(&mut tx, product_id, size, qty).await?;
        tx.commit().await?;
        Ok(remaining)
    }

    async fn release_stock(&self, product_id: i64, size: Size, qty: i32) -> Result<i32, StoreError> {
        let mut tx = self.pool.begin().await?;
        let restored = release_in_tx(&mut tx, product_id, size, qty).await?;
        tx.commit().await?;
        Ok(restored)
    }

    async fn stock_level(&self, product_id: i64) -> Result<Option<StockLevel>, AppError> {
        let row: Option<(i64, i32, i32)> =
            sqlx::query_as("SELECT id, stock_30ml, stock_50ml FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(product_id, stock_30ml, stock_50ml)| StockLevel {
            product_id,
            stock_30ml,
            stock_50ml,
        }))
    }

    async fn load_cart_lines(&self, user_id: i32, cart_ids: &[i64]) -> Result<Vec<CartLine>, AppError> {
        let lines = sqlx::query_as(
            r#"
            SELECT c.id AS cart_id, c.product_id, c.size, c.quantity,
                   CASE WHEN c.size = '30ml' THEN p.price_30ml ELSE p.price_50ml END AS unit_price
            FROM carts c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1 AND c.id = ANY($2)
            ORDER BY c.id
            "#,
        )
        .bind(user_id)
        .bind(cart_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    async fn create_order(&self, draft: &OrderDraft) -> Result<(Order, Payment), StoreError> {
        // Transaction di-drop tanpa commit = rollback semua reserve
        let mut tx = self.pool.begin().await?;

        for line in &draft.lines {
            reserve_in_tx(&mut tx, line.product_id, line.size, line.quantity).await?;
        }

        let order: Order = sqlx::query_as(&format!(
            "INSERT INTO orders (user_id, status, subtotal, tax, total_price, shipping_address, payment_method) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(draft.user_id)
        .bind(draft.status)
        .bind(draft.prices.subtotal)
        .bind(draft.prices.tax)
        .bind(draft.prices.total)
        .bind(&draft.shipping_address)
        .bind(draft.payment_method)
        .fetch_one(&mut *tx)
        .await?;

        for line in &draft.lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, size, quantity, unit_price, line_subtotal) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(line.product_id)
            .bind(line.size)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.line_subtotal)
            .execute(&mut *tx)
            .await?;
        }

        let payment: Payment = sqlx::query_as(&format!(
            "INSERT INTO payments (order_id, method, amount, status) VALUES ($1, $2, $3, $4) \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(order.id)
        .bind(draft.payment_method)
        .bind(draft.prices.total)
        .bind(PaymentStatus::Pending)
        .fetch_one(&mut *tx)
        .await?;

        if !draft.cart_ids.is_empty() {
            sqlx::query("DELETE FROM carts WHERE user_id = $1 AND id = ANY($2)")
                .bind(draft.user_id)
                .bind(draft.cart_ids.as_slice())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((order, payment))
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderLineItem>, AppError> {
        let items = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn commit_transition(&self, change: &OrderStatusChange) -> Result<Option<Order>, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<Order> = sqlx::query_as(&format!(
            "UPDATE orders SET status = $1, tracking_number = COALESCE($2, tracking_number), \
             version = version + 1, updated_at = NOW() \
             WHERE id = $3 AND version = $4 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(change.status)
        .bind(change.tracking_number.as_deref())
        .bind(change.order_id)
        .bind(change.expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut order) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        if change.release_stock {
            // Flag per order: stok hanya dikembalikan sekali walau cancel datang dari dua jalur
            let flipped: Option<i64> = sqlx::query_scalar(
                "UPDATE orders SET stock_released = TRUE WHERE id = $1 AND stock_released = FALSE RETURNING id",
            )
            .bind(change.order_id)
            .fetch_optional(&mut *tx)
            .await?;

            if flipped.is_some() {
                let items: Vec<OrderLineItem> = sqlx::query_as(&format!(
                    "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
                ))
                .bind(change.order_id)
                .fetch_all(&mut *tx)
                .await?;

                for item in &items {
                    release_in_tx(&mut tx, item.product_id, item.size, item.quantity).await?;
                }

                order.stock_released = true;
            }
        }

        tx.commit().await?;
        Ok(Some(order))
    }

    async fn find_payment(&self, order_id: i64) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn update_payment_status(
        &self,
        order_id: i64,
        expected: PaymentStatus,
        status: PaymentStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE payments \
             SET status = $1, \
                 transaction_time = CASE WHEN $1 = 'success' THEN NOW() ELSE transaction_time END, \
                 updated_at = NOW() \
             WHERE order_id = $2 AND status = $3",
        )
        .bind(status)
        .bind(order_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_payment_transaction(&self, order_id: i64) -> Result<Option<PaymentTransaction>, AppError> {
        let transaction = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn upsert_payment_transaction(
        &self,
        upsert: &PaymentTransactionUpsert,
    ) -> Result<PaymentTransaction, AppError> {
        let written: Option<PaymentTransaction> = sqlx::query_as(&format!(
            r#"
            INSERT INTO payment_transactions (
                order_id, midtrans_order_id, midtrans_transaction_id,
                gross_amount, qr_url, status, expired_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO UPDATE SET
                midtrans_order_id = EXCLUDED.midtrans_order_id,
                midtrans_transaction_id = COALESCE(EXCLUDED.midtrans_transaction_id, payment_transactions.midtrans_transaction_id),
                gross_amount = EXCLUDED.gross_amount,
                qr_url = COALESCE(EXCLUDED.qr_url, payment_transactions.qr_url),
                status = EXCLUDED.status,
                expired_at = COALESCE(EXCLUDED.expired_at, payment_transactions.expired_at),
                updated_at = NOW()
            WHERE payment_transactions.status <> 'settlement'
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(upsert.order_id)
        .bind(&upsert.midtrans_order_id)
        .bind(upsert.midtrans_transaction_id.as_deref())
        .bind(upsert.gross_amount)
        .bind(upsert.qr_url.as_deref())
        .bind(upsert.status)
        .bind(upsert.expired_at)
        .fetch_optional(&self.pool)
        .await?;

        match written {
            Some(transaction) => Ok(transaction),
            // Row settlement tidak ditimpa, kembalikan apa adanya
            None => self
                .find_payment_transaction(upsert.order_id)
                .await?
                .ok_or_else(|| AppError::internal("Payment transaction hilang setelah upsert")),
        }
    }

    async fn update_transaction_status(
        &self,
        order_id: i64,
        expected: TransactionStatus,
        status: TransactionStatus,
        midtrans_transaction_id: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE payment_transactions \
             SET status = $1, \
                 midtrans_transaction_id = COALESCE($2, midtrans_transaction_id), \
                 updated_at = NOW() \
             WHERE order_id = $3 AND status = $4 AND status <> 'settlement'",
        )
        .bind(status)
        .bind(midtrans_transaction_id)
        .bind(order_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_payment_transaction_if_absent(
        &self,
        insert: &PaymentTransactionUpsert,
    ) -> Result<PaymentTransaction, AppError> {
        let inserted: Option<PaymentTransaction> = sqlx::query_as(&format!(
            r#"
            INSERT INTO payment_transactions (
                order_id, midtrans_order_id, midtrans_transaction_id,
                gross_amount, qr_url, status, expired_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(insert.order_id)
        .bind(&insert.midtrans_order_id)
        .bind(insert.midtrans_transaction_id.as_deref())
        .bind(insert.gross_amount)
        .bind(insert.qr_url.as_deref())
        .bind(insert.status)
        .bind(insert.expired_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(transaction) => Ok(transaction),
            // Writer lain lebih dulu, pakai row miliknya
            None => self
                .find_payment_transaction(insert.order_id)
                .await?
                .ok_or_else(|| AppError::internal("Payment transaction hilang setelah insert")),
        }
    }

    async fn record_raw_notification(&self, order_id: i64, raw: &serde_json::Value) -> Result<(), AppError> {
        sqlx::query("UPDATE payment_transactions SET raw_notification = $1, updated_at = NOW() WHERE order_id = $2")
            .bind(raw)
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn transactions_due_for_sync(
        &self,
        now: DateTime<Utc>,
        retry_before: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, AppError> {
        let transactions = sqlx::query_as(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM payment_transactions t
            WHERE (
                (t.status = 'pending' AND t.expired_at IS NOT NULL AND t.expired_at < $1)
                OR (
                    t.status = 'settlement'
                    AND EXISTS (
                        SELECT 1 FROM payments p
                        WHERE p.order_id = t.order_id AND p.status IN ('pending', 'failed')
                    )
                )
            )
            AND (t.last_synced_at IS NULL OR t.last_synced_at < $2)
            ORDER BY t.last_synced_at NULLS FIRST, t.expired_at
            LIMIT 100
            "#
        ))
        .bind(now)
        .bind(retry_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn mark_sync_attempt(&self, order_id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE payment_transactions SET last_synced_at = $1 WHERE order_id = $2")
            .bind(at)
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_notification(&self, user_id: i32, title: &str, message: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO notifications (user_id, title, message) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(title)
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// Butuh Postgres: DATABASE_URL=... cargo test -- --ignored
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{DraftLine, Money, OrderStatus, PaymentMethod, PriceBreakdown};

    const USER_ID: i32 = 42;

    async fn seed_product(pool: &PgPool, stock_30ml: i32, stock_50ml: i32) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO products (name, price_30ml, price_50ml, stock_30ml, stock_50ml) \
             VALUES ('Santal Noir', 15000000, 22000000, $1, $2) RETURNING id",
        )
        .bind(stock_30ml)
        .bind(stock_50ml)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn seed_cart(pool: &PgPool, product_id: i64, size: Size, quantity: i32) -> i64 {
        sqlx::query_scalar("INSERT INTO carts (user_id, product_id, size, quantity) VALUES ($1, $2, $3, $4) RETURNING id")
            .bind(USER_ID)
            .bind(product_id)
            .bind(size)
            .bind(quantity)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn line(product_id: i64, size: Size, quantity: i32) -> DraftLine {
        let unit_price = Money::from_rupiah(150_000);
        DraftLine {
            product_id,
            size,
            quantity,
            unit_price,
            line_subtotal: Money(unit_price.0 * quantity as i64),
        }
    }

    fn draft(lines: Vec<DraftLine>, cart_ids: Vec<i64>) -> OrderDraft {
        let subtotal = Money(lines.iter().map(|l| l.line_subtotal.0).sum());
        OrderDraft {
            user_id: USER_ID,
            status: OrderStatus::Pending,
            prices: PriceBreakdown::from_subtotal(subtotal),
            shipping_address: "Jl. Braga No. 12, Bandung, Jawa Barat".to_string(),
            payment_method: PaymentMethod::Qris,
            lines,
            cart_ids,
        }
    }

    fn transaction_for(order_id: i64, status: TransactionStatus) -> PaymentTransactionUpsert {
        PaymentTransactionUpsert {
            order_id,
            midtrans_order_id: format!("ORDER-{}-1760860800", order_id),
            midtrans_transaction_id: None,
            gross_amount: Money::from_rupiah(157_500),
            qr_url: None,
            status,
            expired_at: Some(Utc::now()),
        }
    }

    async fn stock_30ml(store: &PgCommerceStore, product_id: i64) -> i32 {
        store.stock_level(product_id).await.unwrap().unwrap().for_size(Size::Ml30)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_reserve_rejects_overdraw(pool: PgPool) {
        let product_id = seed_product(&pool, 2, 0).await;
        let store = PgCommerceStore::new(pool);

        assert_eq!(store.reserve_stock(product_id, Size::Ml30, 2).await.unwrap(), 0);

        let err = store.reserve_stock(product_id, Size::Ml30, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Stock(StockError::InsufficientStock { available: 0, .. })));
        assert_eq!(stock_30ml(&store, product_id).await, 0);

        let err = store.reserve_stock(product_id + 1000, Size::Ml30, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Stock(StockError::ProductNotFound(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_release_past_counter_limit_rejected(pool: PgPool) {
        let product_id = seed_product(&pool, i32::MAX - 1, 0).await;
        let store = PgCommerceStore::new(pool);

        let err = store.release_stock(product_id, Size::Ml30, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Stock(StockError::CounterOverflow { .. })));
        assert_eq!(stock_30ml(&store, product_id).await, i32::MAX - 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_create_order_all_or_nothing(pool: PgPool) {
        let plenty = seed_product(&pool, 5, 0).await;
        let scarce = seed_product(&pool, 1, 0).await;
        let cart_a = seed_cart(&pool, plenty, Size::Ml30, 2).await;
        let cart_b = seed_cart(&pool, scarce, Size::Ml30, 3).await;
        let store = PgCommerceStore::new(pool.clone());

        let result = store
            .create_order(&draft(
                vec![line(plenty, Size::Ml30, 2), line(scarce, Size::Ml30, 3)],
                vec![cart_a, cart_b],
            ))
            .await;

        assert!(matches!(result, Err(StoreError::Stock(StockError::InsufficientStock { available: 1, .. }))));
        assert_eq!(stock_30ml(&store, plenty).await, 5);
        assert_eq!(stock_30ml(&store, scarce).await, 1);

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(&pool).await.unwrap();
        let carts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts").fetch_one(&pool).await.unwrap();
        assert_eq!(orders, 0);
        assert_eq!(carts, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_create_order_commits_every_row(pool: PgPool) {
        let product_id = seed_product(&pool, 5, 0).await;
        let cart_id = seed_cart(&pool, product_id, Size::Ml30, 2).await;
        let store = PgCommerceStore::new(pool.clone());

        let (order, payment) = store
            .create_order(&draft(vec![line(product_id, Size::Ml30, 2)], vec![cart_id]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, Money::from_rupiah(315_000));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, order.total_price);
        assert_eq!(store.order_items(order.id).await.unwrap().len(), 1);
        assert_eq!(stock_30ml(&store, product_id).await, 3);

        let carts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts").fetch_one(&pool).await.unwrap();
        assert_eq!(carts, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_double_cancel_releases_stock_once(pool: PgPool) {
        let product_id = seed_product(&pool, 5, 0).await;
        let store = PgCommerceStore::new(pool);
        let (order, _) = store.create_order(&draft(vec![line(product_id, Size::Ml30, 2)], vec![])).await.unwrap();
        assert_eq!(stock_30ml(&store, product_id).await, 3);

        let cancel = |expected_version| OrderStatusChange {
            order_id: order.id,
            expected_version,
            status: OrderStatus::Cancelled,
            tracking_number: None,
            release_stock: true,
        };

        let first = store.commit_transition(&cancel(0)).await.unwrap().unwrap();
        assert!(first.stock_released);
        assert_eq!(first.version, 1);
        assert_eq!(stock_30ml(&store, product_id).await, 5);

        // Versi basi kalah CAS
        assert!(store.commit_transition(&cancel(0)).await.unwrap().is_none());

        let second = store.commit_transition(&cancel(1)).await.unwrap().unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(stock_30ml(&store, product_id).await, 5);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_transaction_status_never_leaves_settlement(pool: PgPool) {
        let product_id = seed_product(&pool, 5, 0).await;
        let store = PgCommerceStore::new(pool);
        let (order, _) = store.create_order(&draft(vec![line(product_id, Size::Ml30, 1)], vec![])).await.unwrap();

        store.upsert_payment_transaction(&transaction_for(order.id, TransactionStatus::Pending)).await.unwrap();
        assert!(store
            .update_transaction_status(order.id, TransactionStatus::Pending, TransactionStatus::Settlement, Some("trx-1"))
            .await
            .unwrap());

        // CAS dengan expected yang salah tidak menyentuh row
        assert!(!store
            .update_transaction_status(order.id, TransactionStatus::Pending, TransactionStatus::Expire, None)
            .await
            .unwrap());
        assert!(!store
            .update_transaction_status(order.id, TransactionStatus::Settlement, TransactionStatus::Expire, None)
            .await
            .unwrap());

        let kept = store.upsert_payment_transaction(&transaction_for(order.id, TransactionStatus::Pending)).await.unwrap();
        assert_eq!(kept.status, TransactionStatus::Settlement);

        let kept = store
            .insert_payment_transaction_if_absent(&transaction_for(order.id, TransactionStatus::Pending))
            .await
            .unwrap();
        assert_eq!(kept.status, TransactionStatus::Settlement);
        assert_eq!(kept.midtrans_transaction_id.as_deref(), Some("trx-1"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "butuh Postgres (DATABASE_URL)"]
    async fn test_synced_transaction_backs_off(pool: PgPool) {
        let product_id = seed_product(&pool, 5, 0).await;
        let store = PgCommerceStore::new(pool);
        let (first, _) = store.create_order(&draft(vec![line(product_id, Size::Ml30, 1)], vec![])).await.unwrap();
        let (second, _) = store.create_order(&draft(vec![line(product_id, Size::Ml30, 1)], vec![])).await.unwrap();

        store.upsert_payment_transaction(&transaction_for(first.id, TransactionStatus::Pending)).await.unwrap();
        store.upsert_payment_transaction(&transaction_for(second.id, TransactionStatus::Pending)).await.unwrap();

        let now = Utc::now() + chrono::Duration::minutes(1);
        let retry_before = now - chrono::Duration::minutes(15);
        assert_eq!(store.transactions_due_for_sync(now, retry_before).await.unwrap().len(), 2);

        store.mark_sync_attempt(first.id, now).await.unwrap();
        let due = store.transactions_due_for_sync(now, retry_before).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].order_id, second.id);
    }
}
