// Fixture bersama untuk test service dan pipeline
use std::sync::Arc;

use crate::config::MidtransConfig;
use crate::domain::order::{CheckoutRequest, Money, Order, PaymentMethod};
use crate::domain::payment::{MidtransNotification, Payment};
use crate::domain::stock::Size;
use crate::error::AppResult;
use crate::handlers::midtrans_service::notification_signature;
use crate::repositories::memory_repo::MemoryStore;
use crate::services::order_service::OrderService;

pub const CUSTOMER_ID: i32 = 42;
pub const PRODUCT_ID: i64 = 7;
pub const SERVER_KEY: &str = "SB-Mid-server-test";

/// Satu produk Rp 150.000 (30ml) dengan stok 30ml sesuai parameter dan 10 botol 50ml
pub fn seeded_store(stock_30ml: i32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_product(PRODUCT_ID, Money::from_rupiah(150_000), stock_30ml, 10);
    store
}

pub async fn checkout_one(
    service: &OrderService,
    store: &MemoryStore,
    size: Size,
    quantity: i32,
    payment_method: PaymentMethod,
) -> AppResult<(Order, Payment)> {
    let cart_id = store.add_cart(CUSTOMER_ID, PRODUCT_ID, size, quantity);
    service
        .checkout(
            CUSTOMER_ID,
            CheckoutRequest {
                cart_ids: vec![cart_id],
                shipping_address: "Jl. Braga No. 12, Bandung, Jawa Barat".to_string(),
                payment_method,
            },
        )
        .await
}

pub fn midtrans_config() -> MidtransConfig {
    MidtransConfig {
        server_key: SERVER_KEY.to_string(),
        client_key: "SB-Mid-client-test".to_string(),
        api_url: "https://api.sandbox.midtrans.com".to_string(),
        is_production: false,
        qris_acquirer: "gopay".to_string(),
        qris_expiry_minutes: 15,
    }
}

/// Notifikasi Midtrans bertanda tangan valid
pub fn signed_notification(gateway_order_id: &str, transaction_status: &str, gross_amount: &str) -> MidtransNotification {
    let status_code = match transaction_status {
        "settlement" | "capture" => "200",
        "pending" => "201",
        _ => "202",
    };

    MidtransNotification {
        order_id: gateway_order_id.to_string(),
        transaction_status: transaction_status.to_string(),
        transaction_id: Some("9aed5972-5b6a-401e-894b-a32c91ed1a3a".to_string()),
        status_code: Some(status_code.to_string()),
        gross_amount: Some(gross_amount.to_string()),
        payment_type: Some("qris".to_string()),
        transaction_time: Some("2026-10-19 10:00:00".to_string()),
        fraud_status: Some("accept".to_string()),
        signature_key: Some(notification_signature(gateway_order_id, status_code, gross_amount, SERVER_KEY)),
    }
}
