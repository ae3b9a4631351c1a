use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};

use crate::config::AppState;
use crate::domain::order::{CheckoutRequest, OrderStatus, UpdateOrderStatusRequest};
use crate::domain::stock::AdjustStockRequest;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Checkout keranjang menjadi order
#[utoipa::path(
    post,
    path = "/orders",
    tag = "orders",
    summary = "Checkout keranjang",
    description = "Buat order + line item + payment dari item keranjang dan reserve stok. All-or-nothing.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order berhasil dibuat", body = serde_json::Value),
        (status = 400, description = "Keranjang kosong, alamat tidak valid, atau stok tidak cukup"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn checkout(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (order, payment) = state.orders.checkout(auth.user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Order berhasil dibuat",
            "data": {
                "order": order,
                "payment": payment
            }
        })),
    ))
}

/// Detail order beserta line item
#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "orders",
    summary = "Detail order",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    responses(
        (status = 200, description = "Detail order", body = serde_json::Value),
        (status = 403, description = "Order milik user lain"),
        (status = 404, description = "Order tidak ditemukan")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_order(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let detail = state.orders.get_order(auth.actor(), id).await?;

    Ok(Json(json!({
        "success": true,
        "data": detail
    })))
}

/// Customer membatalkan order (hanya saat Packaging)
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    tag = "orders",
    summary = "Batalkan order",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    responses(
        (status = 200, description = "Order dibatalkan, stok dikembalikan", body = serde_json::Value),
        (status = 400, description = "Transisi tidak valid"),
        (status = 409, description = "Order sedang diubah proses lain")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn cancel_order(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.transition(id, auth.actor(), OrderStatus::Cancelled, None).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Order berhasil dibatalkan",
        "data": order
    })))
}

/// Customer menandai pesanan sudah diterima
#[utoipa::path(
    post,
    path = "/orders/{id}/finish",
    tag = "orders",
    summary = "Tandai pesanan diterima",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    responses(
        (status = 200, description = "Order selesai", body = serde_json::Value),
        (status = 400, description = "Transisi tidak valid")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn finish_order(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let order = state.orders.transition(id, auth.actor(), OrderStatus::Delivered, None).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Pesanan telah diterima",
        "data": order
    })))
}

/// Proyeksi status pembayaran untuk polling client
#[utoipa::path(
    get,
    path = "/orders/{id}/payment-status",
    tag = "orders",
    summary = "Status pembayaran order",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    responses(
        (status = 200, description = "Status order, payment, dan transaksi QRIS", body = serde_json::Value),
        (status = 404, description = "Order tidak ditemukan")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_payment_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let view = state.orders.payment_status(auth.actor(), id).await?;

    Ok(Json(json!({
        "success": true,
        "data": view
    })))
}

/// Admin mengubah status order
#[utoipa::path(
    put,
    path = "/admin/orders/{id}/status",
    tag = "admin",
    summary = "Update status order",
    description = "Admin memindahkan order ke Packaging, Shipping (wajib nomor resi), Delivered, atau Cancelled",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status order diperbarui", body = serde_json::Value),
        (status = 400, description = "Transisi tidak valid atau nomor resi kosong"),
        (status = 403, description = "Bukan admin")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_order_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = auth.require_admin()?;

    if request.status == OrderStatus::Pending {
        return Err(AppError::validation("Order tidak bisa dikembalikan ke Pending"));
    }

    let order = state
        .orders
        .transition(id, actor, request.status, request.tracking_number.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Status order diperbarui menjadi {}", order.status),
        "data": order
    })))
}

/// Admin merefund pembayaran order yang dibatalkan
#[utoipa::path(
    post,
    path = "/admin/orders/{id}/refund",
    tag = "admin",
    summary = "Refund pembayaran",
    description = "Payment Success -> Refunded, hanya untuk order Cancelled",
    params(
        ("id" = i64, Path, description = "ID order")
    ),
    responses(
        (status = 200, description = "Payment direfund", body = serde_json::Value),
        (status = 400, description = "Order belum Cancelled atau payment belum Success"),
        (status = 403, description = "Bukan admin")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn refund_order(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let actor = auth.require_admin()?;
    let payment = state.orders.refund(id, actor).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Pembayaran berhasil direfund",
        "data": payment
    })))
}

/// Counter stok produk
#[utoipa::path(
    get,
    path = "/products/{id}/stock",
    tag = "stock",
    summary = "Stok produk",
    params(
        ("id" = i64, Path, description = "ID produk")
    ),
    responses(
        (status = 200, description = "Stok 30ml dan 50ml", body = serde_json::Value),
        (status = 404, description = "Produk tidak ditemukan")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_stock(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let level = state.stock.level(id).await?;

    Ok(Json(json!({
        "success": true,
        "data": level
    })))
}

/// Admin koreksi stok (restock atau penjualan POS)
#[utoipa::path(
    post,
    path = "/admin/products/{id}/stock",
    tag = "admin",
    summary = "Koreksi stok",
    description = "Delta positif menambah stok, delta negatif mengurangi stok (penjualan di toko)",
    params(
        ("id" = i64, Path, description = "ID produk")
    ),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stok setelah koreksi", body = serde_json::Value),
        (status = 400, description = "Stok tidak cukup atau delta tidak valid"),
        (status = 403, description = "Bukan admin")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn adjust_stock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Json<Value>, AppError> {
    auth.require_admin()?;
    let level = state.stock.adjust(id, &request).await?;

    Ok(Json(json!({
        "success": true,
        "data": level
    })))
}
