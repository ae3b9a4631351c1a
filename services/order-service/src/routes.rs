// API Routes untuk Order Service

use crate::config::AppState;
use crate::handlers::{order_handler, payment_handler};
use crate::middleware::auth::jwt_auth_middleware;
use axum::{
    http::{header::HeaderValue, Method, StatusCode},
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

// OpenAPI Documentation untuk Order Service
#[derive(OpenApi)]
#[openapi(
    paths(
        order_handler::checkout,
        order_handler::get_order,
        order_handler::cancel_order,
        order_handler::finish_order,
        order_handler::get_payment_status,
        order_handler::update_order_status,
        order_handler::refund_order,
        order_handler::get_stock,
        order_handler::adjust_stock,
        payment_handler::create_qris_payment,
        payment_handler::payment_webhook,
        payment_handler::midtrans_notification,
        payment_handler::sync_payment,
        payment_handler::health_check,
    ),
    components(
        schemas(
            crate::domain::order::CheckoutRequest,
            crate::domain::order::UpdateOrderStatusRequest,
            crate::domain::order::OrderStatus,
            crate::domain::order::PaymentMethod,
            crate::domain::payment::PaymentStatus,
            crate::domain::payment::TransactionStatus,
            crate::domain::payment::CreateQrisRequest,
            crate::domain::payment::MidtransNotification,
            crate::domain::stock::Size,
            crate::domain::stock::AdjustStockRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Checkout dan lifecycle order"),
        (name = "payments", description = "Charge QRIS dan notifikasi Midtrans"),
        (name = "stock", description = "Stok per ukuran botol"),
        (name = "admin", description = "Operasi admin toko")
    ),
    info(
        title = "Order Service API",
        description = "Order, payment, dan rekonsiliasi Midtrans/QRIS untuk Parfum Store",
        version = "1.0.0"
    )
)]
pub struct ApiDoc;

// Security scheme modifier untuk Bearer JWT authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

// Buat router dengan JWT authentication
pub fn create_routes(state: AppState) -> Result<Router, String> {
    if state.config.is_production() {
        tracing::warn!("Order Service running in PRODUCTION mode");
    } else {
        tracing::info!("Order Service running in DEVELOPMENT mode");
    }

    let allowed_origin = state
        .config
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|_| "FRONTEND_URL harus valid URL format".to_string())?;

    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(false)
        .max_age(Duration::from_secs(86400));

    // Public routes - tanpa JWT authentication
    let public_routes = Router::new()
        .route("/health", get(payment_handler::health_check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state.clone());

    // Protected routes - dengan JWT authentication
    let protected_routes = build_api_routes(state.clone()).layer(axum::middleware::from_fn_with_state(
        state.clone(),
        jwt_auth_middleware,
    ));

    let timed_routes = public_routes
        .merge(protected_routes)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)));

    // Webhook gateway di luar timeout: selalu dibalas 200 setelah diproses
    let webhook_routes = Router::new()
        .route("/payments/webhook", post(payment_handler::payment_webhook))
        .route("/payments/midtrans/notification", post(payment_handler::midtrans_notification))
        .with_state(state);

    Ok(timed_routes.merge(webhook_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    ))
}

fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // ===== Orders =====
        .route("/orders", post(order_handler::checkout))
        .route("/orders/{id}", get(order_handler::get_order))
        .route("/orders/{id}/cancel", post(order_handler::cancel_order))
        .route("/orders/{id}/finish", post(order_handler::finish_order))
        .route("/orders/{id}/payment-status", get(order_handler::get_payment_status))

        // ===== Payments =====
        .route("/payments/qris", post(payment_handler::create_qris_payment))

        // ===== Stock =====
        .route("/products/{id}/stock", get(order_handler::get_stock))

        // ===== Admin =====
        .route("/admin/orders/{id}/status", put(order_handler::update_order_status))
        .route("/admin/orders/{id}/refund", post(order_handler::refund_order))
        .route("/admin/orders/{id}/payment-sync", post(payment_handler::sync_payment))
        .route("/admin/products/{id}/stock", post(order_handler::adjust_stock))
        .with_state(state)
}
