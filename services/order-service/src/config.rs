// Order Service Configuration
use sqlx::{postgres::PgConnectOptions, postgres::PgPoolOptions, PgPool};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::handlers::midtrans_service::{MidtransService, PaymentGateway};
use crate::repositories::order_repo::PgCommerceStore;
use crate::repositories::CommerceStore;
use crate::services::order_service::OrderService;
use crate::services::reconciliation::ReconciliationPipeline;
use crate::services::stock_ledger::StockLedger;

// Kredensial dan parameter Midtrans, di-pass eksplisit ke gateway dan pipeline
#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub server_key: String,
    pub client_key: String,
    pub api_url: String,
    pub is_production: bool,
    pub qris_acquirer: String,
    pub qris_expiry_minutes: i64,
}

// Konfigurasi aplikasi dari environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub midtrans: MidtransConfig,
    pub payment_sync_interval_secs: u64,
    pub disable_scheduler: bool,
    pub app_version: String,
}

fn required(name: &str) -> Result<String, String> {
    env::var(name).map_err(|_| format!("{} harus diset di environment", name))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| format!("{} tidak valid: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl MidtransConfig {
    pub fn from_env() -> Result<Self, String> {
        let api_url = env::var("MIDTRANS_API_URL")
            .unwrap_or_else(|_| "https://api.sandbox.midtrans.com".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(MidtransConfig {
            server_key: required("MIDTRANS_SERVER_KEY")?,
            client_key: required("MIDTRANS_CLIENT_KEY")?,
            is_production: parsed_or("MIDTRANS_IS_PRODUCTION", api_url.contains("api.midtrans.com"))?,
            api_url,
            qris_acquirer: env::var("QRIS_ACQUIRER").unwrap_or_else(|_| "gopay".to_string()),
            qris_expiry_minutes: parsed_or("QRIS_EXPIRY_MINUTES", 15)?,
        })
    }
}

impl AppConfig {
    // Load konfigurasi dari environment dengan validasi
    pub fn from_env() -> Result<Self, String> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        if !cfg!(debug_assertions) && jwt_secret.contains("change-this") {
            return Err("JWT_SECRET masih default! Ganti untuk production".to_string());
        }

        Ok(AppConfig {
            database_url,
            server_host: env::var("ORDER_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parsed_or("ORDER_SERVICE_PORT", 3008)?,
            environment: env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()),
            jwt_secret,
            frontend_url: required("FRONTEND_URL")?,
            midtrans: MidtransConfig::from_env()?,
            payment_sync_interval_secs: parsed_or("PAYMENT_SYNC_INTERVAL_SECS", 300)?,
            disable_scheduler: parsed_or("DISABLE_SCHEDULER", false)?,
            app_version: env::var("APP_VERSION").unwrap_or_else(|_| "1.0.0".to_string()),
        })
    }

    // Helper cek production mode
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

// Inisialisasi database connection pool
pub async fn init_db_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    tracing::info!("🔌 Initializing Order Service database connection...");

    // Parse connection options dan disable prepared statements
    let options = PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(3)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect_with(options)
        .await?;

    tracing::info!("✅ Order Service database pool initialized");
    Ok(pool)
}

// Health check database connection
pub async fn check_db_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_optional(pool).await.is_ok()
}

// Application state yang di-share ke semua handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: AppConfig,
    pub store: Arc<dyn CommerceStore>,
    pub stock: StockLedger,
    pub orders: OrderService,
    pub pipeline: ReconciliationPipeline,
}

impl AppState {
    // Inisialisasi application state
    pub async fn new(config: AppConfig) -> Result<Self, String> {
        let db = init_db_pool(&config.database_url)
            .await
            .map_err(|e| format!("Failed to init database: {}", e))?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .map_err(|e| format!("Failed to run migrations: {}", e))?;

        let store: Arc<dyn CommerceStore> = Arc::new(PgCommerceStore::new(db.clone()));
        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            MidtransService::new(config.midtrans.clone()).map_err(|e| e.to_string())?,
        );

        Ok(AppState {
            stock: StockLedger::new(store.clone()),
            orders: OrderService::new(store.clone()),
            pipeline: ReconciliationPipeline::new(store.clone(), gateway, config.midtrans.clone()),
            store,
            db,
            config,
        })
    }

    // Inisialisasi application state dari environment
    pub async fn from_env() -> Result<Self, String> {
        let config = AppConfig::from_env()?;
        Self::new(config).await
    }

    // Health check semua dependencies
    pub async fn health_check(&self) -> HealthStatus {
        let db_healthy = check_db_health(&self.db).await;

        HealthStatus {
            database: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
            overall: if db_healthy { "healthy" } else { "degraded" }.to_string(),
            version: self.config.app_version.clone(),
        }
    }
}

// Response untuk health check endpoint
#[derive(Debug, serde::Serialize)]
pub struct HealthStatus {
    pub database: String,
    pub overall: String,
    pub version: String,
}
