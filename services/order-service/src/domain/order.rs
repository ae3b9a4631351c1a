use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;
use thiserror::Error;

use crate::domain::stock::Size;

/// Nominal uang dalam satuan sen (dua digit presisi)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct Money(pub i64);

/// Pajak tetap 5% dari subtotal
pub const TAX_PERCENT: i64 = 5;

impl Money {
    pub fn from_rupiah(rupiah: i64) -> Self {
        Money(rupiah * 100)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Pajak dibulatkan half-up ke sen terdekat
    pub fn tax(&self) -> Money {
        Money((self.0 * TAX_PERCENT + 50).div_euclid(100))
    }

    /// Pembulatan half-up ke rupiah utuh (Midtrans hanya terima integer)
    pub fn to_whole_rupiah(&self) -> i64 {
        (self.0 + 50).div_euclid(100)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_mul(&self, quantity: i32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::default(), |acc, m| acc + m)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0.div_euclid(100), self.0.rem_euclid(100))
    }
}

// Rincian harga order: subtotal, pajak, total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl PriceBreakdown {
    pub fn from_subtotal(subtotal: Money) -> Self {
        let tax = subtotal.tax();
        Self {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

// Status order (lowercase di database, satu vocabulary untuk semua tabel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Packaging,
    Shipping,
    Delivered,
    #[serde(alias = "Cancel")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Packaging => "Packaging",
            OrderStatus::Shipping => "Shipping",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Status awal order saat checkout, tergantung metode bayar
    pub fn initial_for(method: PaymentMethod) -> Self {
        match method {
            // Cash dibayar saat pickup/delivery, langsung dikemas
            PaymentMethod::Cash => OrderStatus::Packaging,
            PaymentMethod::Qris | PaymentMethod::VirtualAccount => OrderStatus::Pending,
        }
    }

    /// Actor yang boleh memicu edge `self -> to`. Kosong berarti edge tidak ada.
    pub fn permitted_actors(&self, to: OrderStatus) -> &'static [ActorKind] {
        use ActorKind::*;
        use OrderStatus::*;

        match (self, to) {
            (Pending, Packaging) => &[Admin, Pipeline],
            (Pending, Cancelled) => &[Admin, Pipeline],
            (Packaging, Cancelled) => &[Customer, Admin, Pipeline],
            (Packaging, Shipping) => &[Admin],
            (Shipping, Delivered) => &[Customer, Admin],
            _ => &[],
        }
    }

    /// Satu-satunya pintu perubahan status order
    pub fn transition(
        self,
        to: OrderStatus,
        actor: ActorKind,
        tracking_number: Option<&str>,
    ) -> Result<OrderStatus, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::OrderTerminal { status: self });
        }

        if !self.permitted_actors(to).contains(&actor) {
            return Err(TransitionError::InvalidTransition { from: self, to });
        }

        if to == OrderStatus::Shipping
            && tracking_number.map(str::trim).map_or(true, str::is_empty)
        {
            return Err(TransitionError::TrackingNumberRequired);
        }

        Ok(to)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Order tidak bisa diubah dari {from} ke {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order sudah {status} dan tidak bisa diubah lagi")]
    OrderTerminal { status: OrderStatus },

    #[error("Nomor resi wajib diisi untuk status Shipping")]
    TrackingNumberRequired,
}

// Kelas actor yang boleh menggerakkan state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Customer,
    Admin,
    Pipeline,
}

// Actor konkret beserta identitasnya
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer { user_id: i32 },
    Admin { user_id: i32 },
    Pipeline,
}

impl Actor {
    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::Customer { .. } => ActorKind::Customer,
            Actor::Admin { .. } => ActorKind::Admin,
            Actor::Pipeline => ActorKind::Pipeline,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer { user_id } => write!(f, "customer:{}", user_id),
            Actor::Admin { user_id } => write!(f, "admin:{}", user_id),
            Actor::Pipeline => write!(f, "pipeline"),
        }
    }
}

// Metode pembayaran yang didukung storefront
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "varchar")]
pub enum PaymentMethod {
    #[serde(rename = "QRIS")]
    #[sqlx(rename = "QRIS")]
    Qris,
    #[serde(rename = "Virtual_Account")]
    #[sqlx(rename = "Virtual_Account")]
    VirtualAccount,
    #[serde(rename = "Cash")]
    #[sqlx(rename = "Cash")]
    Cash,
}

// Model data order
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i32,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub total_price: Money,
    pub shipping_address: String,
    pub tracking_number: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(skip)]
    pub version: i64,
    #[serde(skip)]
    pub stock_released: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_owned_by(&self, user_id: i32) -> bool {
        self.user_id == user_id
    }
}

// Snapshot line item saat order dibuat
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderLineItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub size: Size,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_subtotal: Money,
}

// Baris keranjang yang sudah di-join dengan harga katalog
#[derive(Debug, Clone, FromRow)]
pub struct CartLine {
    pub cart_id: i64,
    pub product_id: i64,
    pub size: Size,
    pub quantity: i32,
    pub unit_price: Money,
}

// Line item yang siap di-insert
#[derive(Debug, Clone, PartialEq)]
pub struct DraftLine {
    pub product_id: i64,
    pub size: Size,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_subtotal: Money,
}

// Order yang sudah divalidasi tapi belum di-commit
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: i32,
    pub status: OrderStatus,
    pub prices: PriceBreakdown,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub lines: Vec<DraftLine>,
    pub cart_ids: Vec<i64>,
}

// Perubahan status yang di-commit dengan optimistic version check
#[derive(Debug, Clone)]
pub struct OrderStatusChange {
    pub order_id: i64,
    pub expected_version: i64,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub release_stock: bool,
}

// Request checkout dari keranjang
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CheckoutRequest {
    pub cart_ids: Vec<i64>,
    #[schema(example = "Jl. Braga No. 12, Bandung, Jawa Barat")]
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

// Request admin untuk ubah status order
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[schema(example = "JNE-0012345678")]
    pub tracking_number: Option<String>,
}
