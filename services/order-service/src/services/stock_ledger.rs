use std::sync::Arc;

use shared::utils::validation::is_valid_quantity;

use crate::domain::stock::{AdjustStockRequest, Size, StockError, StockLevel};
use crate::error::{AppError, AppResult};
use crate::repositories::CommerceStore;

// Counter stok per ukuran, semua mutasi lewat conditional update di store
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn CommerceStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn CommerceStore>) -> Self {
        Self { store }
    }

    /// Kurangi stok, ditolak tanpa perubahan kalau tidak cukup
    pub async fn reserve(&self, product_id: i64, size: Size, qty: i32) -> AppResult<i32> {
        if !is_valid_quantity(qty) {
            return Err(StockError::InvalidQuantity(qty).into());
        }

        let remaining = self.store.reserve_stock(product_id, size, qty).await?;
        tracing::debug!("Reserve {} x{} produk {} -> sisa {}", size, qty, product_id, remaining);
        Ok(remaining)
    }

    pub async fn release(&self, product_id: i64, size: Size, qty: i32) -> AppResult<i32> {
        if !is_valid_quantity(qty) {
            return Err(StockError::InvalidQuantity(qty).into());
        }

        let restored = self.store.release_stock(product_id, size, qty).await?;
        tracing::debug!("Release {} x{} produk {} -> stok {}", size, qty, product_id, restored);
        Ok(restored)
    }

    /// Koreksi admin: delta positif = restock, delta negatif = penjualan POS
    pub async fn adjust(&self, product_id: i64, request: &AdjustStockRequest) -> AppResult<StockLevel> {
        match request.delta {
            0 => return Err(AppError::validation("Delta stok tidak boleh 0")),
            delta if delta > 0 => {
                self.release(product_id, request.size, delta).await?;
            }
            delta => {
                let qty = delta.checked_neg().ok_or_else(|| AppError::validation("Delta stok tidak valid"))?;
                self.reserve(product_id, request.size, qty).await?;
            }
        }

        let level = self.level(product_id).await?;
        tracing::info!(
            "📦 Stok produk {} ({}) dikoreksi {:+} -> {}",
            product_id,
            request.size,
            request.delta,
            level.for_size(request.size)
        );
        Ok(level)
    }

    pub async fn level(&self, product_id: i64) -> AppResult<StockLevel> {
        self.store
            .stock_level(product_id)
            .await?
            .ok_or_else(|| StockError::ProductNotFound(product_id).into())
    }
}
