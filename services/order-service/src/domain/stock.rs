use serde::{Deserialize, Serialize};
use thiserror::Error;

// Ukuran botol parfum yang dijual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "varchar")]
pub enum Size {
    #[serde(rename = "30ml")]
    #[sqlx(rename = "30ml")]
    Ml30,
    #[serde(rename = "50ml")]
    #[sqlx(rename = "50ml")]
    Ml50,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Ml30 => "30ml",
            Size::Ml50 => "50ml",
        }
    }

    /// Nama kolom counter stok di tabel products
    pub fn stock_column(&self) -> &'static str {
        match self {
            Size::Ml30 => "stock_30ml",
            Size::Ml50 => "stock_50ml",
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("Stok {size} untuk produk {product_id} tidak cukup (tersisa {available})")]
    InsufficientStock {
        product_id: i64,
        size: Size,
        available: i32,
    },

    #[error("Produk {0} tidak ditemukan")]
    ProductNotFound(i64),

    #[error("Jumlah stok harus lebih dari 0 (diterima {0})")]
    InvalidQuantity(i32),

    #[error("Counter stok {size} produk {product_id} melewati batas maksimum")]
    CounterOverflow { product_id: i64, size: Size },
}

/// Kurangi counter stok. Counter tidak pernah boleh negatif.
pub fn reserve_from(product_id: i64, size: Size, current: i32, qty: i32) -> Result<i32, StockError> {
    if qty <= 0 {
        return Err(StockError::InvalidQuantity(qty));
    }

    if qty > current {
        return Err(StockError::InsufficientStock {
            product_id,
            size,
            available: current,
        });
    }

    Ok(current - qty)
}

/// Kembalikan stok yang sebelumnya di-reserve. Overflow ditolak, bukan dipotong.
pub fn release_into(product_id: i64, size: Size, current: i32, qty: i32) -> Result<i32, StockError> {
    if qty <= 0 {
        return Err(StockError::InvalidQuantity(qty));
    }

    current
        .checked_add(qty)
        .ok_or(StockError::CounterOverflow { product_id, size })
}

// Snapshot counter stok satu produk
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    pub product_id: i64,
    pub stock_30ml: i32,
    pub stock_50ml: i32,
}

impl StockLevel {
    pub fn for_size(&self, size: Size) -> i32 {
        match size {
            Size::Ml30 => self.stock_30ml,
            Size::Ml50 => self.stock_50ml,
        }
    }
}

// Request admin untuk koreksi stok (restock atau penjualan POS)
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AdjustStockRequest {
    pub size: Size,
    #[schema(example = -2)]
    pub delta: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_decrements() {
        assert_eq!(reserve_from(1, Size::Ml30, 5, 2), Ok(3));
        assert_eq!(reserve_from(1, Size::Ml30, 5, 5), Ok(0));
    }

    #[test]
    fn test_reserve_rejects_overdraw() {
        assert_eq!(
            reserve_from(9, Size::Ml50, 1, 2),
            Err(StockError::InsufficientStock { product_id: 9, size: Size::Ml50, available: 1 })
        );
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        assert_eq!(reserve_from(1, Size::Ml30, 5, 0), Err(StockError::InvalidQuantity(0)));
        assert_eq!(release_into(1, Size::Ml30, 5, -1), Err(StockError::InvalidQuantity(-1)));
    }

    #[test]
    fn test_release_overflow_rejected() {
        assert_eq!(release_into(4, Size::Ml50, i32::MAX - 2, 2), Ok(i32::MAX));
        assert_eq!(
            release_into(4, Size::Ml50, i32::MAX - 2, 3),
            Err(StockError::CounterOverflow { product_id: 4, size: Size::Ml50 })
        );
    }

    #[test]
    fn test_counter_never_negative_over_sequence() {
        // Urutan acak reserve/release, counter harus selalu >= 0
        let ops = [3, -2, 4, 1, -5, 2, 6, -1, 2, 2];
        let mut counter = 5;
        for op in ops {
            let before = counter;
            let result = if op > 0 {
                reserve_from(1, Size::Ml30, counter, op)
            } else {
                release_into(1, Size::Ml30, counter, -op)
            };
            match result {
                Ok(next) => counter = next,
                Err(StockError::InsufficientStock { available, .. }) => {
                    assert_eq!(available, before);
                    assert_eq!(counter, before);
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
            assert!(counter >= 0);
        }
    }

    #[test]
    fn test_size_columns() {
        assert_eq!(Size::Ml30.stock_column(), "stock_30ml");
        assert_eq!(Size::Ml50.to_string(), "50ml");
        assert_eq!(serde_json::to_string(&Size::Ml50).unwrap(), "\"50ml\"");
    }
}
