use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stock posture of one product at a branch, as reported by the backend
/// low-stock listing. Input to the slip auto-fill pass; this crate never
/// mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: Uuid,
    pub product_name: String,
    pub current_stock: i32,
    pub min_stock: i32,
    #[serde(default)]
    pub max_stock: Option<i32>,
    pub unit_price: Decimal,
}

impl ProductStock {
    /// At or below the minimum threshold.
    pub fn is_low(&self) -> bool {
        self.current_stock <= self.min_stock
    }

    /// Replenishment proposal: fill back up to `max_stock`, or to three
    /// times the minimum when no maximum is configured.
    pub fn restock_suggestion(&self) -> i32 {
        match self.max_stock {
            Some(max) => max - self.current_stock,
            None => 3 * self.min_stock,
        }
    }
}
