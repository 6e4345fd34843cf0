use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Slip direction: Import receives stock from a supplier order, Export
/// sends stock to another branch through an inventory transfer.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SlipType {
    Import,
    Export,
}

/// Enum representing the possible statuses of a stock slip.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum SlipStatus {
    Pending,
    Completed,
    Cancelled,
}

impl SlipStatus {
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => SlipStatus::Pending,
            "completed" => SlipStatus::Completed,
            "cancelled" => SlipStatus::Cancelled,
            other => {
                warn!(status = other, "Unrecognized slip status, treating as Cancelled");
                SlipStatus::Cancelled
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SlipStatus::Completed | SlipStatus::Cancelled)
    }
}

/// One product line on a slip. `actual_quantity` stays 0 while the slip is
/// Pending; it is only meaningful after the receiving step reconciles it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlipItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    /// Planned quantity, set at draft time.
    pub request_quantity: i32,
    /// Reconciled at receipt; 0 until the slip leaves Pending.
    pub actual_quantity: i32,
}

/// A planned stock movement document, before and after physical
/// reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockSlip {
    pub id: Uuid,
    pub code: String,
    pub slip_type: SlipType,
    pub reason: String,
    pub status: SlipStatus,
    pub branch_id: Uuid,
    /// Destination branch, Export slips only.
    pub target_branch_id: Option<Uuid>,
    pub items: Vec<SlipItem>,
    pub total_amount: Decimal,
    pub created_date: DateTime<Utc>,
}

/// Σ quantity × unit price, rounded to exactly two decimal places.
pub fn compute_total(items: &[SlipItem]) -> Decimal {
    items
        .iter()
        .map(|item| Decimal::from(item.request_quantity) * item.unit_price)
        .sum::<Decimal>()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Backend wire shape for a slip (supplier order or inventory transfer).
#[derive(Debug, Deserialize)]
pub struct RemoteSlip {
    pub id: Uuid,
    #[serde(default, alias = "order_number")]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "notes")]
    pub reason: Option<String>,
    #[serde(alias = "from_branch_id")]
    pub branch_id: Uuid,
    #[serde(default, alias = "to_branch_id")]
    pub target_branch_id: Option<Uuid>,
    #[serde(alias = "created_at")]
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<RemoteSlipItem>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteSlipItem {
    pub product_id: Uuid,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(alias = "quantity")]
    pub request_quantity: i32,
    #[serde(default, alias = "received_quantity")]
    pub actual_quantity: i32,
}

impl RemoteSlip {
    pub fn into_slip(self, slip_type: SlipType) -> StockSlip {
        let items: Vec<SlipItem> = self
            .items
            .into_iter()
            .map(|item| SlipItem {
                product_id: item.product_id,
                product_name: item
                    .product_name
                    .unwrap_or_else(|| item.product_id.to_string()),
                unit_price: item.unit_price,
                request_quantity: item.request_quantity,
                actual_quantity: item.actual_quantity,
            })
            .collect();
        let total_amount = compute_total(&items);
        StockSlip {
            id: self.id,
            code: self
                .code
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| format!("SLP-{}", &self.id.simple().to_string()[..8].to_ascii_uppercase())),
            slip_type,
            reason: self.reason.unwrap_or_default(),
            status: self
                .status
                .as_deref()
                .map(SlipStatus::from_remote)
                .unwrap_or(SlipStatus::Pending),
            branch_id: self.branch_id,
            target_branch_id: self.target_branch_id,
            items,
            total_amount,
            created_date: self.created_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(qty: i32, price: Decimal) -> SlipItem {
        SlipItem {
            product_id: Uuid::new_v4(),
            product_name: "Ibuprofen 400mg".to_string(),
            unit_price: price,
            request_quantity: qty,
            actual_quantity: 0,
        }
    }

    #[test]
    fn total_rounds_to_two_decimals() {
        // 3 x 1000.005 + 2 x 2500 = 8000.015 -> 8000.02
        let items = vec![item(3, dec!(1000.005)), item(2, dec!(2500))];
        assert_eq!(compute_total(&items), dec!(8000.02));
    }

    #[test]
    fn total_of_empty_slip_is_zero() {
        assert_eq!(compute_total(&[]), dec!(0.00));
    }

    #[test]
    fn slip_status_normalization_defaults_unknown_to_cancelled() {
        assert_eq!(SlipStatus::from_remote("completed"), SlipStatus::Completed);
        assert_eq!(SlipStatus::from_remote("on_hold"), SlipStatus::Cancelled);
    }

    #[test]
    fn remote_slip_normalizes_with_fallback_code() {
        let remote: RemoteSlip = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "status": "pending",
            "branch_id": Uuid::new_v4(),
            "created_at": "2026-02-01T09:00:00Z",
            "items": [
                {"product_id": Uuid::new_v4(), "unit_price": "5000", "quantity": 10}
            ]
        }))
        .unwrap();

        let slip = remote.into_slip(SlipType::Import);
        assert!(slip.code.starts_with("SLP-"));
        assert_eq!(slip.status, SlipStatus::Pending);
        assert_eq!(slip.items[0].actual_quantity, 0);
        assert_eq!(slip.total_amount, dec!(50000.00));
    }

    #[test]
    fn slip_type_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&SlipType::Import).unwrap(), "\"IMPORT\"");
        assert_eq!(SlipType::Export.to_string(), "EXPORT");
    }
}
