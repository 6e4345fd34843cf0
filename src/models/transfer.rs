use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Enum representing the possible statuses of a transfer request.
///
/// `Completed` and `Cancelled` are terminal; a terminal request is
/// immutable. Statuses only move forward along
/// Pending → Approved → Shipped → Completed, with Cancelled reachable from
/// any non-terminal state.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum TransferStatus {
    Pending,
    Approved,
    Shipped,
    Completed,
    Cancelled,
}

impl TransferStatus {
    /// Maps a backend status string onto the local enum, case-insensitively.
    /// Unrecognized values collapse to `Cancelled` so callers leave them
    /// alone; the raw value is logged so a new backend state is noticed.
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => TransferStatus::Pending,
            "approved" => TransferStatus::Approved,
            "shipped" => TransferStatus::Shipped,
            "completed" => TransferStatus::Completed,
            "cancelled" => TransferStatus::Cancelled,
            other => {
                warn!(status = other, "Unrecognized transfer status, treating as Cancelled");
                TransferStatus::Cancelled
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }

    /// Validates if a status transition is allowed
    pub fn can_transition_to(self, target: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, target) {
            // From pending
            (Pending, Approved) => true,
            (Pending, Cancelled) => true,

            // From approved
            (Approved, Shipped) => true,
            (Approved, Cancelled) => true,

            // From shipped: no cancel once goods have left the branch
            (Shipped, Completed) => true,

            // All other transitions are invalid
            _ => false,
        }
    }
}

/// One batch's contribution to a previewed allocation. Ephemeral: rebuilt
/// on every preview run, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAllocation {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub expiry_date: NaiveDate,
    /// Quantity available above the safety floor kept at the source branch.
    pub transferable: i32,
    /// Amount taken from this batch under FEFO; 0 for untouched batches.
    pub take_qty: i32,
}

/// One product row within a transfer request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferItem {
    pub product_id: Uuid,
    pub product_name: String,
    /// Fixed at request creation, always positive.
    pub requested_qty: i32,
    /// Derived: recomputed on every preview, 0 before the first preview.
    pub allocated_qty: i32,
    /// `requested_qty - allocated_qty`, never negative.
    pub missing_qty: i32,
    /// Full batch list from the last preview, untouched batches included.
    pub batches: Vec<BatchAllocation>,
}

impl TransferItem {
    pub fn new(product_id: Uuid, product_name: String, requested_qty: i32) -> Self {
        Self {
            product_id,
            product_name,
            requested_qty,
            allocated_qty: 0,
            missing_qty: requested_qty,
            batches: Vec::new(),
        }
    }

    /// The batches that actually contribute to the allocation.
    pub fn allocation_details(&self) -> Vec<&BatchAllocation> {
        self.batches.iter().filter(|b| b.take_qty > 0).collect()
    }

    pub fn is_short(&self) -> bool {
        self.missing_qty > 0
    }
}

/// Canonical transfer request, normalized from the backend representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: Uuid,
    pub code: String,
    pub source_branch_id: Uuid,
    pub target_branch_id: Uuid,
    pub status: TransferStatus,
    pub created_date: DateTime<Utc>,
    pub created_by: String,
    pub notes: Option<String>,
    pub items: Vec<TransferItem>,
}

impl TransferRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Backend wire shape for a transfer record.
#[derive(Debug, Deserialize)]
pub struct RemoteTransfer {
    pub id: Uuid,
    #[serde(default)]
    pub code: Option<String>,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(alias = "created_at")]
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub items: Vec<RemoteTransferItem>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteTransferItem {
    pub product_id: Uuid,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(alias = "requested_quantity")]
    pub quantity: i32,
}

impl From<RemoteTransfer> for TransferRequest {
    fn from(remote: RemoteTransfer) -> Self {
        let code = remote
            .code
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| fallback_code(remote.id));
        let status = remote
            .status
            .as_deref()
            .map(TransferStatus::from_remote)
            .unwrap_or(TransferStatus::Pending);
        let items = remote
            .items
            .into_iter()
            .filter(|item| {
                if item.quantity <= 0 {
                    warn!(product_id = %item.product_id, quantity = item.quantity,
                        "Dropping transfer item with non-positive quantity");
                    return false;
                }
                true
            })
            .map(|item| {
                let name = item
                    .product_name
                    .unwrap_or_else(|| item.product_id.to_string());
                TransferItem::new(item.product_id, name, item.quantity)
            })
            .collect();

        TransferRequest {
            id: remote.id,
            code,
            source_branch_id: remote.from_branch_id,
            target_branch_id: remote.to_branch_id,
            status,
            created_date: remote.created_date,
            created_by: remote.created_by.unwrap_or_else(|| "unknown".to_string()),
            notes: remote.notes,
            items,
        }
    }
}

fn fallback_code(id: Uuid) -> String {
    let short = id.simple().to_string();
    format!("TRF-{}", &short[..8].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("pending", TransferStatus::Pending)]
    #[test_case("APPROVED", TransferStatus::Approved)]
    #[test_case("Shipped", TransferStatus::Shipped)]
    #[test_case("completed", TransferStatus::Completed; "completed maps to completed, not cancelled")]
    #[test_case("cancelled", TransferStatus::Cancelled)]
    #[test_case("some_new_state", TransferStatus::Cancelled; "unknown collapses to cancelled")]
    fn status_normalization(raw: &str, expected: TransferStatus) {
        assert_eq!(TransferStatus::from_remote(raw), expected);
    }

    #[test]
    fn transition_table_is_monotonic() {
        use TransferStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Shipped));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Completed));

        // No cancel after shipping, no skipping, terminals are frozen.
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Approved));
    }

    #[test]
    fn normalization_fills_code_and_skips_bad_items() {
        let id = Uuid::new_v4();
        let remote: RemoteTransfer = serde_json::from_value(json!({
            "id": id,
            "from_branch_id": Uuid::new_v4(),
            "to_branch_id": Uuid::new_v4(),
            "status": "pending",
            "created_at": "2026-01-12T08:30:00Z",
            "items": [
                {"product_id": Uuid::new_v4(), "product_name": "Paracetamol 500mg", "quantity": 40},
                {"product_id": Uuid::new_v4(), "product_name": "Broken row", "quantity": 0}
            ]
        }))
        .unwrap();

        let transfer = TransferRequest::from(remote);
        assert!(transfer.code.starts_with("TRF-"));
        assert_eq!(transfer.items.len(), 1);
        assert_eq!(transfer.items[0].requested_qty, 40);
        assert_eq!(transfer.items[0].missing_qty, 40);
        assert_eq!(transfer.created_by, "unknown");
    }

    #[test]
    fn allocation_details_filters_untouched_batches() {
        let mut item = TransferItem::new(Uuid::new_v4(), "Amoxicillin".into(), 8);
        item.batches = vec![
            BatchAllocation {
                batch_id: Uuid::new_v4(),
                batch_code: "B-1".into(),
                expiry_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                transferable: 5,
                take_qty: 5,
            },
            BatchAllocation {
                batch_id: Uuid::new_v4(),
                batch_code: "B-2".into(),
                expiry_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                transferable: 5,
                take_qty: 0,
            },
        ];
        item.allocated_qty = 5;
        item.missing_qty = 3;

        assert_eq!(item.allocation_details().len(), 1);
        assert!(item.is_short());
    }
}
