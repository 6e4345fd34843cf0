use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::Deserialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::client::{extract_collection, ApiClient};
use crate::errors::ServiceError;
use crate::models::transfer::{BatchAllocation, TransferItem, TransferRequest};

/// Units of each batch kept back at the source branch, excluded from
/// transfer allocation.
pub const DEFAULT_SAFETY_FLOOR: i32 = 5;

/// Backend wire shape for one FEFO batch. The backend reports availability
/// either directly (`available_quantity`) or as `quantity` minus
/// `reserved_quantity`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteBatch {
    pub id: Uuid,
    #[serde(default, alias = "lot_number")]
    pub batch_code: Option<String>,
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub available_quantity: Option<i32>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub reserved_quantity: Option<i32>,
}

impl RemoteBatch {
    pub fn available(&self) -> i32 {
        self.available_quantity
            .unwrap_or_else(|| self.quantity.unwrap_or(0) - self.reserved_quantity.unwrap_or(0))
    }
}

/// Result of one preview run over a transfer request. Ephemeral: discard
/// when the detail view closes, recompute on the next open.
#[derive(Clone, Debug)]
pub struct TransferPreview {
    pub transfer_id: Uuid,
    pub items: Vec<TransferItem>,
}

impl TransferPreview {
    pub fn is_fully_allocated(&self) -> bool {
        self.items.iter().all(|item| item.missing_qty == 0)
    }

    pub fn short_items(&self) -> Vec<&TransferItem> {
        self.items.iter().filter(|item| item.is_short()).collect()
    }
}

/// Simulates how a transfer's requested quantities would be satisfied from
/// the source branch's batches, First-Expired-First-Out. Read-only: never
/// mutates backend state, safe to invoke repeatedly and concurrently.
pub struct AllocationPreviewer {
    client: Arc<ApiClient>,
    safety_floor: i32,
}

impl AllocationPreviewer {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            safety_floor: DEFAULT_SAFETY_FLOOR,
        }
    }

    pub fn with_safety_floor(client: Arc<ApiClient>, safety_floor: i32) -> Self {
        Self {
            client,
            safety_floor,
        }
    }

    /// Enriches every item with its batch allocation. Items are independent
    /// (disjoint batch pools), so their batch fetches run concurrently; a
    /// failed fetch degrades that item to full shortage without aborting
    /// the rest.
    #[instrument(skip(self, transfer), fields(transfer_id = %transfer.id))]
    pub async fn preview(&self, transfer: &TransferRequest) -> TransferPreview {
        let items = join_all(
            transfer
                .items
                .iter()
                .map(|item| self.preview_item(transfer.source_branch_id, item)),
        )
        .await;

        TransferPreview {
            transfer_id: transfer.id,
            items,
        }
    }

    async fn preview_item(&self, source_branch_id: Uuid, item: &TransferItem) -> TransferItem {
        let mut enriched =
            TransferItem::new(item.product_id, item.product_name.clone(), item.requested_qty);

        match self.fetch_batches(source_branch_id, item.product_id).await {
            Ok(batches) => {
                let (allocated, details) =
                    allocate_item(item.requested_qty, &batches, self.safety_floor);
                enriched.allocated_qty = allocated;
                enriched.missing_qty = item.requested_qty - allocated;
                enriched.batches = details;
            }
            Err(e) => {
                warn!(
                    product_id = %item.product_id,
                    error = %e,
                    "Batch lookup failed, item degrades to full shortage"
                );
            }
        }
        enriched
    }

    async fn fetch_batches(
        &self,
        branch_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<RemoteBatch>, ServiceError> {
        let body = self
            .client
            .get_raw(&format!("product-batches/fefo/{}/{}", branch_id, product_id))
            .await?;
        let records = extract_collection(&body, "batches").ok_or_else(|| {
            ServiceError::ExternalApiError(
                "Batch list response did not match any accepted shape".to_string(),
            )
        })?;

        let mut batches = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<RemoteBatch>(record) {
                Ok(batch) => batches.push(batch),
                Err(e) => warn!(error = %e, "Skipping malformed batch record"),
            }
        }
        Ok(batches)
    }
}

/// Greedy FEFO core over already-fetched batches.
///
/// Batches arrive pre-sorted by ascending expiry and are consumed in that
/// order, never reordered here. Every input batch appears in the output
/// with its `transferable` figure; untouched batches carry `take_qty = 0`.
/// Returns the total allocated alongside the per-batch detail.
pub fn allocate_item(
    requested_qty: i32,
    batches: &[RemoteBatch],
    safety_floor: i32,
) -> (i32, Vec<BatchAllocation>) {
    let mut remaining = requested_qty.max(0);
    let mut total = 0;
    let mut details = Vec::with_capacity(batches.len());

    for batch in batches {
        let transferable = (batch.available() - safety_floor).max(0);
        let take = remaining.min(transferable);
        remaining -= take;
        total += take;

        details.push(BatchAllocation {
            batch_id: batch.id,
            batch_code: batch
                .batch_code
                .clone()
                .unwrap_or_else(|| batch.id.to_string()),
            expiry_date: batch.expiry_date,
            transferable,
            take_qty: take,
        });
    }

    (total, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(code: &str, expiry: (i32, u32, u32), available: i32) -> RemoteBatch {
        RemoteBatch {
            id: Uuid::new_v4(),
            batch_code: Some(code.to_string()),
            expiry_date: NaiveDate::from_ymd_opt(expiry.0, expiry.1, expiry.2).unwrap(),
            available_quantity: Some(available),
            quantity: None,
            reserved_quantity: None,
        }
    }

    #[test]
    fn fefo_takes_from_earliest_expiry_first() {
        // Transferables [5, 5, 5] against a request of 8: 5 from the first
        // batch, 3 from the second, third untouched.
        let batches = vec![
            batch("B-1", (2026, 9, 1), 10),
            batch("B-2", (2026, 10, 1), 10),
            batch("B-3", (2026, 11, 1), 10),
        ];
        let (total, details) = allocate_item(8, &batches, 5);

        assert_eq!(total, 8);
        assert_eq!(
            details.iter().map(|d| d.take_qty).collect::<Vec<_>>(),
            vec![5, 3, 0]
        );
        assert_eq!(details.len(), 3);
    }

    #[test]
    fn safety_floor_is_never_allocated() {
        let batches = vec![batch("B-1", (2026, 9, 1), 5)];
        let (total, details) = allocate_item(10, &batches, 5);

        assert_eq!(total, 0);
        assert_eq!(details[0].transferable, 0);
        assert_eq!(details[0].take_qty, 0);
    }

    #[test]
    fn shortage_is_requested_minus_allocated() {
        let batches = vec![batch("B-1", (2026, 9, 1), 8)];
        let (total, _) = allocate_item(10, &batches, 5);
        assert_eq!(total, 3);
    }

    #[test]
    fn allocation_is_idempotent_over_unchanged_batches() {
        let batches = vec![
            batch("B-1", (2026, 9, 1), 12),
            batch("B-2", (2026, 10, 1), 7),
        ];
        let first = allocate_item(9, &batches, 5);
        let second = allocate_item(9, &batches, 5);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn availability_falls_back_to_quantity_minus_reserved() {
        let b = RemoteBatch {
            id: Uuid::new_v4(),
            batch_code: None,
            expiry_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            available_quantity: None,
            quantity: Some(20),
            reserved_quantity: Some(4),
        };
        assert_eq!(b.available(), 16);
    }
}
