use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::confirm::ConfirmationGate;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::transfer::{TransferRequest, TransferStatus};
use crate::services::allocation::AllocationPreviewer;
use crate::services::transfers::TransferStore;

/// Whether a transition ran to completion or was abandoned at the gate
/// before any backend call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Completed,
    Aborted,
}

/// Result of a split-approve: the original request is approved for its
/// allocatable quantities and one follow-up transfer is created per short
/// item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitResult {
    Approved { follow_up_ids: Vec<Uuid> },
    Aborted,
}

/// Drives transfer requests through
/// Pending → Approved → Shipped → Completed (or → Cancelled).
///
/// Every operation validates the transition table, runs the confirmation
/// gate, calls the backend, emits an event and refreshes the store. There
/// are no optimistic updates: local state only changes through the refresh
/// that follows a confirmed backend success.
pub struct TransferFlowService {
    client: Arc<ApiClient>,
    store: Arc<TransferStore>,
    previewer: AllocationPreviewer,
    event_sender: EventSender,
}

impl TransferFlowService {
    pub fn new(
        client: Arc<ApiClient>,
        store: Arc<TransferStore>,
        previewer: AllocationPreviewer,
        event_sender: EventSender,
    ) -> Self {
        Self {
            client,
            store,
            previewer,
            event_sender,
        }
    }

    /// Approves a fully-allocatable request. The preview is recomputed
    /// immediately before the backend call; any shortage rejects the
    /// operation (use `split_and_approve` instead), which also narrows the
    /// window for approving against stale batch data.
    #[instrument(skip(self, gate))]
    pub async fn approve_full(
        &self,
        id: Uuid,
        gate: &dyn ConfirmationGate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let transfer = self.current(id).await?;
        Self::ensure_transition(&transfer, TransferStatus::Approved)?;

        let preview = self.previewer.preview(&transfer).await;
        if !preview.is_fully_allocated() {
            return Err(ServiceError::InvalidOperation(format!(
                "Transfer {} cannot be approved in full: {} item(s) short",
                transfer.code,
                preview.short_items().len()
            )));
        }

        let prompt = format!("Approve transfer {} in full?", transfer.code);
        if !gate.confirm(&prompt).await {
            return Ok(TransitionOutcome::Aborted);
        }

        self.client
            .post(&format!("inventory-transfers/{}/approve", id), &json!({}))
            .await?;
        info!(transfer_id = %id, code = %transfer.code, "Transfer approved in full");
        self.emit(Event::TransferApproved(id)).await;
        self.refresh_after("approve").await;
        Ok(TransitionOutcome::Completed)
    }

    /// Approves the request for the quantities actually allocatable and
    /// creates one single-product follow-up transfer per short item (the
    /// backend only accepts single-product creation), each carrying that
    /// item's missing quantity and a note referencing the original code.
    #[instrument(skip(self, gate))]
    pub async fn split_and_approve(
        &self,
        id: Uuid,
        gate: &dyn ConfirmationGate,
    ) -> Result<SplitResult, ServiceError> {
        let transfer = self.current(id).await?;
        Self::ensure_transition(&transfer, TransferStatus::Approved)?;

        let preview = self.previewer.preview(&transfer).await;
        let short: Vec<(Uuid, i32)> = preview
            .short_items()
            .iter()
            .map(|item| (item.product_id, item.missing_qty))
            .collect();
        if short.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "Transfer {} has no shortage; approve it in full",
                transfer.code
            )));
        }

        let prompt = format!(
            "Approve transfer {} for the available quantities and create {} follow-up request(s)?",
            transfer.code,
            short.len()
        );
        if !gate.confirm(&prompt).await {
            return Ok(SplitResult::Aborted);
        }

        self.client
            .post(&format!("inventory-transfers/{}/approve", id), &json!({}))
            .await?;

        let mut follow_up_ids = Vec::with_capacity(short.len());
        for (product_id, missing_qty) in short {
            let body = json!({
                "from_branch_id": transfer.source_branch_id,
                "to_branch_id": transfer.target_branch_id,
                "product_id": product_id,
                "quantity": missing_qty,
                "note": format!("Follow-up for {}", transfer.code),
            });
            let data = self.client.post("inventory-transfers", &body).await?;
            match data.get("id").and_then(parse_uuid) {
                Some(follow_up_id) => follow_up_ids.push(follow_up_id),
                None => warn!(
                    transfer_id = %id, %product_id,
                    "Follow-up transfer created but response carried no id"
                ),
            }
        }

        info!(
            transfer_id = %id,
            follow_ups = follow_up_ids.len(),
            "Transfer split-approved"
        );
        self.emit(Event::TransferSplit {
            transfer_id: id,
            follow_up_ids: follow_up_ids.clone(),
        })
        .await;
        self.refresh_after("split-approve").await;
        Ok(SplitResult::Approved { follow_up_ids })
    }

    /// Approved → Shipped.
    #[instrument(skip(self, gate))]
    pub async fn ship(
        &self,
        id: Uuid,
        gate: &dyn ConfirmationGate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let transfer = self.current(id).await?;
        Self::ensure_transition(&transfer, TransferStatus::Shipped)?;

        let prompt = format!("Ship transfer {}?", transfer.code);
        if !gate.confirm(&prompt).await {
            return Ok(TransitionOutcome::Aborted);
        }

        self.client
            .post(&format!("inventory-transfers/{}/ship", id), &json!({}))
            .await?;
        info!(transfer_id = %id, "Transfer shipped");
        self.emit(Event::TransferShipped(id)).await;
        self.refresh_after("ship").await;
        Ok(TransitionOutcome::Completed)
    }

    /// Shipped → Completed.
    #[instrument(skip(self, gate))]
    pub async fn receive(
        &self,
        id: Uuid,
        gate: &dyn ConfirmationGate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let transfer = self.current(id).await?;
        Self::ensure_transition(&transfer, TransferStatus::Completed)?;

        let prompt = format!("Confirm receipt of transfer {}?", transfer.code);
        if !gate.confirm(&prompt).await {
            return Ok(TransitionOutcome::Aborted);
        }

        self.client
            .post(&format!("inventory-transfers/{}/receive", id), &json!({}))
            .await?;
        info!(transfer_id = %id, "Transfer received");
        self.emit(Event::TransferReceived(id)).await;
        self.refresh_after("receive").await;
        Ok(TransitionOutcome::Completed)
    }

    /// Cancels a non-shipped, non-terminal request. The gate must supply a
    /// non-empty free-text reason; an empty or absent reason aborts before
    /// any backend call.
    #[instrument(skip(self, gate))]
    pub async fn cancel(
        &self,
        id: Uuid,
        gate: &dyn ConfirmationGate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let transfer = self.current(id).await?;
        Self::ensure_transition(&transfer, TransferStatus::Cancelled)?;

        let prompt = format!("Reason for cancelling transfer {}:", transfer.code);
        let reason = match gate.cancellation_reason(&prompt).await {
            Some(reason) if !reason.trim().is_empty() => reason,
            _ => return Ok(TransitionOutcome::Aborted),
        };

        self.client
            .post(
                &format!("inventory-transfers/{}/cancel", id),
                &json!({ "reason": reason }),
            )
            .await?;
        info!(transfer_id = %id, reason = %reason, "Transfer cancelled");
        self.emit(Event::TransferCancelled {
            transfer_id: id,
            reason,
        })
        .await;
        self.refresh_after("cancel").await;
        Ok(TransitionOutcome::Completed)
    }

    async fn current(&self, id: Uuid) -> Result<TransferRequest, ServiceError> {
        self.store
            .find(id)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", id)))
    }

    fn ensure_transition(
        transfer: &TransferRequest,
        target: TransferStatus,
    ) -> Result<(), ServiceError> {
        if !transfer.status.can_transition_to(target) {
            return Err(ServiceError::InvalidStatus(format!(
                "Transfer {} cannot move from {} to {}",
                transfer.code, transfer.status, target
            )));
        }
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Event emission failed");
        }
    }

    /// The transition already succeeded server-side; a failed reload is
    /// recorded by the store and must not turn the operation into an error.
    async fn refresh_after(&self, operation: &str) {
        if let Err(e) = self.store.refresh().await {
            warn!(error = %e, operation, "Reload after transition failed");
        }
    }
}

fn parse_uuid(value: &serde_json::Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}
