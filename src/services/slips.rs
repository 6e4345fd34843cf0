use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::confirm::ConfirmationGate;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::product::ProductStock;
use crate::models::slip::{RemoteSlip, SlipStatus, SlipType, StockSlip};
use crate::services::transfer_flow::TransitionOutcome;

/// One line of a slip under composition.
#[derive(Clone, Debug, PartialEq)]
pub struct DraftItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// A slip being composed, before submission. Items are added manually
/// (default quantity 1, duplicates rejected) or through the auto-fill pass
/// over low-stock products; `validate` runs the full pre-submission rule
/// set and nothing invalid ever reaches the backend.
#[derive(Clone, Debug)]
pub struct SlipDraft {
    pub slip_type: SlipType,
    pub branch_id: Uuid,
    pub target_branch_id: Option<Uuid>,
    pub reason: String,
    items: Vec<DraftItem>,
}

impl SlipDraft {
    pub fn import(branch_id: Uuid) -> Self {
        Self {
            slip_type: SlipType::Import,
            branch_id,
            target_branch_id: None,
            reason: String::new(),
            items: Vec::new(),
        }
    }

    pub fn export(branch_id: Uuid, target_branch_id: Uuid) -> Self {
        Self {
            slip_type: SlipType::Export,
            branch_id,
            target_branch_id: Some(target_branch_id),
            reason: String::new(),
            items: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn items(&self) -> &[DraftItem] {
        &self.items
    }

    /// Adds a product with the default quantity of 1. A product already on
    /// the draft is rejected.
    pub fn add_item(&mut self, product: &ProductStock) -> Result<(), ServiceError> {
        if self.items.iter().any(|i| i.product_id == product.product_id) {
            return Err(ServiceError::ValidationError(format!(
                "{} is already on the slip",
                product.product_name
            )));
        }
        self.items.push(DraftItem {
            product_id: product.product_id,
            product_name: product.product_name.clone(),
            unit_price: product.unit_price,
            quantity: 1,
        });
        Ok(())
    }

    pub fn set_quantity(&mut self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not on the slip", product_id))
            })?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.items.len() < before
    }

    /// Smart fill: proposes a line for every low-stock product not already
    /// drafted, requesting `max_stock - current_stock` (or three times the
    /// minimum when no maximum is configured). Non-positive proposals are
    /// skipped. Returns the number of lines added.
    pub fn auto_fill(&mut self, stocks: &[ProductStock]) -> usize {
        let mut added = 0;
        for stock in stocks.iter().filter(|s| s.is_low()) {
            if self.items.iter().any(|i| i.product_id == stock.product_id) {
                continue;
            }
            let quantity = stock.restock_suggestion();
            if quantity <= 0 {
                continue;
            }
            self.items.push(DraftItem {
                product_id: stock.product_id,
                product_name: stock.product_name.clone(),
                unit_price: stock.unit_price,
                quantity,
            });
            added += 1;
        }
        added
    }

    /// Σ quantity × unit price, rounded to exactly two decimal places.
    pub fn total_amount(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| Decimal::from(item.quantity) * item.unit_price)
            .sum::<Decimal>()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Pre-submission validation. All violations are collected and reported
    /// together; a draft that fails here never reaches the backend.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut errors = Vec::new();

        if self.branch_id.is_nil() {
            errors.push("A branch must be selected".to_string());
        }
        if self.items.is_empty() {
            errors.push("The slip needs at least one item".to_string());
        }
        for item in &self.items {
            if item.quantity <= 0 {
                errors.push(format!(
                    "{}: quantity must be positive",
                    item.product_name
                ));
            }
            if self.slip_type == SlipType::Import && item.unit_price <= Decimal::ZERO {
                errors.push(format!(
                    "{}: unit price must be positive",
                    item.product_name
                ));
            }
        }
        if self.slip_type == SlipType::Export {
            match self.target_branch_id {
                None => errors.push("A destination branch must be selected".to_string()),
                Some(target) if target == self.branch_id => {
                    errors.push("Source and destination branches must differ".to_string())
                }
                Some(target) if target.is_nil() => {
                    errors.push("A destination branch must be selected".to_string())
                }
                Some(_) => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::validation_errors(errors))
        }
    }
}

/// Overrides for the receiving step, `(product_id, actual_quantity)`.
/// Lines without an override default to their requested quantity.
pub type ActualQuantities = [(Uuid, i32)];

/// Drives the slip lifecycle: submit a validated draft, reconcile actual
/// quantities at receipt/shipment, cancel with a mandatory reason. The
/// local cache tracks slips this client created or mutated; `remove_local`
/// only evicts from that cache (the backend record persists).
pub struct StockSlipService {
    client: Arc<ApiClient>,
    slips: DashMap<Uuid, StockSlip>,
    event_sender: EventSender,
}

impl StockSlipService {
    pub fn new(client: Arc<ApiClient>, event_sender: EventSender) -> Self {
        Self {
            client,
            slips: DashMap::new(),
            event_sender,
        }
    }

    /// Validates and submits a draft: Import slips become supplier orders,
    /// Export slips become inventory transfers. The created slip starts
    /// Pending with all actual quantities at 0.
    #[instrument(skip(self, draft), fields(slip_type = %draft.slip_type))]
    pub async fn submit(&self, draft: &SlipDraft) -> Result<StockSlip, ServiceError> {
        draft.validate()?;

        let data = match draft.slip_type {
            SlipType::Import => {
                let body = json!({
                    "branch_id": draft.branch_id,
                    "notes": draft.reason,
                    "items": draft
                        .items
                        .iter()
                        .map(|i| json!({
                            "product_id": i.product_id,
                            "quantity": i.quantity,
                            "unit_price": i.unit_price,
                        }))
                        .collect::<Vec<_>>(),
                });
                self.client.post("supplier-orders", &body).await?
            }
            SlipType::Export => {
                let body = json!({
                    "from_branch_id": draft.branch_id,
                    "to_branch_id": draft.target_branch_id,
                    "notes": draft.reason,
                    "items": draft
                        .items
                        .iter()
                        .map(|i| json!({
                            "product_id": i.product_id,
                            "quantity": i.quantity,
                        }))
                        .collect::<Vec<_>>(),
                });
                self.client.post("inventory-transfers", &body).await?
            }
        };

        let remote: RemoteSlip = serde_json::from_value(data)?;
        let slip = remote.into_slip(draft.slip_type);
        info!(slip_id = %slip.id, code = %slip.code, "Slip created");
        self.emit(Event::SlipCreated(slip.id)).await;
        self.slips.insert(slip.id, slip.clone());
        Ok(slip)
    }

    /// Cached slips, most recent first.
    pub fn slips(&self) -> Vec<StockSlip> {
        let mut all: Vec<StockSlip> = self.slips.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        all
    }

    pub fn get(&self, id: Uuid) -> Option<StockSlip> {
        self.slips.get(&id).map(|e| e.value().clone())
    }

    /// Reconciles actual quantities and completes the slip. Import slips go
    /// through the supplier-order receive endpoint, Export slips through
    /// the transfer ship endpoint; both carry the reconciled per-line
    /// actuals.
    #[instrument(skip(self, actuals, gate))]
    pub async fn receive(
        &self,
        id: Uuid,
        actuals: &ActualQuantities,
        gate: &dyn ConfirmationGate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let slip = self
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Slip {} not found", id)))?;
        if slip.status != SlipStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Slip {} is {} and can no longer be received",
                slip.code, slip.status
            )));
        }
        for (product_id, quantity) in actuals {
            if *quantity < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Actual quantity for product {} must not be negative",
                    product_id
                )));
            }
            if !slip.items.iter().any(|i| i.product_id == *product_id) {
                warn!(slip_id = %id, %product_id, "Ignoring actual quantity for a product not on the slip");
            }
        }

        let prompt = format!("Confirm quantities for slip {}?", slip.code);
        if !gate.confirm(&prompt).await {
            return Ok(TransitionOutcome::Aborted);
        }

        let reconciled: Vec<(Uuid, i32)> = slip
            .items
            .iter()
            .map(|item| {
                let actual = actuals
                    .iter()
                    .find(|(p, _)| *p == item.product_id)
                    .map(|(_, q)| *q)
                    .unwrap_or(item.request_quantity);
                (item.product_id, actual)
            })
            .collect();
        let lines: Vec<serde_json::Value> = reconciled
            .iter()
            .map(|(product_id, quantity)| {
                json!({"product_id": product_id, "received_quantity": quantity})
            })
            .collect();

        let path = match slip.slip_type {
            SlipType::Import => format!("supplier-orders/{}/receive", id),
            SlipType::Export => format!("inventory-transfers/{}/ship", id),
        };
        self.client.post(&path, &json!({ "items": lines })).await?;

        if let Some(mut entry) = self.slips.get_mut(&id) {
            entry.status = SlipStatus::Completed;
            for item in entry.items.iter_mut() {
                if let Some((_, actual)) =
                    reconciled.iter().find(|(p, _)| *p == item.product_id)
                {
                    item.actual_quantity = *actual;
                }
            }
        }
        info!(slip_id = %id, "Slip completed");
        self.emit(Event::SlipCompleted(id)).await;
        Ok(TransitionOutcome::Completed)
    }

    /// Cancels a pending slip. The gate must supply a non-empty reason; an
    /// empty or absent reason aborts before any backend call.
    #[instrument(skip(self, gate))]
    pub async fn cancel(
        &self,
        id: Uuid,
        gate: &dyn ConfirmationGate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let slip = self
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Slip {} not found", id)))?;
        if slip.status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Slip {} is already {}",
                slip.code, slip.status
            )));
        }

        let prompt = format!("Reason for cancelling slip {}:", slip.code);
        let reason = match gate.cancellation_reason(&prompt).await {
            Some(reason) if !reason.trim().is_empty() => reason,
            _ => return Ok(TransitionOutcome::Aborted),
        };

        let path = match slip.slip_type {
            SlipType::Import => format!("supplier-orders/{}/cancel", id),
            SlipType::Export => format!("inventory-transfers/{}/cancel", id),
        };
        self.client
            .post(&path, &json!({ "reason": reason }))
            .await?;

        if let Some(mut entry) = self.slips.get_mut(&id) {
            entry.status = SlipStatus::Cancelled;
        }
        info!(slip_id = %id, reason = %reason, "Slip cancelled");
        self.emit(Event::SlipCancelled {
            slip_id: id,
            reason,
        })
        .await;
        Ok(TransitionOutcome::Completed)
    }

    /// Evicts a slip from the local cache only. The backend record
    /// persists and will reappear on the next load; there is no backend
    /// delete endpoint.
    pub fn remove_local(&self, id: Uuid) -> bool {
        self.slips.remove(&id).is_some()
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Event emission failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(name: &str, price: Decimal) -> ProductStock {
        ProductStock {
            product_id: Uuid::new_v4(),
            product_name: name.to_string(),
            current_stock: 2,
            min_stock: 10,
            max_stock: Some(50),
            unit_price: price,
        }
    }

    #[test]
    fn add_item_defaults_quantity_and_rejects_duplicates() {
        let p = product("Loratadine 10mg", dec!(900));
        let mut draft = SlipDraft::import(Uuid::new_v4());

        draft.add_item(&p).unwrap();
        assert_eq!(draft.items()[0].quantity, 1);
        assert!(draft.add_item(&p).is_err());
    }

    #[test]
    fn auto_fill_skips_drafted_and_healthy_products() {
        let low = product("Metformin 500mg", dec!(700));
        let mut healthy = product("Vitamin C", dec!(300));
        healthy.current_stock = 40;
        let drafted = product("Aspirin 100mg", dec!(450));

        let mut draft = SlipDraft::import(Uuid::new_v4());
        draft.add_item(&drafted).unwrap();

        let added = draft.auto_fill(&[low.clone(), healthy, drafted.clone()]);
        assert_eq!(added, 1);
        let line = draft
            .items()
            .iter()
            .find(|i| i.product_id == low.product_id)
            .unwrap();
        // max 50 - current 2
        assert_eq!(line.quantity, 48);
    }

    #[test]
    fn auto_fill_falls_back_without_max_stock() {
        let mut low = product("Amlodipine 5mg", dec!(650));
        low.max_stock = None;
        let mut draft = SlipDraft::import(Uuid::new_v4());

        assert_eq!(draft.auto_fill(&[low]), 1);
        assert_eq!(draft.items()[0].quantity, 30);
    }

    #[test]
    fn validation_collects_all_violations() {
        let mut bad = product("Free sample", dec!(0));
        bad.product_id = Uuid::new_v4();
        let mut draft = SlipDraft::import(Uuid::new_v4());
        draft.add_item(&bad).unwrap();
        draft.set_quantity(bad.product_id, 0).unwrap();

        let err = draft.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("quantity must be positive"));
        assert!(message.contains("unit price must be positive"));
    }

    #[test]
    fn export_requires_distinct_branches() {
        let branch = Uuid::new_v4();
        let mut draft = SlipDraft::export(branch, branch);
        draft.add_item(&product("Insulin pen", dec!(52000))).unwrap();

        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn export_does_not_require_unit_prices() {
        let mut draft = SlipDraft::export(Uuid::new_v4(), Uuid::new_v4());
        let mut p = product("Gauze roll", dec!(0));
        p.unit_price = dec!(0);
        draft.add_item(&p).unwrap();

        assert!(draft.validate().is_ok());
    }

    #[test]
    fn total_amount_rounds_to_two_decimals() {
        let mut draft = SlipDraft::import(Uuid::new_v4());
        let a = product("A", dec!(1000.005));
        let b = product("B", dec!(2500));
        draft.add_item(&a).unwrap();
        draft.add_item(&b).unwrap();
        draft.set_quantity(a.product_id, 3).unwrap();
        draft.set_quantity(b.product_id, 2).unwrap();

        assert_eq!(draft.total_amount(), dec!(8000.02));
    }
}
