//! Stockflow Library
//!
//! This crate drives the client side of a pharmacy inventory backend:
//! inter-branch stock transfers (loading, FEFO allocation previews, guarded
//! state transitions) and import/export stock slips (drafting, smart
//! auto-fill, receiving reconciliation). All persistence and the
//! authoritative stock mutation live behind the REST backend; this crate
//! owns normalization, the client-side allocation simulation and the
//! workflow state machines.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod client;
pub mod config;
pub mod confirm;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;

pub mod prelude {
    pub use crate::client::ApiClient;
    pub use crate::config::AppConfig;
    pub use crate::confirm::{AutoConfirm, ConfirmationGate, StaticGate};
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::models::slip::{SlipItem, SlipStatus, SlipType, StockSlip};
    pub use crate::models::transfer::{
        BatchAllocation, TransferItem, TransferRequest, TransferStatus,
    };
    pub use crate::services::allocation::AllocationPreviewer;
    pub use crate::services::slips::{SlipDraft, StockSlipService};
    pub use crate::services::transfer_flow::{TransferFlowService, TransitionOutcome};
    pub use crate::services::transfers::TransferStore;
}
