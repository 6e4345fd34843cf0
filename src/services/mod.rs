pub mod allocation;
pub mod slips;
pub mod transfer_flow;
pub mod transfers;
