// [apps/gateway/src/handlers/mod.rs]
//! HTTP and WebSocket handlers, one module per external-facing surface
//! (spec §6 "External Interfaces").

pub mod receipts;
pub mod socket;
pub mod subscribe;
pub mod worker;
