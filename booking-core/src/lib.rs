//! Gatherly Booking Core
//!
//! Seat/ticket inventory and booking consistency engine: race-free
//! allocation and release of finite event capacity, with an auditable
//! booking ledger.
//!
//! # Architecture
//!
//! - **Inventory Store**: durable per-event capacity state, mutated only
//!   through validated deltas
//! - **Booking Ledger**: append-only record of every reservation attempt,
//!   keyed by idempotency token
//! - **Reservation Coordinator**: one single-writer actor per event
//!   serializes all allocation decisions; inventory mutation and ledger
//!   append commit as one atomic write batch
//! - **Query Layer**: read-only projections (seat grid, remaining
//!   capacity) derived from committed snapshots
//!
//! # Invariants
//!
//! - No double-booking: a seat is held by at most one confirmed booking
//! - Capacity conservation: confirmed units never exceed total capacity
//! - Idempotent retry: the same token always yields the same terminal
//!   result
//! - Atomicity: inventory and ledger move together or not at all

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::BookingEngine;
pub use error::{Error, Result};
pub use inventory::{Capacity, CapacityMode, CapacitySpec, EventInventory, InventoryDelta};
pub use ledger::BookingLedger;
pub use query::{CapacityView, SeatGrid, SeatView};
pub use storage::Storage;
pub use types::{
    BookingRecord, BookingStatus, EventId, RejectReason, RequesterId, ReservationWant, SeatId,
    SeatState,
};
