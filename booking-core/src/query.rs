//! Read-side projections for the UI
//!
//! Everything here is derived from committed inventory snapshots; the
//! RocksDB write batch is the commit boundary, so a projection can never
//! observe a torn mid-transaction state. None of these views are a source
//! of truth.

use crate::storage::Storage;
use crate::types::{BookingRecord, EventId, RequesterId, SeatId, SeatState};
use crate::{inventory::CapacityMode, Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// One seat in the grid view
#[derive(Debug, Clone, Serialize)]
pub struct SeatView {
    /// Seat identifier
    pub seat_id: SeatId,
    /// Row coordinate, when the ID has `row-col` shape
    pub row: Option<u32>,
    /// Column coordinate, when the ID has `row-col` shape
    pub col: Option<u32>,
    /// Display state
    pub state: SeatState,
}

/// Seat grid for a seated event, sorted by (row, col) where parseable
#[derive(Debug, Clone, Serialize)]
pub struct SeatGrid {
    /// Event the grid belongs to
    pub event_id: EventId,
    /// All seats with their display states
    pub seats: Vec<SeatView>,
}

/// Capacity counters for an event
#[derive(Debug, Clone, Serialize)]
pub struct CapacityView {
    /// Event the counters belong to
    pub event_id: EventId,
    /// Capacity addressing mode
    pub mode: CapacityMode,
    /// Declared total capacity
    pub total: u32,
    /// Units still reservable
    pub remaining: u32,
    /// Units committed to confirmed bookings (the UI's attendee count)
    pub attendees: u32,
    /// Soft-archive flag
    pub archived: bool,
}

/// Read-only query layer over committed storage
#[derive(Debug, Clone)]
pub struct QueryLayer {
    storage: Arc<Storage>,
}

impl QueryLayer {
    /// Create query layer over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Capacity counters for any event
    pub fn capacity(&self, event_id: &EventId) -> Result<CapacityView> {
        let inventory = self.storage.get_inventory(event_id)?;
        Ok(CapacityView {
            event_id: inventory.event_id.clone(),
            mode: inventory.mode(),
            total: inventory.total(),
            remaining: inventory.remaining(),
            attendees: inventory.booked(),
            archived: inventory.archived,
        })
    }

    /// Seat grid for a seated event
    pub fn seat_grid(&self, event_id: &EventId) -> Result<SeatGrid> {
        let inventory = self.storage.get_inventory(event_id)?;
        let seat_map = match &inventory.capacity {
            crate::inventory::Capacity::Seated { seat_map } => seat_map,
            crate::inventory::Capacity::Unseated { .. } => {
                return Err(Error::InvalidRequest(format!(
                    "event {} has no seat map",
                    event_id
                )));
            }
        };

        let mut seats: Vec<SeatView> = seat_map
            .iter()
            .map(|(seat_id, state)| {
                let coords = seat_id.row_col();
                SeatView {
                    seat_id: seat_id.clone(),
                    row: coords.map(|(r, _)| r),
                    col: coords.map(|(_, c)| c),
                    state: *state,
                }
            })
            .collect();
        seats.sort_by_key(|s| (s.row, s.col, s.seat_id.clone()));

        Ok(SeatGrid {
            event_id: inventory.event_id,
            seats,
        })
    }

    /// A requester's booking history, oldest first
    pub fn booking_history(&self, requester_id: &RequesterId) -> Result<Vec<BookingRecord>> {
        self.storage.list_bookings_by_requester(requester_id)
    }
}
