//! Per-event capacity state and its validated mutation path
//!
//! `EventInventory` is the durable source of truth for an event's capacity.
//! It is mutated exclusively through [`EventInventory::apply_delta`], which
//! validates every invariant before committing the change and refuses
//! silently-corrupting deltas with `CapacityViolation`.

use crate::types::{EventId, SeatId, SeatState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capacity addressing mode of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityMode {
    /// Generic ticket slots, tracked as a remaining count
    Unseated,
    /// Uniquely-identified seats, tracked per seat
    Seated,
}

/// Capacity declaration supplied at event-publish time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacitySpec {
    /// Unseated event with a total slot count
    Unseated {
        /// Total ticket slots
        total: u32,
    },
    /// Seated event with an explicit seat list
    Seated {
        /// Seat identifiers, all initially available
        seat_ids: Vec<SeatId>,
    },
}

/// Capacity state, one variant per addressing mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    /// Remaining-count bookkeeping
    Unseated {
        /// Declared total, never changes after publish
        total: u32,
        /// Slots left, `remaining <= total` at all times
        remaining: u32,
    },
    /// Per-seat bookkeeping, ordered for stable iteration
    Seated {
        /// Seat ID to allocation state
        seat_map: BTreeMap<SeatId, SeatState>,
    },
}

/// A validated change to an event's inventory.
///
/// The only mutation vocabulary the store understands; produced by the
/// reservation coordinator inside its critical section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryDelta {
    /// Transition the given seats to the given states (Seated mode)
    MarkSeats(BTreeMap<SeatId, SeatState>),
    /// Adjust remaining capacity by a signed count (Unseated mode)
    Units(i64),
}

/// Durable per-event capacity state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInventory {
    /// Event this inventory belongs to
    pub event_id: EventId,

    /// Capacity state
    pub capacity: Capacity,

    /// Soft-archive flag; archived events refuse new reservations but are
    /// never deleted while bookings reference them
    pub archived: bool,

    /// Created at event-publish time
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl EventInventory {
    /// Create inventory for a newly published event
    pub fn new(event_id: EventId, spec: CapacitySpec) -> Result<Self> {
        let capacity = match spec {
            CapacitySpec::Unseated { total } => Capacity::Unseated {
                total,
                remaining: total,
            },
            CapacitySpec::Seated { seat_ids } => {
                if seat_ids.is_empty() {
                    return Err(Error::InvalidRequest(
                        "seated event needs at least one seat".to_string(),
                    ));
                }
                let mut seat_map = BTreeMap::new();
                for seat_id in seat_ids {
                    if seat_map.insert(seat_id.clone(), SeatState::Available).is_some() {
                        return Err(Error::InvalidRequest(format!(
                            "duplicate seat id {} in seat list",
                            seat_id
                        )));
                    }
                }
                Capacity::Seated { seat_map }
            }
        };

        let now = Utc::now();
        Ok(Self {
            event_id,
            capacity,
            archived: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Capacity addressing mode
    pub fn mode(&self) -> CapacityMode {
        match self.capacity {
            Capacity::Unseated { .. } => CapacityMode::Unseated,
            Capacity::Seated { .. } => CapacityMode::Seated,
        }
    }

    /// Declared total capacity
    pub fn total(&self) -> u32 {
        match &self.capacity {
            Capacity::Unseated { total, .. } => *total,
            Capacity::Seated { seat_map } => seat_map.len() as u32,
        }
    }

    /// Units still reservable. For seated events this is derived as the
    /// number of Available seats, never stored separately.
    pub fn remaining(&self) -> u32 {
        match &self.capacity {
            Capacity::Unseated { remaining, .. } => *remaining,
            Capacity::Seated { seat_map } => seat_map
                .values()
                .filter(|s| **s == SeatState::Available)
                .count() as u32,
        }
    }

    /// Units committed to confirmed bookings, the projection the UI shows
    /// as an attendee count
    pub fn booked(&self) -> u32 {
        match &self.capacity {
            Capacity::Unseated { total, remaining } => total - remaining,
            Capacity::Seated { seat_map } => seat_map
                .values()
                .filter(|s| **s == SeatState::Booked)
                .count() as u32,
        }
    }

    /// Current state of a seat, if the event has one with this ID
    pub fn seat_state(&self, seat_id: &SeatId) -> Option<SeatState> {
        match &self.capacity {
            Capacity::Unseated { .. } => None,
            Capacity::Seated { seat_map } => seat_map.get(seat_id).copied(),
        }
    }

    /// Apply a delta, validating every invariant first. All-or-nothing:
    /// an invalid delta leaves the inventory untouched.
    pub fn apply_delta(&mut self, delta: InventoryDelta) -> Result<()> {
        match (&mut self.capacity, delta) {
            (Capacity::Unseated { total, remaining }, InventoryDelta::Units(units)) => {
                let next = *remaining as i64 + units;
                if next < 0 || next > *total as i64 {
                    return Err(Error::CapacityViolation(format!(
                        "event {}: remaining {} + delta {} outside [0, {}]",
                        self.event_id, remaining, units, total
                    )));
                }
                *remaining = next as u32;
            }

            (Capacity::Seated { seat_map }, InventoryDelta::MarkSeats(marks)) => {
                // Validate the full delta before mutating anything
                for (seat_id, target) in &marks {
                    let current = seat_map.get(seat_id).ok_or_else(|| {
                        Error::CapacityViolation(format!(
                            "event {}: unknown seat {}",
                            self.event_id, seat_id
                        ))
                    })?;
                    if !transition_allowed(*current, *target) {
                        return Err(Error::CapacityViolation(format!(
                            "event {}: seat {} cannot go {:?} -> {:?}",
                            self.event_id, seat_id, current, target
                        )));
                    }
                }
                for (seat_id, target) in marks {
                    seat_map.insert(seat_id, target);
                }
            }

            (Capacity::Unseated { .. }, InventoryDelta::MarkSeats(_)) => {
                return Err(Error::CapacityViolation(format!(
                    "event {}: seat delta against unseated inventory",
                    self.event_id
                )));
            }
            (Capacity::Seated { .. }, InventoryDelta::Units(_)) => {
                return Err(Error::CapacityViolation(format!(
                    "event {}: unit delta against seated inventory",
                    self.event_id
                )));
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Legal seat state transitions
fn transition_allowed(from: SeatState, to: SeatState) -> bool {
    matches!(
        (from, to),
        (SeatState::Available, SeatState::Held)
            | (SeatState::Available, SeatState::Booked)
            | (SeatState::Held, SeatState::Available)
            | (SeatState::Held, SeatState::Booked)
            | (SeatState::Booked, SeatState::Available)
    )
}
