//! Core types for the booking engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Opaque, stable identifiers at the boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque event identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    /// Create new event ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated requester identifier, supplied by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(String);

impl RequesterId {
    /// Create new requester ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seat identifier in `row-col` form (e.g. `"2-5"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatId(String);

impl SeatId {
    /// Create new seat ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a seat ID from row/column coordinates (1-based)
    pub fn from_row_col(row: u32, col: u32) -> Self {
        Self(format!("{}-{}", row, col))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse `row-col` coordinates, if the ID has that shape
    pub fn row_col(&self) -> Option<(u32, u32)> {
        let (row, col) = self.0.split_once('-')?;
        Some((row.parse().ok()?, col.parse().ok()?))
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seat allocation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SeatState {
    /// Free for reservation
    Available = 1,
    /// Temporarily held, not reservable
    Held = 2,
    /// Committed to a confirmed booking
    Booked = 3,
}

/// What a reservation request asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationWant {
    /// Specific seats of a seated event, all-or-nothing
    Seats(Vec<SeatId>),
    /// A number of generic ticket slots of an unseated event
    Units(u32),
}

impl ReservationWant {
    /// Number of capacity units this request covers
    pub fn unit_count(&self) -> u32 {
        match self {
            ReservationWant::Seats(seats) => seats.len() as u32,
            ReservationWant::Units(units) => *units,
        }
    }
}

/// Why a reservation attempt was rejected.
///
/// Persisted on the booking record so that an idempotent retry of a
/// rejected attempt reproduces the identical typed error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// One or more requested seats were not available
    SeatUnavailable(Vec<SeatId>),
    /// Requested units exceeded remaining capacity
    InsufficientCapacity {
        /// Units requested
        requested: u32,
        /// Units remaining at decision time
        remaining: u32,
    },
}

impl From<RejectReason> for crate::Error {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::SeatUnavailable(seats) => crate::Error::SeatUnavailable { seats },
            RejectReason::InsufficientCapacity { requested, remaining } => {
                crate::Error::InsufficientCapacity { requested, remaining }
            }
        }
    }
}

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BookingStatus {
    /// Decision in flight (never persisted; decisions commit as terminal)
    Pending = 1,
    /// Capacity allocated
    Confirmed = 2,
    /// Business rejection, no capacity allocated (terminal)
    Rejected = 3,
    /// Released after confirmation, capacity returned (terminal)
    Cancelled = 4,
}

impl BookingStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled
        )
    }
}

/// A booking ledger record: one reservation attempt and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    /// Unique booking ID (UUIDv7 for time-ordering)
    pub booking_id: Uuid,

    /// Event the booking is against
    pub event_id: EventId,

    /// Who made the request
    pub requester_id: RequesterId,

    /// Requested seats or units
    pub want: ReservationWant,

    /// Client-supplied idempotency token, unique per logical attempt
    pub idempotency_token: String,

    /// Current status
    pub status: BookingStatus,

    /// Rejection reason (set iff status is Rejected)
    pub reject_reason: Option<RejectReason>,

    /// When the attempt was received
    pub created_at: DateTime<Utc>,

    /// When the decision was made
    pub decided_at: Option<DateTime<Utc>>,
}

impl BookingRecord {
    /// Create a confirmed record for an accepted reservation
    pub fn confirmed(
        event_id: EventId,
        requester_id: RequesterId,
        want: ReservationWant,
        idempotency_token: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            booking_id: Uuid::now_v7(),
            event_id,
            requester_id,
            want,
            idempotency_token: idempotency_token.into(),
            status: BookingStatus::Confirmed,
            reject_reason: None,
            created_at: now,
            decided_at: Some(now),
        }
    }

    /// Create a rejected record for an audit trail entry
    pub fn rejected(
        event_id: EventId,
        requester_id: RequesterId,
        want: ReservationWant,
        idempotency_token: impl Into<String>,
        reason: RejectReason,
    ) -> Self {
        let now = Utc::now();
        Self {
            booking_id: Uuid::now_v7(),
            event_id,
            requester_id,
            want,
            idempotency_token: idempotency_token.into(),
            status: BookingStatus::Rejected,
            reject_reason: Some(reason),
            created_at: now,
            decided_at: Some(now),
        }
    }

    /// Transition Confirmed -> Cancelled. The only legal mutation of a
    /// persisted record.
    pub fn mark_cancelled(&mut self) -> crate::Result<()> {
        if self.status != BookingStatus::Confirmed {
            return Err(crate::Error::InvalidTransition(format!(
                "booking {} is {:?}, only Confirmed bookings can be cancelled",
                self.booking_id, self.status
            )));
        }
        self.status = BookingStatus::Cancelled;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}
