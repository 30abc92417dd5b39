//! Booking ledger: the append-only record of reservation attempts
//!
//! Writes happen only inside the coordinator's critical section, through
//! [`Storage::commit_decision`]. This module is the read surface: token
//! resolution for idempotent retries, single-record lookup, and the
//! per-event / per-requester listings.

use crate::storage::Storage;
use crate::types::{BookingRecord, BookingStatus, EventId, RequesterId};
use crate::{Error, Result};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only ledger interface over storage
#[derive(Debug, Clone)]
pub struct BookingLedger {
    storage: Arc<Storage>,
}

impl BookingLedger {
    /// Create ledger over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Resolve an idempotency token to its committed record, if any
    pub fn resolve_token(&self, token: &str) -> Result<Option<BookingRecord>> {
        match self.storage.booking_id_for_token(token)? {
            Some(booking_id) => Ok(Some(self.storage.get_booking(booking_id)?)),
            None => Ok(None),
        }
    }

    /// Get a booking record by ID
    pub fn get(&self, booking_id: Uuid) -> Result<BookingRecord> {
        self.storage.get_booking(booking_id)
    }

    /// All attempts against an event, oldest first
    pub fn list_by_event(&self, event_id: &EventId) -> Result<Vec<BookingRecord>> {
        self.storage.list_bookings_by_event(event_id)
    }

    /// All attempts by a requester, oldest first
    pub fn list_by_requester(&self, requester_id: &RequesterId) -> Result<Vec<BookingRecord>> {
        self.storage.list_bookings_by_requester(requester_id)
    }

    /// Replay the terminal outcome a committed record represents.
    ///
    /// A retried idempotency token must yield the same result as the first
    /// attempt: the booking ID for an accepted reservation (even if it was
    /// cancelled later), the identical typed rejection otherwise.
    pub fn outcome_for(record: &BookingRecord) -> Result<Uuid> {
        match record.status {
            BookingStatus::Confirmed | BookingStatus::Cancelled => Ok(record.booking_id),
            BookingStatus::Rejected => match record.reject_reason.clone() {
                Some(reason) => Err(reason.into()),
                None => Err(Error::Concurrency(format!(
                    "rejected booking {} has no recorded reason",
                    record.booking_id
                ))),
            },
            BookingStatus::Pending => Err(Error::Concurrency(format!(
                "booking {} is pending; decisions commit as terminal",
                record.booking_id
            ))),
        }
    }
}
