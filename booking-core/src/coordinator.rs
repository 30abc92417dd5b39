//! Reservation coordinator: per-event single-writer concurrency
//!
//! This module generalizes the single-writer actor pattern to per-event
//! granularity:
//! - One actor task per event serializes every reserve/release decision for
//!   that event, so two requests can never both see "seat available" and
//!   both commit
//! - Different events run fully in parallel; there is no global lock
//! - Async message passing with backpressure; a bounded mailbox send that
//!   times out surfaces as `Busy` instead of blocking indefinitely
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 BookingEngine                         │
//! │           Many concurrent reserve/release            │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ routed by event_id
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │            Coordinator (DashMap registry)             │
//! │   event A ──► mpsc ──► EventActor A (single task)    │
//! │   event B ──► mpsc ──► EventActor B (single task)    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//!            Storage::commit_decision()
//!           (atomic WriteBatch to RocksDB)
//! ```

use crate::inventory::{CapacityMode, EventInventory, InventoryDelta};
use crate::ledger::BookingLedger;
use crate::storage::Storage;
use crate::types::{
    BookingRecord, BookingStatus, EventId, RejectReason, RequesterId, ReservationWant, SeatState,
};
use crate::{Error, Result};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use uuid::Uuid;

/// Message sent to an event's actor
enum ReservationMessage {
    /// Decide a reservation attempt
    Reserve {
        requester_id: RequesterId,
        want: ReservationWant,
        idempotency_token: String,
        response: oneshot::Sender<Result<Uuid>>,
    },

    /// Release a confirmed booking
    Release {
        booking_id: Uuid,
        response: oneshot::Sender<Result<()>>,
    },

    /// Soft-archive the event
    Archive {
        response: oneshot::Sender<Result<()>>,
    },
}

/// Actor owning all write decisions for one event
struct EventActor {
    event_id: EventId,
    storage: Arc<Storage>,
    mailbox: mpsc::Receiver<ReservationMessage>,
}

impl EventActor {
    /// Run the actor event loop; exits when all senders are dropped
    async fn run(mut self) {
        tracing::debug!(event_id = %self.event_id, "Event actor started");

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                ReservationMessage::Reserve {
                    requester_id,
                    want,
                    idempotency_token,
                    response,
                } => {
                    let result = self.handle_reserve(requester_id, want, idempotency_token);
                    let _ = response.send(result);
                }
                ReservationMessage::Release { booking_id, response } => {
                    let _ = response.send(self.handle_release(booking_id));
                }
                ReservationMessage::Archive { response } => {
                    let _ = response.send(self.handle_archive());
                }
            }
        }

        tracing::debug!(event_id = %self.event_id, "Event actor stopped");
    }

    /// The reserve state machine: idempotency check, validation, atomic
    /// commit of inventory mutation + ledger append
    fn handle_reserve(
        &self,
        requester_id: RequesterId,
        want: ReservationWant,
        idempotency_token: String,
    ) -> Result<Uuid> {
        // 1. Already decided? Replay the stored outcome, no new work.
        if let Some(booking_id) = self.storage.booking_id_for_token(&idempotency_token)? {
            let record = self.storage.get_booking(booking_id)?;
            tracing::debug!(
                event_id = %self.event_id,
                booking_id = %booking_id,
                "Idempotency token already resolved"
            );
            return BookingLedger::outcome_for(&record);
        }

        // 2. Load committed inventory (we are the only writer for this event).
        let mut inventory = self.storage.get_inventory(&self.event_id)?;
        if inventory.archived {
            return Err(Error::InvalidRequest(format!(
                "event {} is archived",
                self.event_id
            )));
        }

        // 3. A request in the wrong addressing mode is malformed, not a
        //    business rejection; it never reaches the ledger.
        match (&want, inventory.mode()) {
            (ReservationWant::Seats(_), CapacityMode::Unseated) => {
                return Err(Error::InvalidRequest(format!(
                    "event {} has no seat map",
                    self.event_id
                )));
            }
            (ReservationWant::Units(_), CapacityMode::Seated) => {
                return Err(Error::InvalidRequest(format!(
                    "event {} requires seat selection",
                    self.event_id
                )));
            }
            _ => {}
        }

        // 4. Validate against current state.
        match validate_want(&inventory, &want) {
            Ok(delta) => {
                // 5. Mutate and append, one atomic unit.
                inventory.apply_delta(delta)?;
                let record = BookingRecord::confirmed(
                    self.event_id.clone(),
                    requester_id,
                    want,
                    idempotency_token,
                );
                self.storage.commit_decision(Some(&inventory), &record)?;

                tracing::info!(
                    event_id = %self.event_id,
                    booking_id = %record.booking_id,
                    units = record.want.unit_count(),
                    "Reservation confirmed"
                );
                Ok(record.booking_id)
            }
            Err(reason) => {
                // 6. Append the rejection for audit; no inventory mutation.
                let record = BookingRecord::rejected(
                    self.event_id.clone(),
                    requester_id,
                    want,
                    idempotency_token,
                    reason.clone(),
                );
                self.storage.commit_decision(None, &record)?;

                tracing::info!(
                    event_id = %self.event_id,
                    booking_id = %record.booking_id,
                    reason = ?reason,
                    "Reservation rejected"
                );
                Err(reason.into())
            }
        }
    }

    /// Release: Confirmed -> Cancelled, capacity returned, one atomic unit
    fn handle_release(&self, booking_id: Uuid) -> Result<()> {
        let mut record = self.storage.get_booking(booking_id)?;
        if record.status != BookingStatus::Confirmed {
            return Err(Error::InvalidTransition(format!(
                "booking {} is {:?}, only Confirmed bookings can be released",
                booking_id, record.status
            )));
        }

        let mut inventory = self.storage.get_inventory(&record.event_id)?;
        let delta = match &record.want {
            ReservationWant::Seats(seats) => InventoryDelta::MarkSeats(
                seats
                    .iter()
                    .map(|s| (s.clone(), SeatState::Available))
                    .collect(),
            ),
            ReservationWant::Units(units) => InventoryDelta::Units(*units as i64),
        };
        inventory.apply_delta(delta)?;
        record.mark_cancelled()?;
        self.storage.commit_decision(Some(&inventory), &record)?;

        tracing::info!(
            event_id = %record.event_id,
            booking_id = %booking_id,
            "Booking released"
        );
        Ok(())
    }

    /// Archive: set the soft-archive flag. Idempotent. Runs in the same
    /// critical section as reserve/release, so it can never overwrite a
    /// concurrently committed inventory snapshot with a stale one.
    fn handle_archive(&self) -> Result<()> {
        let mut inventory = self.storage.get_inventory(&self.event_id)?;
        if !inventory.archived {
            inventory.archived = true;
            self.storage.put_inventory(&inventory)?;
            tracing::info!(event_id = %self.event_id, "Event inventory archived");
        }
        Ok(())
    }
}

/// Validate a request against committed inventory. Returns the delta to
/// apply, or the typed business rejection. All-or-nothing for seats.
fn validate_want(
    inventory: &EventInventory,
    want: &ReservationWant,
) -> std::result::Result<InventoryDelta, RejectReason> {
    match want {
        ReservationWant::Seats(seats) => {
            let unavailable: Vec<_> = seats
                .iter()
                .filter(|s| inventory.seat_state(s) != Some(SeatState::Available))
                .cloned()
                .collect();
            if !unavailable.is_empty() {
                return Err(RejectReason::SeatUnavailable(unavailable));
            }
            Ok(InventoryDelta::MarkSeats(
                seats
                    .iter()
                    .map(|s| (s.clone(), SeatState::Booked))
                    .collect::<BTreeMap<_, _>>(),
            ))
        }
        ReservationWant::Units(units) => {
            let remaining = inventory.remaining();
            if *units > remaining {
                return Err(RejectReason::InsufficientCapacity {
                    requested: *units,
                    remaining,
                });
            }
            Ok(InventoryDelta::Units(-(*units as i64)))
        }
    }
}

/// Routes reserve/release calls to per-event actors
pub struct Coordinator {
    actors: DashMap<EventId, mpsc::Sender<ReservationMessage>>,
    storage: Arc<Storage>,
    mailbox_capacity: usize,
    acquire_timeout: Duration,
}

impl Coordinator {
    /// Create coordinator over shared storage
    pub fn new(storage: Arc<Storage>, mailbox_capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            actors: DashMap::new(),
            storage,
            mailbox_capacity,
            acquire_timeout,
        }
    }

    /// Reserve seats or units against an event
    pub async fn reserve(
        &self,
        event_id: &EventId,
        requester_id: RequesterId,
        want: ReservationWant,
        idempotency_token: String,
    ) -> Result<Uuid> {
        let (tx, rx) = oneshot::channel();
        self.send(
            event_id,
            ReservationMessage::Reserve {
                requester_id,
                want,
                idempotency_token,
                response: tx,
            },
        )
        .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Release a confirmed booking, returning its capacity
    pub async fn release(&self, booking_id: Uuid) -> Result<()> {
        // Read-only routing lookup; the actor re-reads the record inside
        // its critical section before deciding.
        let record = self.storage.get_booking(booking_id)?;

        let (tx, rx) = oneshot::channel();
        self.send(
            &record.event_id,
            ReservationMessage::Release {
                booking_id,
                response: tx,
            },
        )
        .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Soft-archive an event; all post-publish inventory writes go through
    /// the event's actor
    pub async fn archive(&self, event_id: &EventId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(event_id, ReservationMessage::Archive { response: tx })
            .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Number of live event actors
    pub fn active_actors(&self) -> usize {
        self.actors.len()
    }

    /// Drop all actor mailboxes; actors drain in-flight messages and exit
    pub fn shutdown(&self) {
        self.actors.clear();
    }

    async fn send(&self, event_id: &EventId, msg: ReservationMessage) -> Result<()> {
        let sender = self.sender_for(event_id);
        match sender.send_timeout(msg, self.acquire_timeout).await {
            Ok(()) => Ok(()),
            // Mailbox stayed full for the whole bounded wait: the event is
            // under contention. Retryable by the caller.
            Err(SendTimeoutError::Timeout(_)) => Err(Error::Busy),
            Err(SendTimeoutError::Closed(_)) => {
                Err(Error::Concurrency("Actor mailbox closed".to_string()))
            }
        }
    }

    /// Get or lazily spawn the single-writer actor for an event
    fn sender_for(&self, event_id: &EventId) -> mpsc::Sender<ReservationMessage> {
        let mut entry = self
            .actors
            .entry(event_id.clone())
            .or_insert_with(|| self.spawn_actor(event_id.clone()));
        if entry.is_closed() {
            *entry = self.spawn_actor(event_id.clone());
        }
        entry.clone()
    }

    fn spawn_actor(&self, event_id: EventId) -> mpsc::Sender<ReservationMessage> {
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let actor = EventActor {
            event_id,
            storage: self.storage.clone(),
            mailbox: rx,
        };
        tokio::spawn(actor.run());
        tx
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("active_actors", &self.actors.len())
            .finish_non_exhaustive()
    }
}
