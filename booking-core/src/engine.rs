//! Main booking engine orchestration layer
//!
//! Ties together storage, ledger, coordinator and query components into a
//! high-level API for inventory management and booking.
//!
//! # Example
//!
//! ```no_run
//! use booking_core::{BookingEngine, CapacitySpec, Config, EventId, RequesterId, ReservationWant};
//!
//! #[tokio::main]
//! async fn main() -> booking_core::Result<()> {
//!     let engine = BookingEngine::open(Config::default())?;
//!
//!     let event_id = EventId::new("summer-fest");
//!     engine.publish_event(event_id.clone(), CapacitySpec::Unseated { total: 100 })?;
//!
//!     let booking_id = engine
//!         .reserve(&event_id, RequesterId::new("alice"), ReservationWant::Units(2), "tok-1")
//!         .await?;
//!     engine.release(booking_id).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::coordinator::Coordinator;
use crate::inventory::{CapacitySpec, EventInventory};
use crate::ledger::BookingLedger;
use crate::metrics::Metrics;
use crate::query::{CapacityView, QueryLayer, SeatGrid};
use crate::storage::{Storage, StorageStats};
use crate::types::{BookingRecord, EventId, RequesterId, ReservationWant};
use crate::{Config, Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

/// Main booking engine interface
pub struct BookingEngine {
    /// Shared storage
    storage: Arc<Storage>,

    /// Append-only booking ledger (read surface)
    ledger: BookingLedger,

    /// Per-event reservation coordinator
    coordinator: Coordinator,

    /// Read-side projections
    query: QueryLayer,

    /// Prometheus metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl BookingEngine {
    /// Open engine with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let coordinator = Coordinator::new(
            storage.clone(),
            config.coordinator.mailbox_capacity,
            Duration::from_millis(config.coordinator.acquire_timeout_ms),
        );
        let metrics = Metrics::new()?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Booking engine opened"
        );

        Ok(Self {
            ledger: BookingLedger::new(storage.clone()),
            query: QueryLayer::new(storage.clone()),
            storage,
            coordinator,
            metrics,
            config,
        })
    }

    /// Register inventory for a newly published event.
    ///
    /// Capacity is supplied by the event metadata service at publish time;
    /// after this call only the coordinator mutates it.
    pub fn publish_event(&self, event_id: EventId, spec: CapacitySpec) -> Result<EventInventory> {
        if self.storage.inventory_exists(&event_id)? {
            return Err(Error::InvalidRequest(format!(
                "event {} already has published inventory",
                event_id
            )));
        }

        let inventory = EventInventory::new(event_id, spec)?;
        self.storage.put_inventory(&inventory)?;

        tracing::info!(
            event_id = %inventory.event_id,
            mode = ?inventory.mode(),
            total = inventory.total(),
            "Event inventory published"
        );
        Ok(inventory)
    }

    /// Soft-archive an event. Archived events refuse new reservations;
    /// existing bookings stay readable and releasable. Idempotent.
    ///
    /// Runs inside the event's actor like every other post-publish
    /// inventory write, so it cannot race a concurrent reservation.
    pub async fn archive_event(&self, event_id: &EventId) -> Result<()> {
        self.coordinator.archive(event_id).await
    }

    /// Reserve seats or units against an event.
    ///
    /// Safe to retry with the same idempotency token after any failure:
    /// the retry yields the same terminal result.
    pub async fn reserve(
        &self,
        event_id: &EventId,
        requester_id: RequesterId,
        want: ReservationWant,
        idempotency_token: impl Into<String>,
    ) -> Result<Uuid> {
        let idempotency_token = idempotency_token.into();
        Self::validate_request(&want, &idempotency_token)?;

        let timer = self.metrics.reserve_duration.start_timer();
        let result = self
            .coordinator
            .reserve(event_id, requester_id, want, idempotency_token)
            .await;
        timer.observe_duration();

        match &result {
            Ok(_) => self.metrics.reservations_confirmed.inc(),
            Err(Error::SeatUnavailable { .. }) | Err(Error::InsufficientCapacity { .. }) => {
                self.metrics.reservations_rejected.inc()
            }
            Err(_) => {}
        }
        self.metrics
            .event_actors
            .set(self.coordinator.active_actors() as i64);

        result
    }

    /// Release a confirmed booking, returning its capacity to the event
    pub async fn release(&self, booking_id: Uuid) -> Result<()> {
        self.coordinator.release(booking_id).await?;
        self.metrics.releases.inc();
        Ok(())
    }

    /// Get a booking record by ID
    pub fn booking(&self, booking_id: Uuid) -> Result<BookingRecord> {
        self.ledger.get(booking_id)
    }

    /// All attempts against an event, oldest first
    pub fn bookings_for_event(&self, event_id: &EventId) -> Result<Vec<BookingRecord>> {
        self.ledger.list_by_event(event_id)
    }

    /// A requester's booking history, oldest first
    pub fn booking_history(&self, requester_id: &RequesterId) -> Result<Vec<BookingRecord>> {
        self.query.booking_history(requester_id)
    }

    /// Capacity counters for an event
    pub fn capacity(&self, event_id: &EventId) -> Result<CapacityView> {
        self.query.capacity(event_id)
    }

    /// Seat grid for a seated event
    pub fn seat_grid(&self, event_id: &EventId) -> Result<SeatGrid> {
        self.query.seat_grid(event_id)
    }

    /// Storage statistics (approximate counts)
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Metrics collector (for scrape endpoints)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown engine; event actors drain in-flight work and exit
    pub fn shutdown(self) {
        self.coordinator.shutdown();
        tracing::info!("Booking engine shut down");
    }

    /// Reject malformed requests before they reach the coordinator
    fn validate_request(want: &ReservationWant, idempotency_token: &str) -> Result<()> {
        if idempotency_token.is_empty() {
            return Err(Error::InvalidRequest(
                "idempotency token must not be empty".to_string(),
            ));
        }
        match want {
            ReservationWant::Units(0) => Err(Error::InvalidRequest(
                "requested units must be positive".to_string(),
            )),
            ReservationWant::Units(_) => Ok(()),
            ReservationWant::Seats(seats) => {
                if seats.is_empty() {
                    return Err(Error::InvalidRequest(
                        "requested seat list must not be empty".to_string(),
                    ));
                }
                let mut seen = HashSet::new();
                for seat in seats {
                    if !seen.insert(seat) {
                        return Err(Error::InvalidRequest(format!(
                            "duplicate seat {} in request",
                            seat
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for BookingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingEngine")
            .field("service_name", &self.config.service_name)
            .finish_non_exhaustive()
    }
}
