//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the booking engine:
//!
//! - `booking_reservations_confirmed_total` - Accepted reservations
//! - `booking_reservations_rejected_total` - Business rejections
//! - `booking_releases_total` - Cancelled bookings
//! - `booking_reserve_duration_seconds` - Histogram of reserve latencies
//! - `booking_event_actors` - Live per-event actor tasks

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Confirmed reservations
    pub reservations_confirmed: IntCounter,

    /// Rejected reservations (SeatUnavailable / InsufficientCapacity)
    pub reservations_rejected: IntCounter,

    /// Released bookings
    pub releases: IntCounter,

    /// Reserve latency histogram
    pub reserve_duration: Histogram,

    /// Live event actor tasks
    pub event_actors: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let reservations_confirmed = IntCounter::with_opts(Opts::new(
            "booking_reservations_confirmed_total",
            "Total confirmed reservations",
        ))?;
        registry.register(Box::new(reservations_confirmed.clone()))?;

        let reservations_rejected = IntCounter::with_opts(Opts::new(
            "booking_reservations_rejected_total",
            "Total rejected reservations",
        ))?;
        registry.register(Box::new(reservations_rejected.clone()))?;

        let releases = IntCounter::with_opts(Opts::new(
            "booking_releases_total",
            "Total released bookings",
        ))?;
        registry.register(Box::new(releases.clone()))?;

        let reserve_duration = Histogram::with_opts(
            HistogramOpts::new(
                "booking_reserve_duration_seconds",
                "Histogram of reserve latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(reserve_duration.clone()))?;

        let event_actors = IntGauge::with_opts(Opts::new(
            "booking_event_actors",
            "Live per-event actor tasks",
        ))?;
        registry.register(Box::new(event_actors.clone()))?;

        Ok(Self {
            reservations_confirmed,
            reservations_rejected,
            releases,
            reserve_duration,
            event_actors,
            registry,
        })
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
