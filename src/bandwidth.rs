//! Bandwidth accounting for heartbeat telemetry.
//!
//! The heartbeat reads cumulative and instantaneous byte counts through the
//! [`BandwidthCounter`] trait. [`TrafficMeter`] is the default counter: the
//! embedding platform (and the session codec) record bytes on it, and rates
//! are derived lazily whenever a snapshot is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Samples closer together than this reuse the previous rate.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// EWMA smoothing factor for rates.
const RATE_ALPHA: f64 = 0.25;

/// A snapshot of traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandwidthTotals {
    pub total_in: u64,
    pub total_out: u64,
    /// Inbound bytes/s.
    pub rate_in: f64,
    /// Outbound bytes/s.
    pub rate_out: f64,
}

/// Source of the figures reported in each heartbeat.
pub trait BandwidthCounter: Send + Sync {
    /// Current cumulative totals and instantaneous rates.
    fn totals(&self) -> BandwidthTotals;

    /// Bytes held in local storage. Storage is not tracked by default.
    fn stored_bytes(&self) -> u64 {
        0
    }
}

#[derive(Debug, Default)]
struct RateState {
    last_sample: Option<Instant>,
    last_in: u64,
    last_out: u64,
    rate_in: f64,
    rate_out: f64,
}

/// Lock-free byte counters with EWMA-smoothed rates.
#[derive(Debug, Default)]
pub struct TrafficMeter {
    total_in: AtomicU64,
    total_out: AtomicU64,
    rates: Mutex<RateState>,
}

impl TrafficMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record received bytes.
    pub fn record_in(&self, bytes: u64) {
        self.total_in.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record sent bytes.
    pub fn record_out(&self, bytes: u64) {
        self.total_out.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_in(&self) -> u64 {
        self.total_in.load(Ordering::Relaxed)
    }

    pub fn total_out(&self) -> u64 {
        self.total_out.load(Ordering::Relaxed)
    }

    /// Snapshot the counters as of `now`, updating the smoothed rates.
    pub fn totals_at(&self, now: Instant) -> BandwidthTotals {
        let total_in = self.total_in();
        let total_out = self.total_out();

        let mut state = self.rates.lock().unwrap_or_else(|e| e.into_inner());
        match state.last_sample {
            None => {
                state.last_sample = Some(now);
                state.last_in = total_in;
                state.last_out = total_out;
            }
            Some(prev) => {
                let elapsed = now.saturating_duration_since(prev);
                if elapsed >= MIN_SAMPLE_INTERVAL {
                    let secs = elapsed.as_secs_f64();
                    let inst_in = total_in.saturating_sub(state.last_in) as f64 / secs;
                    let inst_out = total_out.saturating_sub(state.last_out) as f64 / secs;
                    state.rate_in = smooth(state.rate_in, inst_in);
                    state.rate_out = smooth(state.rate_out, inst_out);
                    state.last_sample = Some(now);
                    state.last_in = total_in;
                    state.last_out = total_out;
                }
            }
        }

        BandwidthTotals {
            total_in,
            total_out,
            rate_in: state.rate_in,
            rate_out: state.rate_out,
        }
    }
}

fn smooth(current: f64, sample: f64) -> f64 {
    if current == 0.0 {
        sample
    } else {
        current + (sample - current) * RATE_ALPHA
    }
}

impl BandwidthCounter for TrafficMeter {
    fn totals(&self) -> BandwidthTotals {
        self.totals_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate() {
        let meter = TrafficMeter::new();
        meter.record_in(100);
        meter.record_in(50);
        meter.record_out(70);

        let totals = meter.totals();
        assert_eq!(totals.total_in, 150);
        assert_eq!(totals.total_out, 70);
    }

    #[test]
    fn test_first_sample_has_no_rate() {
        let meter = TrafficMeter::new();
        meter.record_in(1000);

        let totals = meter.totals_at(Instant::now());
        assert_eq!(totals.rate_in, 0.0);
        assert_eq!(totals.rate_out, 0.0);
    }

    #[test]
    fn test_rate_from_delta() {
        let meter = TrafficMeter::new();
        let start = Instant::now();
        meter.totals_at(start);

        meter.record_in(2000);
        meter.record_out(500);
        let totals = meter.totals_at(start + Duration::from_secs(2));
        assert_eq!(totals.rate_in, 1000.0);
        assert_eq!(totals.rate_out, 250.0);
    }

    #[test]
    fn test_rate_is_smoothed() {
        let meter = TrafficMeter::new();
        let start = Instant::now();
        meter.totals_at(start);

        meter.record_in(1000);
        meter.totals_at(start + Duration::from_secs(1));

        // Idle second: rate decays by alpha instead of dropping to zero.
        let totals = meter.totals_at(start + Duration::from_secs(2));
        assert_eq!(totals.rate_in, 750.0);
    }

    #[test]
    fn test_close_samples_reuse_rate() {
        let meter = TrafficMeter::new();
        let start = Instant::now();
        meter.totals_at(start);
        meter.record_in(1000);
        let first = meter.totals_at(start + Duration::from_secs(1));

        meter.record_in(1_000_000);
        let second = meter.totals_at(start + Duration::from_secs(1) + Duration::from_millis(10));
        assert_eq!(second.rate_in, first.rate_in);
        assert_eq!(second.total_in, 1_001_000);
    }

    #[test]
    fn test_stored_bytes_default() {
        let meter = TrafficMeter::new();
        assert_eq!(meter.stored_bytes(), 0);
    }
}
