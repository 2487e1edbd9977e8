//! Logical clock shared between a backend and the session layer.
//!
//! - [`Clock`] - Capability set every backend clock provides
//! - [`InertClock`] - Clock for backends without a tempo engine (time 0, 60 BPM)
//! - [`TransportClock`] - Tempo-aware clock anchored at a beat and an instant
//! - [`SharedClock`] - Lock-protected handle passed to the sync path

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Tempo reported by clocks without a tempo concept.
pub const INERT_TEMPO: f64 = 60.0;

/// Default tempo of a fresh transport clock.
pub const DEFAULT_BPM: f64 = 120.0;

/// Operations a backend clock supports.
///
/// Times are in beats, tempo in beats per minute.
pub trait Clock: Send {
    /// Seconds elapsed since the clock was created or last reset.
    fn now(&self) -> f64;

    /// Restart the clock from zero.
    fn reset(&mut self);

    /// Current tempo in BPM.
    fn tempo(&self) -> f64;

    /// Current logical time.
    fn time(&self) -> f64;

    /// Re-synchronise the time base from a remote authoritative value.
    ///
    /// `received_at` is the local instant at which `value` was received, so
    /// the time elapsed since then can be accounted for.
    fn set_time(&mut self, value: f64, received_at: Instant);
}

/// Fixed-point beat representation with 16 fractional bits.
///
/// Using fixed-point avoids floating-point drift over long sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BeatTime {
    beats: i64,
}

impl BeatTime {
    const SCALE: i64 = 65_536;

    /// Zero beat time constant.
    pub const ZERO: BeatTime = BeatTime { beats: 0 };

    /// Create a BeatTime from a floating-point beat value.
    #[inline]
    pub fn from_float(value: f64) -> Self {
        Self {
            beats: (value * Self::SCALE as f64).round() as i64,
        }
    }

    /// Convert to a floating-point beat value.
    #[inline]
    pub fn to_float(self) -> f64 {
        self.beats as f64 / Self::SCALE as f64
    }
}

impl std::ops::Add for BeatTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            beats: self.beats.saturating_add(rhs.beats),
        }
    }
}

/// Clock for backends with no internal tempo engine.
///
/// Always reports time 0 and tempo 60. Sync requests are still recorded so
/// callers can see what was last received.
#[derive(Clone, Debug)]
pub struct InertClock {
    started: Instant,
    last_sync: Option<(f64, Instant)>,
}

impl Default for InertClock {
    fn default() -> Self {
        Self::new()
    }
}

impl InertClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_sync: None,
        }
    }

    /// The last value passed to `set_time` and the instant it was received.
    pub fn last_sync(&self) -> Option<(f64, Instant)> {
        self.last_sync
    }
}

impl Clock for InertClock {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn reset(&mut self) {
        self.started = Instant::now();
        self.last_sync = None;
    }

    fn tempo(&self) -> f64 {
        INERT_TEMPO
    }

    fn time(&self) -> f64 {
        0.0
    }

    fn set_time(&mut self, value: f64, received_at: Instant) {
        self.last_sync = Some((value, received_at));
    }
}

/// Tempo-aware clock for converting between wall-clock time and beats.
///
/// The clock keeps an anchor point (beat position at a specific instant)
/// and uses BPM to calculate beat positions at other times.
#[derive(Clone, Debug)]
pub struct TransportClock {
    bpm: f64,
    started: Instant,
    anchor_instant: Instant,
    anchor_beat: BeatTime,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl TransportClock {
    /// Create a running clock at beat 0 with the given tempo.
    pub fn new(bpm: f64) -> Self {
        let now = Instant::now();
        Self {
            bpm: clamp_bpm(bpm),
            started: now,
            anchor_instant: now,
            anchor_beat: BeatTime::ZERO,
        }
    }

    /// Set the BPM, preserving the current beat position.
    pub fn set_bpm(&mut self, bpm: f64, now: Instant) {
        let beat = self.beat_at(now);
        self.anchor_beat = beat;
        self.anchor_instant = now;
        self.bpm = clamp_bpm(bpm);
    }

    /// Get the current BPM.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Seek to a specific beat position as of `at`.
    pub fn seek(&mut self, beat: BeatTime, at: Instant) {
        self.anchor_beat = beat;
        self.anchor_instant = at;
    }

    /// Calculate the beat position at a given instant.
    pub fn beat_at(&self, time: Instant) -> BeatTime {
        if time <= self.anchor_instant {
            return self.anchor_beat;
        }

        let elapsed = time.duration_since(self.anchor_instant).as_secs_f64();
        let beats_elapsed = (elapsed / 60.0) * self.bpm;
        self.anchor_beat + BeatTime::from_float(beats_elapsed)
    }
}

impl Clock for TransportClock {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn reset(&mut self) {
        let now = Instant::now();
        self.started = now;
        self.seek(BeatTime::ZERO, now);
    }

    fn tempo(&self) -> f64 {
        self.bpm
    }

    fn time(&self) -> f64 {
        self.beat_at(Instant::now()).to_float()
    }

    fn set_time(&mut self, value: f64, received_at: Instant) {
        if !value.is_finite() {
            log::warn!("Ignoring non-finite clock time {}", value);
            return;
        }
        self.seek(BeatTime::from_float(value.max(0.0)), received_at);
    }
}

fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(1.0, 999.0)
    } else {
        DEFAULT_BPM
    }
}

/// Time and tempo as sent to a newly joined collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub time: f64,
    pub tempo: f64,
}

/// Thread-safe handle to a backend's clock.
///
/// Every read and write takes the lock, so the dispatch path and the sync
/// path never observe a half-applied update.
#[derive(Clone)]
pub struct SharedClock {
    inner: Arc<Mutex<dyn Clock>>,
}

impl SharedClock {
    /// Wrap a clock in a new shared handle.
    pub fn new<C: Clock + 'static>(clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(clock)),
        }
    }

    /// Share an existing clock that is also held elsewhere (e.g. by an engine).
    pub fn from_arc<C: Clock + 'static>(clock: Arc<Mutex<C>>) -> Self {
        Self { inner: clock }
    }

    fn lock(&self) -> MutexGuard<'_, dyn Clock + 'static> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> f64 {
        self.lock().now()
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn tempo(&self) -> f64 {
        self.lock().tempo()
    }

    pub fn time(&self) -> f64 {
        self.lock().time()
    }

    pub fn set_time(&self, value: f64, received_at: Instant) {
        self.lock().set_time(value, received_at);
    }

    /// Read time and tempo under a single lock.
    pub fn snapshot(&self) -> ClockSnapshot {
        let clock = self.lock();
        ClockSnapshot {
            time: clock.time(),
            tempo: clock.tempo(),
        }
    }
}

impl std::fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedClock")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_beat_time_precision() {
        for val in [0.0, 1.0, 1.5, 3.75, 100.0] {
            let bt = BeatTime::from_float(val);
            assert!((bt.to_float() - val).abs() < 0.0001, "Precision lost for {val}");
        }
    }

    #[test]
    fn test_inert_clock_reports_fixed_values() {
        let mut clock = InertClock::new();
        let received = Instant::now();
        clock.set_time(42.0, received);
        assert_eq!(clock.time(), 0.0);
        assert_eq!(clock.tempo(), 60.0);
        assert_eq!(clock.last_sync(), Some((42.0, received)));

        clock.reset();
        assert_eq!(clock.last_sync(), None);
    }

    #[test]
    fn test_transport_clock_beat_calculation() {
        let clock = TransportClock::new(120.0);
        // At 120 BPM, 1 beat = 0.5 seconds
        let later = clock.anchor_instant + Duration::from_millis(500);
        let beat = clock.beat_at(later);
        assert!((beat.to_float() - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_set_time_accounts_for_elapsed_time() {
        let mut clock = TransportClock::new(120.0);
        let received = Instant::now();
        clock.set_time(8.0, received);

        // Two seconds after receipt at 120 BPM is four beats later.
        let beat = clock.beat_at(received + Duration::from_secs(2));
        assert!((beat.to_float() - 12.0).abs() < 0.001);
        assert!(clock.time() >= 8.0);
    }

    #[test]
    fn test_set_time_clamps_negative_and_ignores_nan() {
        let mut clock = TransportClock::new(60.0);
        let at = Instant::now();
        clock.set_time(-4.0, at);
        assert_eq!(clock.beat_at(at).to_float(), 0.0);

        clock.set_time(3.0, at);
        clock.set_time(f64::NAN, at);
        assert_eq!(clock.beat_at(at).to_float(), 3.0);
    }

    #[test]
    fn test_set_bpm_preserves_beat() {
        let mut clock = TransportClock::new(120.0);
        let start = clock.anchor_instant;
        let t1 = start + Duration::from_secs(1);
        clock.set_bpm(60.0, t1);
        assert!((clock.beat_at(t1).to_float() - 2.0).abs() < 0.001);

        let t2 = t1 + Duration::from_secs(1);
        assert!((clock.beat_at(t2).to_float() - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_bpm_is_clamped() {
        assert_eq!(TransportClock::new(0.0).bpm(), 1.0);
        assert_eq!(TransportClock::new(5000.0).bpm(), 999.0);
        assert_eq!(TransportClock::new(f64::INFINITY).bpm(), DEFAULT_BPM);
    }

    #[test]
    fn test_time_is_monotonic_without_sync() {
        let clock = SharedClock::new(TransportClock::new(140.0));
        let first = clock.time();
        let second = clock.time();
        assert!(second >= first);
    }

    #[test]
    fn test_shared_clock_sees_engine_updates() {
        let engine_clock = Arc::new(Mutex::new(TransportClock::new(90.0)));
        let shared = SharedClock::from_arc(engine_clock.clone());

        engine_clock.lock().unwrap().set_bpm(150.0, Instant::now());
        assert_eq!(shared.tempo(), 150.0);

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.tempo, 150.0);
    }
}
