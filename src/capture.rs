//! Edge capture shared between the GPIO interrupt and the reading task.
//!
//! The sensor sends 42 falling edges per transfer: two for the presence pulse
//! and one closing each of the 40 data bits. The time between two falling
//! edges tells a `0` from a `1`.
//!
//! All state lives behind a critical section. The interrupt side only ever
//! touches [`Accumulator`], and hands the finished data register over through
//! the completion signal, so the reader never looks at a half-filled register.

use core::cell::RefCell;
use core::ops::Deref;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};

use crate::config::BIT_THRESHOLD;

// The mask doubles as the edge counter: one position per expected edge,
// the capture is complete once it shifts out.
const FIRST_EDGE_MASK: u64 = 1 << 41;

struct Accumulator {
    mask: u64,
    data: u64,
    last_edge: Instant,
    threshold: Duration,
    armed: bool,
    leased: bool,
}

impl Accumulator {
    const fn new() -> Self {
        Accumulator {
            mask: FIRST_EDGE_MASK,
            data: 0,
            last_edge: Instant::from_ticks(0),
            threshold: BIT_THRESHOLD,
            armed: false,
            leased: false,
        }
    }

    fn reset(&mut self) {
        self.mask = FIRST_EDGE_MASK;
        self.data = 0;
        self.armed = false;
    }

    /// Returns the data register once the last expected edge arrived.
    fn record_edge(&mut self, at: Instant) -> Option<u64> {
        if !self.armed {
            return None;
        }
        let elapsed = at.checked_duration_since(self.last_edge);
        if elapsed.is_some_and(|elapsed| elapsed > self.threshold) {
            self.data |= self.mask;
        }
        self.last_edge = at;
        self.mask >>= 1;
        if self.mask == 0 {
            self.armed = false;
            Some(self.data)
        } else {
            None
        }
    }
}

/// Capture record for one sensor bus.
///
/// Usually a `static`, so the interrupt handler can reach it:
///
/// ```ignore
/// static CAPTURE: Capture = Capture::new();
///
/// #[handler]
/// fn gpio_handler() {
///     CAPTURE.on_falling_edge_now();
///     DHT_INPUT.with(|pin| pin.clear_interrupt());
/// }
/// ```
pub struct Capture {
    state: Mutex<RefCell<Accumulator>>,
    done: Signal<CriticalSectionRawMutex, u64>,
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture {
    pub const fn new() -> Self {
        Capture {
            state: Mutex::new(RefCell::new(Accumulator::new())),
            done: Signal::new(),
        }
    }

    /// Records a falling edge observed at `at`.
    ///
    /// Meant to be called from the interrupt handler. Edges arriving while no
    /// read is in flight are ignored.
    pub fn on_falling_edge(&self, at: Instant) {
        critical_section::with(|cs| {
            if let Some(data) = self.state.borrow_ref_mut(cs).record_edge(at) {
                self.done.signal(data);
            }
        });
    }

    /// Same as [`on_falling_edge`](Self::on_falling_edge), timestamped with
    /// [`Instant::now`].
    pub fn on_falling_edge_now(&self) {
        self.on_falling_edge(Instant::now());
    }

    /// Whether a read is currently waiting for edges.
    pub fn is_armed(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).armed)
    }

    pub(crate) fn lease(&self) -> Option<Lease<'_>> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.leased {
                None
            } else {
                state.leased = true;
                Some(Lease { capture: self })
            }
        })
    }
}

/// Exclusive use of a [`Capture`] by one sensor, given back on drop.
pub(crate) struct Lease<'a> {
    capture: &'a Capture,
}

impl Deref for Lease<'_> {
    type Target = Capture;

    fn deref(&self) -> &Capture {
        self.capture
    }
}

impl Lease<'_> {
    /// Clears the register and any stale completion.
    pub(crate) fn reset(&self) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).reset();
            self.done.reset();
        });
    }

    pub(crate) fn arm(&self, threshold: Duration) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.threshold = threshold;
            state.armed = true;
        });
    }

    /// Stops accepting edges.
    ///
    /// Shares the critical section with [`Capture::on_falling_edge`], so an
    /// edge either completes the capture before this or is dropped after it.
    pub(crate) fn disarm(&self) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).armed = false;
        });
    }

    /// Resolves with the data register of the completed capture.
    pub(crate) async fn wait(&self) -> u64 {
        self.done.wait().await
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        critical_section::with(|cs| {
            let mut state = self.capture.state.borrow_ref_mut(cs);
            state.armed = false;
            state.leased = false;
            self.capture.done.reset();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_US: u64 = 77;
    const ONE_US: u64 = 120;

    /// Feeds 42 edges alternating short and long gaps, starting with a long one.
    /// Returns the expected register.
    fn feed_alternating(capture: &Capture, start_us: u64) -> u64 {
        let mut t = start_us;
        let mut expected = 0u64;
        for edge in 0..42 {
            let long = edge % 2 == 0;
            t += if long { ONE_US } else { ZERO_US };
            if long {
                expected |= 1 << (41 - edge);
            }
            capture.on_falling_edge(Instant::from_micros(t));
        }
        expected
    }

    #[test]
    fn accumulator_fills_one_bit_per_edge() {
        let mut acc = Accumulator::new();
        acc.armed = true;

        // 41 short gaps, then one long gap on the final edge
        let mut t = 0;
        for _ in 0..41 {
            t += ZERO_US;
            assert_eq!(acc.record_edge(Instant::from_micros(t)), None);
        }
        t += ONE_US;
        assert_eq!(acc.record_edge(Instant::from_micros(t)), Some(1));
        assert_eq!(acc.mask, 0);
        assert!(!acc.armed);
    }

    #[test]
    fn gap_equal_to_threshold_is_zero() {
        let mut acc = Accumulator::new();
        acc.armed = true;
        acc.last_edge = Instant::from_micros(1_000);

        acc.record_edge(Instant::from_micros(1_000) + BIT_THRESHOLD);
        assert_eq!(acc.data, 0);

        acc.record_edge(Instant::from_micros(1_001) + BIT_THRESHOLD * 2);
        assert_eq!(acc.data, FIRST_EDGE_MASK >> 1);
    }

    #[test]
    fn earlier_timestamp_does_not_underflow() {
        let mut acc = Accumulator::new();
        acc.armed = true;
        acc.last_edge = Instant::from_micros(5_000);

        assert_eq!(acc.record_edge(Instant::from_micros(10)), None);
        assert_eq!(acc.data, 0);
        assert_eq!(acc.last_edge, Instant::from_micros(10));
    }

    #[test]
    fn completes_exactly_on_last_edge() {
        let capture = Capture::new();
        let lease = capture.lease().unwrap();
        lease.reset();
        lease.arm(BIT_THRESHOLD);

        let mut t = 10_000;
        let mut expected = 0u64;
        for edge in 0..42 {
            assert!(!capture.done.signaled(), "completed early at edge {edge}");
            let long = edge % 3 == 0;
            t += if long { ONE_US } else { ZERO_US };
            if long {
                expected |= 1 << (41 - edge);
            }
            capture.on_falling_edge(Instant::from_micros(t));
        }

        assert!(!capture.is_armed());
        assert_eq!(capture.done.try_take(), Some(expected));
    }

    #[test]
    fn alternating_edges_produce_alternating_bits() {
        let capture = Capture::new();
        let lease = capture.lease().unwrap();
        lease.reset();
        lease.arm(BIT_THRESHOLD);

        let expected = feed_alternating(&capture, 0);
        assert_eq!(expected, 0x2AA_AAAA_AAAA);
        assert_eq!(capture.done.try_take(), Some(expected));
    }

    #[test]
    fn edges_after_completion_are_ignored() {
        let capture = Capture::new();
        let lease = capture.lease().unwrap();
        lease.reset();
        lease.arm(BIT_THRESHOLD);

        let expected = feed_alternating(&capture, 0);
        assert_eq!(capture.done.try_take(), Some(expected));

        capture.on_falling_edge(Instant::from_micros(1_000_000));
        assert!(!capture.done.signaled());
        critical_section::with(|cs| {
            let state = capture.state.borrow_ref(cs);
            assert_eq!(state.data, expected);
            assert_eq!(state.mask, 0);
        });
    }

    #[test]
    fn disarm_drops_straggler_edges() {
        let capture = Capture::new();
        let lease = capture.lease().unwrap();
        lease.reset();
        lease.arm(BIT_THRESHOLD);

        let mut t = 0;
        for _ in 0..41 {
            t += ONE_US;
            capture.on_falling_edge(Instant::from_micros(t));
        }
        lease.disarm();
        capture.on_falling_edge(Instant::from_micros(t + ONE_US));

        assert!(!capture.done.signaled());
        assert!(!capture.is_armed());
    }

    #[test]
    fn reset_restores_initial_register() {
        let capture = Capture::new();
        let lease = capture.lease().unwrap();
        lease.reset();
        lease.arm(BIT_THRESHOLD);
        feed_alternating(&capture, 0);

        lease.reset();
        assert!(!capture.done.signaled());
        critical_section::with(|cs| {
            let state = capture.state.borrow_ref(cs);
            assert_eq!(state.mask, FIRST_EDGE_MASK);
            assert_eq!(state.data, 0);
            assert!(!state.armed);
        });
    }

    #[test]
    fn unarmed_capture_ignores_edges() {
        let capture = Capture::new();
        capture.on_falling_edge(Instant::from_micros(500));
        critical_section::with(|cs| {
            let state = capture.state.borrow_ref(cs);
            assert_eq!(state.mask, FIRST_EDGE_MASK);
            assert_eq!(state.last_edge, Instant::from_ticks(0));
        });
    }

    #[test]
    fn lease_is_exclusive() {
        let capture = Capture::new();
        let lease = capture.lease();
        assert!(lease.is_some());
        assert!(capture.lease().is_none());

        drop(lease);
        assert!(capture.lease().is_some());
    }

    #[test]
    fn dropping_lease_disarms() {
        let capture = Capture::new();
        let lease = capture.lease().unwrap();
        lease.arm(BIT_THRESHOLD);
        assert!(capture.is_armed());

        drop(lease);
        assert!(!capture.is_armed());
    }
}
