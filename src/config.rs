use embassy_time::Duration;

use crate::line::Pull;

/// Time the host holds the line low to start a transfer, RHT03 needs at least 1 ms.
pub const START_DELAY_MS: u32 = 2;

/// Falling edges further apart than this carry a `1` bit.
///
/// A `0` bit spans about 77 µs between falling edges, a `1` about 120 µs.
/// Adjust when checksums fail often, the clock resolution of the edge
/// timestamps matters here.
pub const BIT_THRESHOLD: Duration = Duration::from_micros(105);

/// Upper bound for a complete transfer. The sensor needs about 5 ms, the rest
/// covers interrupt latency.
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Per-sensor timing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// How long the host holds the bus low to start a transfer.
    pub start_delay_ms: u32,
    /// Falling-edge spacing above which a bit reads as `1`.
    pub bit_threshold: Duration,
    /// Upper bound for one complete transfer.
    pub timeout: Duration,
    /// Pull-up applied to the input pin at construction.
    pub pull: Pull,
}

impl Default for Config {
    fn default() -> Self {
        Self::rht03()
    }
}

impl Config {
    /// RHT03 / DHT22 / AM2302.
    pub const fn rht03() -> Self {
        Self {
            start_delay_ms: START_DELAY_MS,
            bit_threshold: BIT_THRESHOLD,
            timeout: READ_TIMEOUT,
            pull: Pull::Internal,
        }
    }

    pub const fn with_start_delay_ms(mut self, start_delay_ms: u32) -> Self {
        self.start_delay_ms = start_delay_ms;
        self
    }

    pub const fn with_bit_threshold(mut self, bit_threshold: Duration) -> Self {
        self.bit_threshold = bit_threshold;
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn with_pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }
}
