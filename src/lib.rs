#![cfg_attr(not(test), no_std)]

//! Interrupt-driven decoder for DHT/RHT03 single-wire humidity and
//! temperature sensors.
//!
//! The sensor answers a start pulse with 42 falling edges. The spacing between
//! two falling edges encodes one bit, so the driver only needs a timestamp per
//! edge: the interrupt handler feeds [`Capture::on_falling_edge`], and
//! [`DHTSensor::read`] waits for the capture to complete.
//!
//! ```ignore
//! static CAPTURE: Capture = Capture::new();
//!
//! // GPIO interrupt handler
//! fn on_gpio() {
//!     CAPTURE.on_falling_edge_now();
//! }
//!
//! let mut sensor = DHTSensor::new(out, input, delay, &CAPTURE, Config::rht03())?;
//! loop {
//!     if let Ok(reading) = sensor.read().await {
//!         info!("{} C, {} %", reading.temperature, reading.humidity);
//!     }
//!     Timer::after(Duration::from_secs(5)).await;
//! }
//! ```

#[macro_use]
mod fmt;

mod capture;
mod config;
mod dht;
mod line;
mod packet;

use core::fmt::{Debug, Display, Formatter};

pub use capture::Capture;
pub use config::Config;
pub use dht::DHTSensor;
pub use line::{EdgeInput, Pull};
pub use packet::{ChecksumMismatch, Packet};

/// Errors reported by [`DHTSensor`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DHTSensorError<E> {
    /// The output and input halves of the bus are not the same node.
    Wiring,
    /// The sensor did not finish the transfer in time.
    Timeout,
    /// The received checksum does not match the data bytes.
    ChecksumError { expected: u8, actual: u8 },
    /// The capture record is leased by another sensor.
    CaptureInUse,
    /// Error reported by the pin driver.
    Pin(E),
}

impl<E> From<E> for DHTSensorError<E> {
    fn from(err: E) -> Self {
        DHTSensorError::Pin(err)
    }
}

impl<E: Debug> Display for DHTSensorError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            DHTSensorError::Wiring => write!(f, "DHT sensor pins are not connected together"),
            DHTSensorError::Timeout => write!(f, "DHT sensor data timeout"),
            DHTSensorError::ChecksumError { expected, actual } => write!(
                f,
                "DHT sensor data has invalid checksum (expected {expected:#04x}, got {actual:#04x})"
            ),
            DHTSensorError::CaptureInUse => write!(f, "capture is already bound to a sensor"),
            DHTSensorError::Pin(err) => write!(f, "pin error: {err:?}"),
        }
    }
}

impl<E: Debug> core::error::Error for DHTSensorError<E> {}

/// A converted measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
}

impl Reading {
    /// Converts the four data bytes of a validated packet.
    pub fn from_bytes(data: &[u8; 4]) -> Self {
        Reading {
            humidity: humidity(data),
            temperature: temperature(data),
        }
    }

    /// Temperature in degrees Fahrenheit, derived from [`temperature`](Self::temperature).
    pub fn fahrenheit(&self) -> f32 {
        self.temperature * 1.8 + 32.0
    }
}

fn humidity(data: &[u8; 4]) -> f32 {
    ((u16::from(data[0]) << 8) | u16::from(data[1])) as f32 / 10.0
}

// Sign-magnitude: the MSB of byte 2 flags a negative value.
fn temperature(data: &[u8; 4]) -> f32 {
    let temp = ((u16::from(data[2] & 0x7F) << 8) | u16::from(data[3])) as f32 / 10.0;
    if data[2] & 0x80 != 0 {
        -temp
    } else {
        temp
    }
}
