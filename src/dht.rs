use embassy_time::with_timeout;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::capture::{Capture, Lease};
use crate::{Config, DHTSensorError, EdgeInput, Packet, Reading};

/// DHT/RHT03 sensor on a bus made of two joined pins.
///
/// `output` drives the bus (low) or releases it to the pull-up (high),
/// `input` reads it back and raises the falling-edge interrupt that feeds
/// `capture`. Dropping the sensor gives the capture back.
pub struct DHTSensor<'a, O, I, D> {
    output: O,
    input: I,
    delay: D,
    capture: Lease<'a>,
    config: Config,
    last_reading: Option<Reading>,
}

impl<'a, O, I, D, E> DHTSensor<'a, O, I, D>
where
    O: OutputPin<Error = E>,
    I: EdgeInput<Error = E>,
    D: DelayNs,
{
    /// Takes the capture and checks that `output` and `input` are wired together.
    pub fn new(
        mut output: O,
        mut input: I,
        delay: D,
        capture: &'a Capture,
        config: Config,
    ) -> Result<Self, DHTSensorError<E>> {
        let capture = capture.lease().ok_or(DHTSensorError::CaptureInUse)?;

        input.unlisten()?;
        input.set_pull(config.pull)?;
        if !check_wiring(&mut output, &mut input)? {
            warn!("DHT sensor pins are not connected together");
            return Err(DHTSensorError::Wiring);
        }
        info!("DHT sensor ready, start delay {} ms", config.start_delay_ms);

        Ok(DHTSensor {
            output,
            input,
            delay,
            capture,
            config,
            last_reading: None,
        })
    }

    /// Runs one transfer.
    ///
    /// On success the reading is stored and returned. On timeout or checksum
    /// failure the last good reading is kept. Wait at least 2 s between reads.
    pub async fn read(&mut self) -> Result<Reading, DHTSensorError<E>> {
        let data = self.capture_frame().await?;

        let packet = Packet::from_register(data);
        let bytes = packet.validate().map_err(|err| {
            warn!(
                "DHT sensor data has invalid checksum: expected {}, got {}",
                err.expected,
                err.actual
            );
            DHTSensorError::ChecksumError {
                expected: err.expected,
                actual: err.actual,
            }
        })?;

        let reading = Reading::from_bytes(&bytes);
        debug!(
            "DHT sensor: {} C, {} %",
            reading.temperature,
            reading.humidity
        );
        self.last_reading = Some(reading);
        Ok(reading)
    }

    /// Last reading that passed the checksum, `None` before the first one.
    pub fn last_reading(&self) -> Option<Reading> {
        self.last_reading
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Disables the edge interrupt and hands the pins and delay back.
    ///
    /// If the interrupt can't be disabled the pins are dropped with the sensor.
    pub fn release(mut self) -> Result<(O, I, D), DHTSensorError<E>> {
        self.input.unlisten()?;
        Ok((self.output, self.input, self.delay))
    }

    async fn capture_frame(&mut self) -> Result<u64, DHTSensorError<E>> {
        self.capture.reset();

        self.output.set_low()?;
        self.delay.delay_ms(self.config.start_delay_ms);

        // Arm before releasing the bus, the presence pulse follows right away.
        self.capture.arm(self.config.bit_threshold);
        let mut receiver = Receiver {
            input: &mut self.input,
            capture: &self.capture,
            listening: true,
        };
        let started = receiver
            .input
            .listen_falling_edge()
            .and_then(|()| self.output.set_high());
        if let Err(err) = started {
            drop(receiver);
            let _ = self.output.set_high();
            return Err(err.into());
        }

        let result = with_timeout(self.config.timeout, self.capture.wait()).await;
        let stopped = receiver.stop();

        match (result, stopped) {
            (Ok(data), Ok(())) => Ok(data),
            (Ok(data), Err(_)) => {
                warn!("DHT sensor edge interrupt could not be disabled");
                Ok(data)
            }
            (Err(_), Err(err)) => Err(DHTSensorError::Pin(err)),
            (Err(_), Ok(())) => {
                warn!("DHT sensor data timeout");
                Err(DHTSensorError::Timeout)
            }
        }
    }
}

/// Edge interrupt enabled for one transfer.
///
/// Dropping it mid-transfer, e.g. when the `read` future is cancelled,
/// disables the interrupt and disarms the capture.
struct Receiver<'s, 'a, I: EdgeInput> {
    input: &'s mut I,
    capture: &'s Lease<'a>,
    listening: bool,
}

impl<I: EdgeInput> Receiver<'_, '_, I> {
    fn stop(&mut self) -> Result<(), I::Error> {
        self.listening = false;
        // An edge landing between these two calls may still complete the
        // capture; the next read's reset discards that completion.
        let result = self.input.unlisten();
        self.capture.disarm();
        result
    }
}

impl<I: EdgeInput> Drop for Receiver<'_, '_, I> {
    fn drop(&mut self) {
        if self.listening {
            let _ = self.stop();
        }
    }
}

/// True if the input follows the output: low while driven, high once released.
fn check_wiring<O, I, E>(output: &mut O, input: &mut I) -> Result<bool, E>
where
    O: OutputPin<Error = E>,
    I: InputPin<Error = E>,
{
    output.set_low()?;
    let expected_false = input.is_high()?;
    output.set_high()?;
    let expected_true = input.is_high()?;
    Ok(expected_true && !expected_false)
}
