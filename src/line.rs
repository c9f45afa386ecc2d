//! Input half of the sensor bus.

use embedded_hal::digital::InputPin;

/// Where the bus pull-up comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// Enable the MCU's internal pull-up on the input pin.
    Internal,
    /// A resistor on the board pulls the line up.
    External,
}

/// An input pin that can raise an interrupt on falling edges.
///
/// embedded-hal has no interrupt trait, so HAL pins are wrapped in a small
/// adapter. The interrupt handler itself calls
/// [`Capture::on_falling_edge`](crate::Capture::on_falling_edge).
///
/// ```ignore
/// impl EdgeInput for DhtInput<'_> {
///     fn set_pull(&mut self, pull: Pull) -> Result<(), Self::Error> {
///         let pull = match pull {
///             Pull::Internal => esp_hal::gpio::Pull::Up,
///             Pull::External => esp_hal::gpio::Pull::None,
///         };
///         self.0.apply_input_config(&InputConfig::default().with_pull(pull));
///         Ok(())
///     }
///
///     fn listen_falling_edge(&mut self) -> Result<(), Self::Error> {
///         self.0.listen(Event::FallingEdge);
///         Ok(())
///     }
///
///     fn unlisten(&mut self) -> Result<(), Self::Error> {
///         self.0.unlisten();
///         Ok(())
///     }
/// }
/// ```
pub trait EdgeInput: InputPin {
    fn set_pull(&mut self, pull: Pull) -> Result<(), Self::Error>;

    fn listen_falling_edge(&mut self) -> Result<(), Self::Error>;

    fn unlisten(&mut self) -> Result<(), Self::Error>;
}
