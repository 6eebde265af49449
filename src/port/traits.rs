//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` lets the session run against real hardware or against
//! `MockSerialPort` without knowing which one it holds.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line settings used when opening a serial port. Defaults to 115200 8N1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub flow_control: FlowControl,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Read timeout. Bounds how long the reader takes to notice a stop request.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(200),
        }
    }
}

/// Declares a line-setting enum that (de)serializes in lowercase and maps
/// one-to-one onto the `serialport` type of the same name.
macro_rules! line_setting {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl From<$name> for serialport::$name {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => serialport::$name::$variant),+
                }
            }
        }
    };
}

line_setting!(
    /// Number of data bits per character.
    DataBits { Five, Six, Seven, Eight }
);

line_setting!(
    /// Flow control modes.
    FlowControl { None, Software, Hardware }
);

line_setting!(
    /// Parity checking modes.
    Parity { None, Odd, Even }
);

line_setting!(
    /// Number of stop bits.
    StopBits { One, Two }
);

/// Byte-level access to an open serial port.
///
/// A session splits one open port into two handles via `try_clone_adapter`:
/// the reader thread reads from one, foreground callers write to the other.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write all of `data` in one go, returning its length.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Blocks up to the read timeout. An expired timeout is an error for
    /// which [`PortError::is_timeout`] returns true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// System path the port was opened with.
    fn name(&self) -> &str;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Block until all written bytes have left the transmit buffer.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Discard any received bytes that have not been read yet.
    fn clear_input(&mut self) -> Result<(), PortError>;

    /// Open a second handle onto the same underlying port.
    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_serialport_conversions() {
        let bits: serialport::DataBits = DataBits::Seven.into();
        assert_eq!(bits, serialport::DataBits::Seven);

        let flow: serialport::FlowControl = FlowControl::Hardware.into();
        assert_eq!(flow, serialport::FlowControl::Hardware);

        let parity: serialport::Parity = Parity::Even.into();
        assert_eq!(parity, serialport::Parity::Even);

        let stop: serialport::StopBits = StopBits::Two.into();
        assert_eq!(stop, serialport::StopBits::Two);
    }

    #[test]
    fn test_line_settings_deserialize_lowercase() {
        let parity: Parity = serde_json::from_str("\"odd\"").unwrap();
        assert_eq!(parity, Parity::Odd);
        let flow: FlowControl = serde_json::from_str("\"software\"").unwrap();
        assert_eq!(flow, FlowControl::Software);
    }
}
