//! `serialport`-backed implementation of [`SerialPortAdapter`].

use super::error::PortError;
use super::traits::{PortConfiguration, SerialPortAdapter};
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Duration;

/// A real serial device opened through the `serialport` crate.
pub struct SyncSerialPort {
    inner: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SyncSerialPort {
    /// Open `path` with the given line settings.
    ///
    /// ```no_run
    /// use trace_console::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", PortConfiguration::default())?;
    /// # Ok::<(), trace_console::PortError>(())
    /// ```
    pub fn open(path: &str, config: PortConfiguration) -> Result<Self, PortError> {
        let inner = serialport::new(path, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .timeout(config.timeout)
            .open()
            .map_err(|e| open_error(path, e))?;

        Ok(Self {
            inner,
            path: path.to_string(),
        })
    }
}

fn open_error(path: &str, error: serialport::Error) -> PortError {
    match error.kind() {
        serialport::ErrorKind::NoDevice => PortError::not_found(path),
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => PortError::not_found(path),
        serialport::ErrorKind::InvalidInput => PortError::config(error.description),
        _ => PortError::Serial(error),
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.inner.write_all(data)?;
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        Ok(self.inner.read(buffer)?)
    }

    fn name(&self) -> &str {
        &self.path
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        Ok(self.inner.set_timeout(timeout)?)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(self.inner.flush()?)
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        Ok(self.inner.clear(serialport::ClearBuffer::Input)?)
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(Self {
            inner: self.inner.try_clone()?,
            path: self.path.clone(),
        }))
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("path", &self.path)
            .field("baud_rate", &self.inner.baud_rate().ok())
            .finish()
    }
}

/// A port the operating system reports, for the `ports` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    /// USB manufacturer and product, when known.
    pub description: Option<String>,
}

/// List the serial ports the operating system knows about.
pub fn list_ports() -> Result<Vec<PortInfo>, PortError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|info| {
            let description = match info.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let parts: Vec<String> = [usb.manufacturer, usb.product]
                        .into_iter()
                        .flatten()
                        .collect();
                    Some(if parts.is_empty() {
                        format!("USB {:04x}:{:04x}", usb.vid, usb.pid)
                    } else {
                        parts.join(" ")
                    })
                }
                serialport::SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
                _ => None,
            };
            PortInfo {
                name: info.port_name,
                description,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_an_open_error() {
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", PortConfiguration::default());

        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            Err(PortError::Serial(_)) | Err(PortError::Io(_)) => {}
            other => panic!("expected open failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn invalid_input_maps_to_config_error() {
        let error = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(open_error("COM1", error), PortError::Config(msg) if msg == "bad baud"));
    }

    #[test]
    fn listing_ports_does_not_fail() {
        // Some CI hosts have no serial subsystem at all.
        if let Ok(ports) = list_ports() {
            assert!(ports.iter().all(|p| !p.name.is_empty()));
        }
    }
}
