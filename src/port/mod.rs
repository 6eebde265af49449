//! Serial transport: the adapter trait, the `serialport`-backed device and a
//! scriptable mock for tests and demos.

mod error;
mod mock;
mod sync_port;
mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::{list_ports, PortInfo, SyncSerialPort};
pub use traits::{DataBits, FlowControl, Parity, PortConfiguration, SerialPortAdapter, StopBits};
