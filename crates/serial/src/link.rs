//! Byte-stream links to serial ports.

use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Baud rate the dumper firmware listens at
pub const BAUD_RATE: u32 = 460_800;

/// An open, exclusively owned connection to a port.
pub trait Link: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Link for T {}

/// Line settings used for every connection: 8 data bits, no parity, 1 stop bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    /// Applies to both reads and writes
    pub timeout: Duration,
}

impl LinkSettings {
    pub fn new(timeout: Duration) -> Self {
        Self {
            baud_rate: BAUD_RATE,
            timeout,
        }
    }
}

/// Opens links by port identifier.
pub trait Connector {
    fn open(&self, port_id: &str, settings: &LinkSettings) -> io::Result<Box<dyn Link>>;
}

/// Opens real serial ports through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    fn open(&self, port_id: &str, settings: &LinkSettings) -> io::Result<Box<dyn Link>> {
        let port = serialport::new(port_id, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_use_dumper_baud_rate() {
        let settings = LinkSettings::new(Duration::from_millis(500));
        assert_eq!(settings.baud_rate, 460_800);
        assert_eq!(settings.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_in_memory_streams_are_links() {
        fn takes_link(_: Box<dyn Link>) {}
        takes_link(Box::new(io::Cursor::new(Vec::<u8>::new())));
    }

    #[test]
    fn test_missing_port_fails_to_open() {
        let settings = LinkSettings::new(Duration::from_millis(10));
        assert!(SystemConnector
            .open("/dev/umd-port-that-does-not-exist", &settings)
            .is_err());
    }
}
