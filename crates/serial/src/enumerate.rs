//! Candidate serial ports per host platform.

use crate::SerialError;
use umd_core::logging::{log, LogCategory, LogLevel};

/// Produces the ordered list of port identifiers to probe.
pub trait Enumerator {
    fn candidates(&self) -> Result<Vec<String>, SerialError>;
}

/// A fixed list, probed in the given order.
impl Enumerator for Vec<String> {
    fn candidates(&self) -> Result<Vec<String>, SerialError> {
        Ok(self.clone())
    }
}

/// Host operating system family, which decides where serial devices live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    /// `COM1` through `COM256`
    Windows,
    /// `/dev/ttyA[A-Za-z]*` (ttyACM, ttyAMA)
    Linux,
    /// `/dev/cu*`
    MacOs,
    Other(String),
}

const WINDOWS_COM_PORTS: u32 = 256;

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name to a platform.
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Device-path glob for platforms that enumerate through the filesystem.
    pub fn device_glob(&self) -> Option<&'static str> {
        match self {
            Platform::Linux => Some("/dev/ttyA[A-Za-z]*"),
            Platform::MacOs => Some("/dev/cu*"),
            Platform::Windows | Platform::Other(_) => None,
        }
    }
}

impl Enumerator for Platform {
    fn candidates(&self) -> Result<Vec<String>, SerialError> {
        match self {
            Platform::Windows => Ok((1..=WINDOWS_COM_PORTS).map(|i| format!("COM{}", i)).collect()),
            Platform::Linux | Platform::MacOs => {
                let pattern = self.device_glob().unwrap_or_default();
                glob_ports(pattern)
            }
            Platform::Other(os) => Err(SerialError::UnsupportedPlatform(os.clone())),
        }
    }
}

fn glob_ports(pattern: &str) -> Result<Vec<String>, SerialError> {
    let mut ports = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) => ports.push(path.to_string_lossy().into_owned()),
            Err(e) => log(LogCategory::Serial, LogLevel::Debug, || {
                format!("skipping unreadable device entry: {}", e)
            }),
        }
    }
    log(LogCategory::Serial, LogLevel::Debug, || {
        format!("{} matched {} port(s)", pattern, ports.len())
    });
    Ok(ports)
}
