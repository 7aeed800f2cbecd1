//! Discovery state machine and the confirmed-device map.
//!
//! ```text
//! Idle -> Scanning -> Probing(port)* -> Settled
//!            ^                            |
//!            +------- next pass ----------+
//! ```
//!
//! A pass is split in three so it can run without holding the transport:
//! [`SerialTransport::begin_scan`] closes the previous pass's handles and
//! hands out a [`Scan`], [`Scan::run`] probes every candidate, and
//! [`SerialTransport::finish_scan`] opens persistent links and publishes
//! the new device map in one step.

use crate::enumerate::{Enumerator, Platform};
use crate::handshake::handshake;
use crate::link::{Connector, Link, LinkSettings, SystemConnector};
use crate::SerialError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use umd_core::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Per-port open/read timeout for probes and persistent links
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Scanning,
    Probing(String),
    Settled,
}

impl DiscoveryState {
    pub fn is_running(&self) -> bool {
        matches!(self, DiscoveryState::Scanning | DiscoveryState::Probing(_))
    }
}

/// A port that answered the handshake, with its persistent connection.
pub struct SerialDevice {
    pub port_id: String,
    pub confirmed: bool,
    link: Box<dyn Link>,
}

impl SerialDevice {
    pub fn link(&mut self) -> &mut dyn Link {
        self.link.as_mut()
    }
}

impl fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialDevice")
            .field("port_id", &self.port_id)
            .field("confirmed", &self.confirmed)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub port: String,
    pub reason: String,
}

/// Summary of one completed discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Ports probed, in enumeration order
    pub candidates: Vec<String>,
    /// Ports now held in the device map
    pub confirmed: Vec<String>,
    pub rejected: Vec<Rejection>,
}

/// Probe results handed back to [`SerialTransport::finish_scan`].
#[derive(Debug, Default)]
pub struct ScanOutcome {
    candidates: Vec<String>,
    passed: Vec<String>,
    rejected: Vec<Rejection>,
}

/// One pass's worth of probing, detached from the transport.
pub struct Scan<C, E> {
    connector: C,
    enumerator: E,
    settings: LinkSettings,
}

impl<C: Connector, E: Enumerator> Scan<C, E> {
    /// Probe every candidate in order. `on_probe` is called before each port.
    ///
    /// Only enumeration failure aborts; a port that cannot be opened or does
    /// not answer correctly is recorded as rejected and skipped.
    pub fn run(self, mut on_probe: impl FnMut(&str)) -> Result<ScanOutcome, SerialError> {
        let candidates = self.enumerator.candidates()?;
        log(LogCategory::Discovery, LogLevel::Info, || {
            format!("scanning {} candidate port(s)", candidates.len())
        });

        let mut outcome = ScanOutcome::default();
        for port in &candidates {
            on_probe(port);
            match probe(&self.connector, port, &self.settings) {
                Ok(()) => {
                    log(LogCategory::Serial, LogLevel::Info, || {
                        format!("{}: dumper present", port)
                    });
                    outcome.passed.push(port.clone());
                }
                Err(e) => {
                    log(LogCategory::Serial, LogLevel::Debug, || format!("{}: rejected ({})", port, e));
                    outcome.rejected.push(Rejection {
                        port: port.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        outcome.candidates = candidates;
        Ok(outcome)
    }
}

/// Open, handshake, close.
fn probe<C: Connector>(connector: &C, port: &str, settings: &LinkSettings) -> Result<(), SerialError> {
    let mut link = connector.open(port, settings).map_err(|source| SerialError::Open {
        port: port.to_string(),
        source,
    })?;
    handshake(link.as_mut(), port, settings.timeout)
    // link dropped here, closing the port whatever the result
}

/// Owns every confirmed device connection.
///
/// Only one discovery pass may be in flight; share it behind a mutex (see
/// [`crate::SharedTransport`]) when the pass runs on another thread.
pub struct SerialTransport<C = SystemConnector, E = Platform> {
    connector: C,
    enumerator: E,
    config: TransportConfig,
    state: DiscoveryState,
    devices: BTreeMap<String, SerialDevice>,
    active: BTreeSet<String>,
}

impl SerialTransport<SystemConnector, Platform> {
    /// Real serial ports on the current host.
    pub fn system(config: TransportConfig) -> Self {
        Self::new(SystemConnector, Platform::current(), config)
    }
}

impl<C: Connector + Clone, E: Enumerator + Clone> SerialTransport<C, E> {
    pub fn new(connector: C, enumerator: E, config: TransportConfig) -> Self {
        Self {
            connector,
            enumerator,
            config,
            state: DiscoveryState::Idle,
            devices: BTreeMap::new(),
            active: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    fn link_settings(&self) -> LinkSettings {
        LinkSettings::new(self.config.timeout)
    }

    /// Start a pass: close the previous pass's handles and detach a [`Scan`].
    pub fn begin_scan(&mut self) -> Result<Scan<C, E>, SerialError> {
        if self.state.is_running() {
            return Err(SerialError::DiscoveryInProgress);
        }
        // the ports must be free again before they can be re-probed
        self.release_all();
        self.state = DiscoveryState::Scanning;
        log(LogCategory::Discovery, LogLevel::Debug, || "state: Scanning".to_string());

        Ok(Scan {
            connector: self.connector.clone(),
            enumerator: self.enumerator.clone(),
            settings: self.link_settings(),
        })
    }

    pub(crate) fn mark_probing(&mut self, port: &str) {
        log(LogCategory::Discovery, LogLevel::Trace, || format!("state: Probing({})", port));
        self.state = DiscoveryState::Probing(port.to_string());
    }

    /// Publish a pass's result.
    ///
    /// On success a fresh persistent link is opened for every port that
    /// passed and the device map is replaced; the first confirmed port is
    /// made active. A failed pass leaves the transport `Idle` with no devices.
    pub fn finish_scan(
        &mut self,
        outcome: Result<ScanOutcome, SerialError>,
    ) -> Result<DiscoveryReport, SerialError> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                log(LogCategory::Discovery, LogLevel::Error, || format!("discovery failed: {}", e));
                self.state = DiscoveryState::Idle;
                return Err(e);
            }
        };

        let settings = self.link_settings();
        let mut devices = BTreeMap::new();
        let mut rejected = outcome.rejected;
        for port in outcome.passed {
            match self.connector.open(&port, &settings) {
                Ok(link) => {
                    devices.insert(
                        port.clone(),
                        SerialDevice {
                            port_id: port,
                            confirmed: true,
                            link,
                        },
                    );
                }
                Err(e) => {
                    log(LogCategory::Serial, LogLevel::Warn, || {
                        format!("{}: passed handshake but could not be reopened: {}", port, e)
                    });
                    rejected.push(Rejection {
                        reason: format!("reopen failed: {}", e),
                        port,
                    });
                }
            }
        }

        self.devices = devices;
        self.active = self.devices.keys().next().cloned().into_iter().collect();
        self.state = DiscoveryState::Settled;

        let report = DiscoveryReport {
            candidates: outcome.candidates,
            confirmed: self.devices.keys().cloned().collect(),
            rejected,
        };
        log(LogCategory::Discovery, LogLevel::Info, || {
            format!(
                "settled: {} device(s) of {} candidate(s)",
                report.confirmed.len(),
                report.candidates.len()
            )
        });
        Ok(report)
    }

    /// Run a full pass on the calling thread.
    pub fn discover(&mut self) -> Result<DiscoveryReport, SerialError> {
        let scan = self.begin_scan()?;
        let outcome = scan.run(|port| self.mark_probing(port));
        self.finish_scan(outcome)
    }

    pub fn devices(&self) -> impl Iterator<Item = &SerialDevice> {
        self.devices.values()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn device_mut(&mut self, port_id: &str) -> Option<&mut SerialDevice> {
        self.devices.get_mut(port_id)
    }

    pub fn is_confirmed(&self, port_id: &str) -> bool {
        self.devices.contains_key(port_id)
    }

    /// Close one device's connection. Returns false if it was not held.
    pub fn release(&mut self, port_id: &str) -> bool {
        self.active.remove(port_id);
        let released = self.devices.remove(port_id).is_some();
        if released {
            log(LogCategory::Serial, LogLevel::Info, || format!("{}: released", port_id));
        }
        released
    }

    pub fn release_all(&mut self) {
        self.active.clear();
        self.devices.clear();
    }

    /// Select or deselect a confirmed device for command traffic.
    pub fn set_active(&mut self, port_id: &str, active: bool) -> bool {
        if !self.devices.contains_key(port_id) {
            return false;
        }
        if active {
            self.active.insert(port_id.to_string());
        } else {
            self.active.remove(port_id);
        }
        true
    }

    pub fn active_ports(&self) -> Vec<String> {
        self.active.iter().cloned().collect()
    }
}
