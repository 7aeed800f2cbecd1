//! Running a discovery pass off the caller's thread.
//!
//! The transport is locked only to start the pass, to record which port is
//! being probed, and to publish the result; the probes themselves run
//! unlocked, so callers can keep reading the (empty) device map meanwhile.

use crate::enumerate::Enumerator;
use crate::link::Connector;
use crate::transport::{DiscoveryReport, Scan, SerialTransport};
use crate::SerialError;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use umd_core::logging::{log, LogCategory, LogLevel};

/// A transport shared between the caller and a discovery worker.
pub type SharedTransport<C, E> = Arc<Mutex<SerialTransport<C, E>>>;

/// Completion message from a discovery worker.
#[derive(Debug)]
pub enum DiscoveryEvent {
    Settled(DiscoveryReport),
    Failed(SerialError),
}

/// A discovery pass running on its own thread.
pub struct DiscoveryTask {
    events: Receiver<DiscoveryEvent>,
    handle: Option<JoinHandle<()>>,
}

fn lock<C, E>(shared: &SharedTransport<C, E>) -> MutexGuard<'_, SerialTransport<C, E>> {
    // a worker that panicked under the lock is recovered by `run_pass`
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DiscoveryTask {
    /// Start a pass on `shared`.
    ///
    /// Fails immediately with [`SerialError::DiscoveryInProgress`] if another
    /// pass has not settled yet.
    pub fn spawn<C, E>(shared: SharedTransport<C, E>) -> Result<Self, SerialError>
    where
        C: Connector + Clone + Send + 'static,
        E: Enumerator + Clone + Send + 'static,
    {
        let scan = lock(&shared).begin_scan()?;
        let (sender, events) = channel();

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("umd-discovery".to_string())
            .spawn(move || {
                let event = match run_pass(&worker_shared, scan) {
                    Ok(report) => DiscoveryEvent::Settled(report),
                    Err(e) => DiscoveryEvent::Failed(e),
                };
                if sender.send(event).is_err() {
                    log(LogCategory::Discovery, LogLevel::Debug, || {
                        "discovery finished after its task was dropped".to_string()
                    });
                }
            });

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => return Err(abandon_pass(&shared, e)),
        };

        Ok(Self {
            events,
            handle: Some(handle),
        })
    }

    /// The completion channel, for callers that multiplex several sources.
    pub fn events(&self) -> &Receiver<DiscoveryEvent> {
        &self.events
    }

    /// Non-blocking check for completion.
    pub fn poll(&self) -> Option<Result<DiscoveryReport, SerialError>> {
        match self.events.try_recv() {
            Ok(event) => Some(event.into_result()),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SerialError::WorkerGone)),
        }
    }

    /// Block until the pass settles.
    pub fn wait(mut self) -> Result<DiscoveryReport, SerialError> {
        let result = match self.events.recv() {
            Ok(event) => event.into_result(),
            Err(_) => Err(SerialError::WorkerGone),
        };
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }
}

/// Probe and publish, returning the transport to `Idle` if anything panics.
fn run_pass<C, E>(shared: &SharedTransport<C, E>, scan: Scan<C, E>) -> Result<DiscoveryReport, SerialError>
where
    C: Connector + Clone,
    E: Enumerator + Clone,
{
    let pass = panic::catch_unwind(AssertUnwindSafe(|| {
        let outcome = scan.run(|port| lock(shared).mark_probing(port));
        lock(shared).finish_scan(outcome)
    }));
    pass.unwrap_or_else(|_| {
        log(LogCategory::Discovery, LogLevel::Error, || {
            "discovery worker panicked".to_string()
        });
        lock(shared).finish_scan(Err(SerialError::WorkerGone))
    })
}

/// Undo `begin_scan` after the worker thread could not be started.
fn abandon_pass<C, E>(shared: &SharedTransport<C, E>, cause: io::Error) -> SerialError
where
    C: Connector + Clone,
    E: Enumerator + Clone,
{
    log(LogCategory::Discovery, LogLevel::Error, || {
        format!("could not start discovery worker: {}", cause)
    });
    // the pass never ran, so there is no outcome to publish
    let _ = lock(shared).finish_scan(Err(SerialError::WorkerGone));
    SerialError::Io(cause)
}

impl DiscoveryEvent {
    pub fn into_result(self) -> Result<DiscoveryReport, SerialError> {
        match self {
            DiscoveryEvent::Settled(report) => Ok(report),
            DiscoveryEvent::Failed(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SystemConnector;
    use crate::transport::{DiscoveryState, TransportConfig};

    #[test]
    fn test_failed_worker_start_reports_cause() {
        let shared: SharedTransport<SystemConnector, Vec<String>> = Arc::new(Mutex::new(
            SerialTransport::new(SystemConnector, Vec::new(), TransportConfig::default()),
        ));
        let _scan = lock(&shared).begin_scan().unwrap();

        let cause = io::Error::new(io::ErrorKind::OutOfMemory, "no threads left");
        match abandon_pass(&shared, cause) {
            SerialError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::OutOfMemory),
            other => panic!("expected io error, got {other:?}"),
        }
        assert_eq!(lock(&shared).state(), &DiscoveryState::Idle);
        assert!(lock(&shared).begin_scan().is_ok());
    }
}
