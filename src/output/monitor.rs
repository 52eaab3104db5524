//! Background health checks for the privileged backend
//!
//! Checks run at startup, on request, and on a slow timer while the
//! privileged backend is preferred but unhealthy. They never run on the
//! dispatch path.

use super::daemon::{DaemonProtocolClient, DaemonSettings};
use super::{BackendSelector, HealthEvent, KeyBackend, OutputDispatcher};
use crate::error::DaemonError;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Produces a ready privileged backend, or the health event explaining why not
pub trait PrivilegedConnector: Send {
    fn connect(
        &self,
        selector: &Arc<BackendSelector>,
    ) -> Result<Arc<dyn KeyBackend>, (HealthEvent, String)>;
}

/// Connects to the virtual HID daemon
#[derive(Debug, Clone)]
pub struct DaemonConnector {
    settings: DaemonSettings,
}

impl DaemonConnector {
    pub fn new(settings: DaemonSettings) -> Self {
        Self { settings }
    }
}

impl PrivilegedConnector for DaemonConnector {
    fn connect(
        &self,
        selector: &Arc<BackendSelector>,
    ) -> Result<Arc<dyn KeyBackend>, (HealthEvent, String)> {
        let client = DaemonProtocolClient::connect(&self.settings, Some(Arc::clone(selector)))
            .map_err(|err| {
                let event = match &err {
                    DaemonError::MissingServerDirectory(_) => HealthEvent::NotInstalled,
                    DaemonError::NoServerSocket(_) => HealthEvent::ServerUnreachable,
                    DaemonError::Bind { .. } => HealthEvent::ConnectFailed,
                    DaemonError::PermissionDenied(_) => HealthEvent::PermissionDenied,
                    DaemonError::Handshake(_) => HealthEvent::HandshakeFailed,
                };
                (event, err.to_string())
            })?;

        client.initialize().map_err(|err| {
            let event = HealthEvent::for_error(&err);
            (event, DaemonError::Handshake(err).to_string())
        })?;

        if !client.wait_ready(self.settings.ready_timeout) {
            let status = client.driver_status();
            let message = if status.driver_version_mismatched {
                "daemon protocol version mismatch".to_string()
            } else if !status.driver_connected {
                "virtual keyboard driver is not connected".to_string()
            } else {
                "virtual keyboard did not become ready".to_string()
            };
            return Err((HealthEvent::HandshakeFailed, message));
        }

        Ok(Arc::new(client))
    }
}

enum MonitorCommand {
    Check,
    Stop,
}

/// Owns the health-check thread
pub struct HealthMonitor {
    commands: Sender<MonitorCommand>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn<C>(
        dispatcher: Arc<OutputDispatcher>,
        connector: C,
        interval: Duration,
    ) -> io::Result<Self>
    where
        C: PrivilegedConnector + 'static,
    {
        let (commands, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("backend-health".into())
            .spawn(move || {
                run_check(&dispatcher, &connector);
                loop {
                    match rx.recv_timeout(interval) {
                        Ok(MonitorCommand::Check) => run_check(&dispatcher, &connector),
                        Ok(MonitorCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            if dispatcher.selector().wants_check() {
                                run_check(&dispatcher, &connector);
                            }
                        }
                    }
                }
            })?;
        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    /// Queue a check (user action)
    pub fn request_check(&self) {
        let _ = self.commands.send(MonitorCommand::Check);
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(MonitorCommand::Stop);
            let _ = handle.join();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One health check: connect, then install the backend or record the failure
fn run_check<C>(dispatcher: &OutputDispatcher, connector: &C)
where
    C: PrivilegedConnector + ?Sized,
{
    let selector = dispatcher.selector();
    selector.apply(HealthEvent::CheckStarted, None);
    match connector.connect(selector) {
        Ok(backend) => {
            dispatcher.install_privileged(backend);
            selector.apply(HealthEvent::CheckPassed, None);
        }
        Err((event, message)) => {
            log::debug!("privileged backend check failed: {}", message);
            dispatcher.remove_privileged();
            selector.apply(event, Some(message));
        }
    }
}
