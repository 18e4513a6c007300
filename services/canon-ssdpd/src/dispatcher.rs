//! Discovery-event dispatch.
//!
//! The dispatcher owns the device registry and the process supervisor and
//! runs the daemon's single control loop. Announcements and process
//! completions are handled one at a time, so the per-device busy flag needs
//! no locking:
//!
//! ```text
//! Announcement(id, locations)
//!   -> unknown id?        ignore
//!   -> device busy?       ignore
//!   -> host + argv        (abort dispatch on error)
//!   -> busy = true, spawn (busy = false again if spawn fails)
//! Completion(id)
//!   -> busy = false
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::error::DispatchError;
use crate::registry::{Device, DeviceRegistry};
use crate::supervisor::{Completion, Launcher, ProcessSupervisor};
use crate::template;

/// Log file created inside each device's working directory.
pub const LOG_FILE_NAME: &str = "logfile";

/// A device observed as present on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub device_id: String,
    pub locations: Vec<String>,
}

/// Outcome of one announcement.
#[derive(Debug)]
pub enum Dispatch {
    /// Device is not configured.
    Unknown,
    /// An action for the device is still running.
    Busy,
    /// Action process started.
    Spawned { pid: Option<u32> },
    /// Dispatch abandoned; the device stays idle.
    Failed(DispatchError),
}

/// Maps announcements to action processes, one at a time per device.
pub struct ActionDispatcher {
    registry: DeviceRegistry,
    supervisor: ProcessSupervisor,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl ActionDispatcher {
    pub fn new(registry: DeviceRegistry, launcher: Arc<dyn Launcher>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry,
            supervisor: ProcessSupervisor::new(launcher, tx),
            completions: rx,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Handle one presence announcement.
    pub fn on_device_announced(&mut self, device_id: &str, locations: &[String]) -> Dispatch {
        let Some(device) = self.registry.lookup_mut(device_id) else {
            trace!(device_id = %device_id, "Ignoring unconfigured device");
            return Dispatch::Unknown;
        };

        if device.is_busy() {
            debug!(device_id = %device_id, "Action still running, ignoring announcement");
            return Dispatch::Busy;
        }

        let argv = match prepare_argv(device, locations) {
            Ok(argv) => argv,
            Err(e) => {
                warn!(
                    device_id = %device_id,
                    reason = e.reason_code(),
                    error = %e,
                    "Dispatch abandoned"
                );
                return Dispatch::Failed(e);
            }
        };

        device.set_busy(true);
        let log_path = device.working_directory.join(LOG_FILE_NAME);
        match self
            .supervisor
            .spawn(&device.id, &device.working_directory, &argv, &log_path)
        {
            Ok(pid) => Dispatch::Spawned { pid },
            Err(e) => {
                device.set_busy(false);
                let e = DispatchError::from(e);
                warn!(
                    device_id = %device_id,
                    reason = e.reason_code(),
                    error = %e,
                    "Dispatch abandoned"
                );
                Dispatch::Failed(e)
            }
        }
    }

    /// Handle a process completion. Clears the busy flag whatever the exit
    /// status. Returns false if the device was not busy.
    pub fn on_process_exited(&mut self, completion: Completion) -> bool {
        match self.registry.lookup_mut(&completion.device_id) {
            Some(device) if device.is_busy() => {
                device.set_busy(false);
                debug!(device_id = %completion.device_id, pid = ?completion.pid, "Device idle");
                true
            }
            _ => {
                warn!(
                    device_id = %completion.device_id,
                    pid = ?completion.pid,
                    "Completion for a device with no running action"
                );
                false
            }
        }
    }

    /// Wait for the next process completion without handling it.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completions.recv().await
    }

    /// Run the control loop until shutdown or until the announcement channel
    /// closes.
    pub async fn run(
        &mut self,
        mut announcements: mpsc::Receiver<Announcement>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(devices = self.registry.len(), "Dispatcher started");

        loop {
            tokio::select! {
                announcement = announcements.recv() => {
                    let Some(announcement) = announcement else {
                        info!("Announcement channel closed");
                        break;
                    };
                    self.on_device_announced(&announcement.device_id, &announcement.locations);
                }
                Some(completion) = self.completions.recv() => {
                    self.on_process_exited(completion);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Host extraction and templating for one dispatch.
fn prepare_argv(device: &Device, locations: &[String]) -> Result<Vec<String>, DispatchError> {
    let location = locations.first().ok_or(DispatchError::NoLocation)?;
    let host = template::host_from_location(location)?;
    template::render(&device.command_template, &host)
}
