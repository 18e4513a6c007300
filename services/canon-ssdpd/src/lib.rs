//! canon-ssdp daemon library
//!
//! Watches the local network for SSDP announcements and, when a configured
//! device appears, runs that device's command with the device's host
//! substituted for `$HOSTNAME`. At most one command runs per device at a time.
//!
//! ## Architecture
//!
//! ```text
//! DiscoveryListener ──Announcement──▶ ActionDispatcher ──spawn──▶ ProcessSupervisor
//!                                          ▲                          │
//!                                          └────────Completion────────┘
//! SelfAdvertiser (independent: description over HTTP + ssdp:alive)
//! ```
//!
//! ## Modules
//!
//! - `registry`: configured devices and their busy state
//! - `template`: command tokenizing and `$HOSTNAME` substitution
//! - `supervisor`: process launching and completion reporting
//! - `dispatcher`: the control loop
//! - `discovery`: SSDP browsing
//! - `description`, `advertiser`: this daemon's own UPnP presence

pub mod advertiser;
pub mod cli;
pub mod config;
pub mod description;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod net;
pub mod registry;
pub mod supervisor;
pub mod template;

pub use dispatcher::{ActionDispatcher, Announcement, Dispatch};
pub use error::{DescriptionError, DispatchError, RegistryError, SpawnError};
pub use registry::{Device, DeviceRegistry};
pub use supervisor::{CommandLauncher, Completion, Launcher, MockLauncher, ProcessSupervisor};
