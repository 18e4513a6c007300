//! # canon-ssdp-protocol
//!
//! SSDP (Simple Service Discovery Protocol) wire handling for canon-ssdp.
//!
//! This library is I/O free. It provides:
//! - Parsing of `NOTIFY`, `M-SEARCH` and search-response datagrams
//! - Builders for the datagrams a root device and a control point send
//! - A resource browser that turns a stream of datagrams into
//!   "resource available" events, the way a UPnP control point does
//!
//! Sockets, timers and multicast membership live in the daemon.

use std::net::{Ipv4Addr, SocketAddrV4};

mod browser;
mod error;
mod message;

pub use browser::{ResourceAvailable, ResourceBrowser};
pub use error::SsdpError;
pub use message::{
    notify_alive, notify_byebye, search_request, search_response, Advertisement, Notify,
    NotifySubtype, SearchRequest, SearchResponse, SsdpMessage,
};

/// SSDP IPv4 multicast group.
pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP UDP port.
pub const SSDP_PORT: u16 = 1900;

/// Resource lifetime used when an announcement carries no usable `CACHE-CONTROL`.
pub const DEFAULT_MAX_AGE: u32 = 1800;

/// Search target matching every resource.
pub const SSDP_ALL: &str = "ssdp:all";

/// Search target matching root devices.
pub const ROOT_DEVICE: &str = "upnp:rootdevice";

/// Multicast destination for announcements and searches.
pub fn multicast_destination() -> SocketAddrV4 {
    SocketAddrV4::new(MULTICAST_ADDR, SSDP_PORT)
}
