//! SSDP presence for this daemon.
//!
//! Announces the root device, its UDN and its device type, answers matching
//! `M-SEARCH` requests, and says goodbye on shutdown. Nothing flows from
//! here to the dispatcher.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use canon_ssdp_protocol::{
    multicast_destination, notify_alive, notify_byebye, search_response, Advertisement,
    SsdpMessage, ROOT_DEVICE, SSDP_ALL,
};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::description::DEVICE_TYPE;
use crate::net::received_datagram;

/// Upper bound on the response delay requested by `MX`.
const MAX_RESPONSE_DELAY_SECS: u32 = 5;

/// A notification type together with its USN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedTarget {
    pub nt: String,
    pub usn: String,
}

/// Advertiser settings.
#[derive(Debug, Clone)]
pub struct AdvertiserConfig {
    pub server_id: String,
    pub max_age: u32,
    pub announce_interval: Duration,
}

/// Targets a basic root device with `udn` announces.
pub fn advertised_targets(udn: &str) -> Vec<AdvertisedTarget> {
    vec![
        AdvertisedTarget {
            nt: ROOT_DEVICE.to_string(),
            usn: format!("{udn}::{ROOT_DEVICE}"),
        },
        AdvertisedTarget {
            nt: udn.to_string(),
            usn: udn.to_string(),
        },
        AdvertisedTarget {
            nt: DEVICE_TYPE.to_string(),
            usn: format!("{udn}::{DEVICE_TYPE}"),
        },
    ]
}

/// Targets answering a search for `st`. Responses carry the search target
/// as `ST`, except for `ssdp:all` where each target answers as itself.
pub fn search_matches(targets: &[AdvertisedTarget], st: &str) -> Vec<AdvertisedTarget> {
    if st == SSDP_ALL {
        return targets.to_vec();
    }
    targets.iter().filter(|t| t.nt == st).cloned().collect()
}

/// Announces this daemon on the SSDP multicast group.
pub struct SelfAdvertiser {
    socket: Arc<UdpSocket>,
    targets: Vec<AdvertisedTarget>,
    location: String,
    config: AdvertiserConfig,
}

impl SelfAdvertiser {
    /// `socket` must be bound to the SSDP port and joined to the group.
    pub fn new(socket: UdpSocket, udn: &str, location: String, config: AdvertiserConfig) -> Self {
        Self {
            socket: Arc::new(socket),
            targets: advertised_targets(udn),
            location,
            config,
        }
    }

    fn advertisement<'a>(&'a self, target: &'a AdvertisedTarget) -> Advertisement<'a> {
        Advertisement {
            target: &target.nt,
            usn: &target.usn,
            location: &self.location,
            server: &self.config.server_id,
            max_age: self.config.max_age,
        }
    }

    async fn announce_alive(&self) {
        let destination = multicast_destination();
        for target in &self.targets {
            let message = notify_alive(&self.advertisement(target));
            if let Err(e) = self.socket.send_to(message.as_bytes(), destination).await {
                warn!(nt = %target.nt, error = %e, "Failed to send ssdp:alive");
            }
        }
        debug!(location = %self.location, "Sent ssdp:alive");
    }

    async fn announce_byebye(&self) {
        let destination = multicast_destination();
        for target in &self.targets {
            let message = notify_byebye(&target.nt, &target.usn);
            if let Err(e) = self.socket.send_to(message.as_bytes(), destination).await {
                warn!(nt = %target.nt, error = %e, "Failed to send ssdp:byebye");
            }
        }
        info!("Sent ssdp:byebye");
    }

    fn answer_search(&self, st: &str, mx: u32, from: SocketAddr) {
        let matches = search_matches(&self.targets, st);
        if matches.is_empty() {
            return;
        }

        let window_ms = u64::from(mx.min(MAX_RESPONSE_DELAY_SECS)) * 1000;
        let delay = Duration::from_millis(rand::rng().random_range(0..=window_ms));
        let responses: Vec<String> = matches
            .iter()
            .map(|target| search_response(&self.advertisement(target)))
            .collect();

        debug!(st = %st, from = %from, delay_ms = delay.as_millis() as u64, "Answering search");
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for response in responses {
                if let Err(e) = socket.send_to(response.as_bytes(), from).await {
                    warn!(to = %from, error = %e, "Failed to send search response");
                }
            }
        });
    }

    /// Announce, answer searches, and send byebye on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        info!(
            location = %self.location,
            server = %self.config.server_id,
            "Starting self advertisement"
        );

        let mut announce = tokio::time::interval(self.config.announce_interval);
        let mut buf = vec![0u8; 2048];

        loop {
            tokio::select! {
                _ = announce.tick() => {
                    self.announce_alive().await;
                }
                received = self.socket.recv_from(&mut buf) => {
                    let Some((len, from)) = received_datagram(received, buf.len(), "advertiser") else {
                        continue;
                    };
                    match SsdpMessage::parse(&buf[..len]) {
                        Ok(SsdpMessage::Search(search)) => self.answer_search(&search.st, search.mx, from),
                        Ok(_) => {}
                        Err(e) => debug!(from = %from, reason = e.reason_code(), "Ignoring datagram"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.announce_byebye().await;
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UDN: &str = "uuid:0f8fad5b-d9cb-469f-a165-70867728950e";

    #[test]
    fn test_advertised_targets() {
        let targets = advertised_targets(UDN);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].nt, "upnp:rootdevice");
        assert_eq!(targets[0].usn, format!("{UDN}::upnp:rootdevice"));
        assert_eq!(targets[1].usn, UDN);
        assert_eq!(
            targets[2].usn,
            format!("{UDN}::urn:schemas-upnp-org:device:Basic:1")
        );
    }

    #[test]
    fn test_search_all_matches_every_target() {
        let targets = advertised_targets(UDN);
        assert_eq!(search_matches(&targets, "ssdp:all"), targets);
    }

    #[test]
    fn test_search_specific_target() {
        let targets = advertised_targets(UDN);
        let matches = search_matches(&targets, "upnp:rootdevice");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].nt, "upnp:rootdevice");

        assert_eq!(search_matches(&targets, UDN).len(), 1);
        assert!(search_matches(&targets, "urn:schemas-upnp-org:device:MediaServer:1").is_empty());
    }
}
