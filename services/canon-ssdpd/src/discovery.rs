//! SSDP resource browsing.
//!
//! Listens on the multicast group for `NOTIFY`s, periodically sends an
//! `M-SEARCH` from a unicast socket and reads the replies, and forwards
//! newly available resources to the dispatcher as [`Announcement`]s.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use canon_ssdp_protocol::{multicast_destination, search_request, ResourceBrowser, SsdpMessage};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dispatcher::Announcement;
use crate::net::received_datagram;

/// `MX` sent with our searches.
const SEARCH_MX: u32 = 3;

/// How often stale resources are dropped from the browser.
const EXPIRE_INTERVAL: Duration = Duration::from_secs(30);

/// `USER-AGENT` sent with our searches.
fn user_agent() -> String {
    format!("Linux UPnP/1.0 canon-ssdp/{}", env!("CARGO_PKG_VERSION"))
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub search_target: String,
    pub search_interval: Duration,
}

/// Turns SSDP traffic into announcements.
pub struct DiscoveryListener {
    multicast: UdpSocket,
    unicast: UdpSocket,
    browser: ResourceBrowser,
    config: ListenerConfig,
}

/// Parse a datagram and feed it to `browser`.
pub fn handle_datagram(
    browser: &mut ResourceBrowser,
    datagram: &[u8],
    from: SocketAddr,
    now: Instant,
) -> Option<Announcement> {
    let message = match SsdpMessage::parse(datagram) {
        Ok(message) => message,
        Err(e) => {
            debug!(from = %from, reason = e.reason_code(), error = %e, "Ignoring datagram");
            return None;
        }
    };

    let available = browser.handle(&message, now)?;
    info!(
        device_id = %available.usn,
        location = ?available.locations.first(),
        "Resource available"
    );
    Some(Announcement {
        device_id: available.usn,
        locations: available.locations,
    })
}

impl DiscoveryListener {
    /// `multicast` must be bound to the SSDP port and joined to the group;
    /// `unicast` sends searches and receives the replies.
    pub fn new(multicast: UdpSocket, unicast: UdpSocket, config: ListenerConfig) -> Self {
        Self {
            multicast,
            unicast,
            browser: ResourceBrowser::new(config.search_target.clone()),
            config,
        }
    }

    async fn search(&self) {
        let request = search_request(self.browser.target(), SEARCH_MX, &user_agent());
        if let Err(e) = self
            .unicast
            .send_to(request.as_bytes(), multicast_destination())
            .await
        {
            warn!(error = %e, "Failed to send M-SEARCH");
        } else {
            debug!(st = %self.browser.target(), "Sent M-SEARCH");
        }
    }

    async fn forward(
        &mut self,
        datagram: &[u8],
        from: SocketAddr,
        announcements: &mpsc::Sender<Announcement>,
    ) -> bool {
        match handle_datagram(&mut self.browser, datagram, from, Instant::now()) {
            Some(announcement) => announcements.send(announcement).await.is_ok(),
            None => true,
        }
    }

    /// Browse until shutdown or until the dispatcher goes away.
    pub async fn run(
        mut self,
        announcements: mpsc::Sender<Announcement>,
        mut shutdown: watch::Receiver<bool>,
    ) -> io::Result<()> {
        info!(
            st = %self.config.search_target,
            search_interval_secs = self.config.search_interval.as_secs(),
            "Starting discovery"
        );

        let mut search = tokio::time::interval(self.config.search_interval);
        let mut expire = tokio::time::interval(EXPIRE_INTERVAL);
        let mut multicast_buf = vec![0u8; 2048];
        let mut unicast_buf = vec![0u8; 2048];

        loop {
            let delivered = tokio::select! {
                _ = search.tick() => {
                    self.search().await;
                    true
                }
                _ = expire.tick() => {
                    let dropped = self.browser.expire(Instant::now());
                    if dropped > 0 {
                        debug!(dropped, "Expired resources");
                    }
                    true
                }
                received = self.multicast.recv_from(&mut multicast_buf) => {
                    match received_datagram(received, multicast_buf.len(), "multicast") {
                        Some((len, from)) => self.forward(&multicast_buf[..len], from, &announcements).await,
                        None => true,
                    }
                }
                received = self.unicast.recv_from(&mut unicast_buf) => {
                    match received_datagram(received, unicast_buf.len(), "unicast") {
                        Some((len, from)) => self.forward(&unicast_buf[..len], from, &announcements).await,
                        None => true,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Discovery shutting down");
                        break;
                    }
                    true
                }
            };

            if !delivered {
                info!("Dispatcher closed, stopping discovery");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_ssdp_protocol::SSDP_ALL;

    fn from() -> SocketAddr {
        "10.0.0.5:1900".parse().unwrap()
    }

    const ALIVE: &str = "NOTIFY * HTTP/1.1\r\n\
        HOST: 239.255.255.250:1900\r\n\
        CACHE-CONTROL: max-age=1800\r\n\
        LOCATION: http://10.0.0.5:80/desc.xml\r\n\
        NT: upnp:rootdevice\r\n\
        NTS: ssdp:alive\r\n\
        USN: dev-1\r\n\r\n";

    #[test]
    fn test_alive_becomes_announcement_once() {
        let mut browser = ResourceBrowser::new(SSDP_ALL);
        let now = Instant::now();

        let announcement = handle_datagram(&mut browser, ALIVE.as_bytes(), from(), now).unwrap();
        assert_eq!(
            announcement,
            Announcement {
                device_id: "dev-1".to_string(),
                locations: vec!["http://10.0.0.5:80/desc.xml".to_string()],
            }
        );

        assert!(handle_datagram(&mut browser, ALIVE.as_bytes(), from(), now).is_none());
    }

    #[test]
    fn test_garbage_is_ignored() {
        let mut browser = ResourceBrowser::new(SSDP_ALL);
        assert!(handle_datagram(&mut browser, b"\x00\x01garbage", from(), Instant::now()).is_none());
        assert!(browser.is_empty());
    }

    #[test]
    fn test_search_requests_are_not_announcements() {
        let mut browser = ResourceBrowser::new(SSDP_ALL);
        let request = search_request(SSDP_ALL, 3, &user_agent());
        assert!(handle_datagram(&mut browser, request.as_bytes(), from(), Instant::now()).is_none());
    }
}
