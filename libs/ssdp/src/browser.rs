//! Resource browser.
//!
//! Tracks which resources matching a search target are currently present on
//! the network. A resource is reported once when it first appears and again
//! only after it has left (byebye) or expired. Periodic re-announcements of a
//! present resource refresh its expiry silently.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::message::{NotifySubtype, SsdpMessage};
use crate::{DEFAULT_MAX_AGE, SSDP_ALL};

/// A resource that has just become available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAvailable {
    pub usn: String,
    pub locations: Vec<String>,
}

/// Presence cache keyed by USN.
#[derive(Debug)]
pub struct ResourceBrowser {
    target: String,
    /// USN -> expiry deadline.
    resources: HashMap<String, Instant>,
}

impl ResourceBrowser {
    /// Create a browser for `target` (`ssdp:all` matches every resource).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            resources: HashMap::new(),
        }
    }

    /// The search target this browser filters on.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of resources currently considered present.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn matches(&self, resource_type: &str) -> bool {
        self.target == SSDP_ALL || self.target == resource_type
    }

    /// Feed one parsed datagram received at `now`.
    pub fn handle(&mut self, msg: &SsdpMessage, now: Instant) -> Option<ResourceAvailable> {
        match msg {
            SsdpMessage::Notify(notify) => match notify.subtype {
                NotifySubtype::Alive => self.observe(
                    &notify.nt,
                    &notify.usn,
                    &notify.locations,
                    notify.max_age,
                    now,
                ),
                NotifySubtype::Update => {
                    if self.matches(&notify.nt) && self.is_present(&notify.usn, now) {
                        self.refresh(&notify.usn, notify.max_age, now);
                    }
                    None
                }
                NotifySubtype::ByeBye => {
                    self.resources.remove(&notify.usn);
                    None
                }
            },
            SsdpMessage::SearchResponse(response) => self.observe(
                &response.st,
                &response.usn,
                &response.locations,
                response.max_age,
                now,
            ),
            SsdpMessage::Search(_) => None,
        }
    }

    /// Drop resources whose lifetime has elapsed. Returns how many were dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.resources.len();
        self.resources.retain(|_, deadline| *deadline > now);
        before - self.resources.len()
    }

    fn is_present(&self, usn: &str, now: Instant) -> bool {
        self.resources
            .get(usn)
            .is_some_and(|deadline| *deadline > now)
    }

    fn refresh(&mut self, usn: &str, max_age: Option<u32>, now: Instant) {
        let lifetime = Duration::from_secs(u64::from(max_age.unwrap_or(DEFAULT_MAX_AGE)));
        self.resources.insert(usn.to_string(), now + lifetime);
    }

    fn observe(
        &mut self,
        resource_type: &str,
        usn: &str,
        locations: &[String],
        max_age: Option<u32>,
        now: Instant,
    ) -> Option<ResourceAvailable> {
        if !self.matches(resource_type) || locations.is_empty() {
            return None;
        }

        let was_present = self.is_present(usn, now);
        self.refresh(usn, max_age, now);
        if was_present {
            return None;
        }

        Some(ResourceAvailable {
            usn: usn.to_string(),
            locations: locations.to_vec(),
        })
    }
}
