//! SSDP datagram parsing and building.
//!
//! SSDP messages are HTTP/1.1 style header blocks carried in UDP datagrams:
//!
//! ```text
//! NOTIFY * HTTP/1.1
//! HOST: 239.255.255.250:1900
//! CACHE-CONTROL: max-age=1800
//! LOCATION: http://10.0.0.5:80/desc.xml
//! NT: upnp:rootdevice
//! NTS: ssdp:alive
//! USN: uuid:...::upnp:rootdevice
//! ```
//!
//! Header names are matched case-insensitively. Bodies are ignored.

use chrono::Utc;

use crate::error::SsdpError;
use crate::{MULTICAST_ADDR, SSDP_PORT};

/// `NTS` value of a `NOTIFY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifySubtype {
    Alive,
    ByeBye,
    Update,
}

impl NotifySubtype {
    fn parse(value: &str) -> Result<Self, SsdpError> {
        match value {
            "ssdp:alive" => Ok(Self::Alive),
            "ssdp:byebye" => Ok(Self::ByeBye),
            "ssdp:update" => Ok(Self::Update),
            other => Err(SsdpError::InvalidHeader {
                name: "NTS",
                value: other.to_string(),
            }),
        }
    }
}

/// A multicast `NOTIFY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    pub subtype: NotifySubtype,
    pub nt: String,
    pub usn: String,
    /// `LOCATION` followed by any `AL` alternates, in announcement order.
    pub locations: Vec<String>,
    pub max_age: Option<u32>,
}

/// A unicast reply to an `M-SEARCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub st: String,
    pub usn: String,
    pub locations: Vec<String>,
    pub max_age: Option<u32>,
}

/// An `M-SEARCH` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub st: String,
    /// Maximum response delay in seconds. Unicast searches may omit it.
    pub mx: u32,
}

/// A parsed SSDP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpMessage {
    Notify(Notify),
    SearchResponse(SearchResponse),
    Search(SearchRequest),
}

struct Headers<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> Headers<'a> {
    fn get(&self, name: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }

    fn require(&self, name: &'static str) -> Result<&'a str, SsdpError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(SsdpError::MissingHeader(name)),
        }
    }

    fn locations(&self) -> Vec<String> {
        let mut locations = Vec::new();
        if let Some(location) = self.get("LOCATION").filter(|l| !l.is_empty()) {
            locations.push(location.to_string());
        }
        if let Some(alternates) = self.get("AL") {
            locations.extend(parse_alternate_locations(alternates));
        }
        locations
    }

    fn max_age(&self) -> Option<u32> {
        self.get("CACHE-CONTROL").and_then(parse_max_age)
    }
}

impl SsdpMessage {
    /// Parse a datagram.
    pub fn parse(datagram: &[u8]) -> Result<Self, SsdpError> {
        let text = std::str::from_utf8(datagram).map_err(|_| SsdpError::NotUtf8)?;
        let head = match text.find("\r\n\r\n") {
            Some(end) => &text[..end],
            None => text,
        };

        let mut lines = head.lines().map(|line| line.trim_end_matches('\r'));
        let start_line = lines
            .by_ref()
            .find(|line| !line.trim().is_empty())
            .ok_or(SsdpError::Empty)?;

        let mut entries = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| SsdpError::MalformedHeader(line.to_string()))?;
            entries.push((name.trim(), value.trim()));
        }
        let headers = Headers { entries };

        let mut parts = start_line.split_whitespace();
        let first = parts
            .next()
            .ok_or_else(|| SsdpError::MalformedStartLine(start_line.to_string()))?;

        if first.starts_with("HTTP/") {
            let status = parts
                .next()
                .ok_or_else(|| SsdpError::MalformedStartLine(start_line.to_string()))?;
            if status != "200" {
                return Err(SsdpError::UnexpectedStatus(status.to_string()));
            }
            return Ok(SsdpMessage::SearchResponse(SearchResponse {
                st: headers.require("ST")?.to_string(),
                usn: headers.require("USN")?.to_string(),
                locations: headers.locations(),
                max_age: headers.max_age(),
            }));
        }

        match first.to_ascii_uppercase().as_str() {
            "NOTIFY" => Ok(SsdpMessage::Notify(Notify {
                subtype: NotifySubtype::parse(headers.require("NTS")?)?,
                nt: headers.require("NT")?.to_string(),
                usn: headers.require("USN")?.to_string(),
                locations: headers.locations(),
                max_age: headers.max_age(),
            })),
            "M-SEARCH" => {
                let man = headers.require("MAN")?;
                if man.trim_matches('"') != "ssdp:discover" {
                    return Err(SsdpError::InvalidHeader {
                        name: "MAN",
                        value: man.to_string(),
                    });
                }
                let mx = match headers.get("MX") {
                    Some(value) => value.parse().map_err(|_| SsdpError::InvalidHeader {
                        name: "MX",
                        value: value.to_string(),
                    })?,
                    None => 0,
                };
                Ok(SsdpMessage::Search(SearchRequest {
                    st: headers.require("ST")?.to_string(),
                    mx,
                }))
            }
            other => Err(SsdpError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Parse an `AL` header: `<url1><url2>...`.
fn parse_alternate_locations(value: &str) -> Vec<String> {
    value
        .split('<')
        .filter_map(|segment| segment.split_once('>'))
        .map(|(url, _)| url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract `max-age` from a `CACHE-CONTROL` value.
fn parse_max_age(value: &str) -> Option<u32> {
    value.split(',').find_map(|directive| {
        let (name, age) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            age.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

/// Fields shared by `ssdp:alive` notifications and search responses.
#[derive(Debug, Clone, Copy)]
pub struct Advertisement<'a> {
    /// Notification type (`NT`), or search target (`ST`) in a response.
    pub target: &'a str,
    pub usn: &'a str,
    pub location: &'a str,
    pub server: &'a str,
    pub max_age: u32,
}

/// Build an `M-SEARCH` for `st`.
pub fn search_request(st: &str, mx: u32, user_agent: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {MULTICAST_ADDR}:{SSDP_PORT}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {st}\r\n\
         USER-AGENT: {user_agent}\r\n\
         \r\n"
    )
}

/// Build an `ssdp:alive` notification.
pub fn notify_alive(ad: &Advertisement<'_>) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {MULTICAST_ADDR}:{SSDP_PORT}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         USN: {}\r\n\
         \r\n",
        ad.max_age, ad.location, ad.server, ad.target, ad.usn
    )
}

/// Build an `ssdp:byebye` notification.
pub fn notify_byebye(nt: &str, usn: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {MULTICAST_ADDR}:{SSDP_PORT}\r\n\
         NT: {nt}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {usn}\r\n\
         \r\n"
    )
}

/// Build a unicast reply to an `M-SEARCH`.
pub fn search_response(ad: &Advertisement<'_>) -> String {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         DATE: {date}\r\n\
         EXT:\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         \r\n",
        ad.max_age, ad.location, ad.server, ad.target, ad.usn
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CAMERA_ALIVE: &str = "NOTIFY * HTTP/1.1\r\n\
        Host: 239.255.255.250:1900\r\n\
        Cache-Control: max-age=1800\r\n\
        Location: http://192.168.1.5:49152/upnp/CameraDevDesc.xml\r\n\
        NT: upnp:rootdevice\r\n\
        NTS: ssdp:alive\r\n\
        Server: Camera OS/1.0 UPnP/1.0 Canon Device Discovery/1.0\r\n\
        USN: uuid:00000000-0000-0000-0001-60128B7C1234::upnp:rootdevice\r\n\
        \r\n";

    #[test]
    fn test_parse_notify_alive() {
        let msg = SsdpMessage::parse(CAMERA_ALIVE.as_bytes()).unwrap();
        let SsdpMessage::Notify(notify) = msg else {
            panic!("expected notify");
        };
        assert_eq!(notify.subtype, NotifySubtype::Alive);
        assert_eq!(notify.nt, "upnp:rootdevice");
        assert_eq!(
            notify.usn,
            "uuid:00000000-0000-0000-0001-60128B7C1234::upnp:rootdevice"
        );
        assert_eq!(
            notify.locations,
            vec!["http://192.168.1.5:49152/upnp/CameraDevDesc.xml".to_string()]
        );
        assert_eq!(notify.max_age, Some(1800));
    }

    #[test]
    fn test_parse_notify_byebye_without_location() {
        let datagram = "NOTIFY * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            NT: upnp:rootdevice\r\n\
            NTS: ssdp:byebye\r\n\
            USN: uuid:abc::upnp:rootdevice\r\n\r\n";

        let SsdpMessage::Notify(notify) = SsdpMessage::parse(datagram.as_bytes()).unwrap() else {
            panic!("expected notify");
        };
        assert_eq!(notify.subtype, NotifySubtype::ByeBye);
        assert!(notify.locations.is_empty());
        assert_eq!(notify.max_age, None);
    }

    #[test]
    fn test_parse_alternate_locations_follow_location() {
        let datagram = "NOTIFY * HTTP/1.1\r\n\
            LOCATION: http://10.0.0.5/a.xml\r\n\
            AL: <http://10.0.0.6/b.xml><http://[fe80::1]/c.xml>\r\n\
            NT: upnp:rootdevice\r\n\
            NTS: ssdp:alive\r\n\
            USN: uuid:abc\r\n\r\n";

        let SsdpMessage::Notify(notify) = SsdpMessage::parse(datagram.as_bytes()).unwrap() else {
            panic!("expected notify");
        };
        assert_eq!(
            notify.locations,
            vec![
                "http://10.0.0.5/a.xml".to_string(),
                "http://10.0.0.6/b.xml".to_string(),
                "http://[fe80::1]/c.xml".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_search_response() {
        let datagram = "HTTP/1.1 200 OK\r\n\
            CACHE-CONTROL: no-cache, max-age=120\r\n\
            EXT:\r\n\
            LOCATION: http://10.0.0.5:80/desc.xml\r\n\
            ST: upnp:rootdevice\r\n\
            USN: uuid:dev-1::upnp:rootdevice\r\n\r\n";

        let msg = SsdpMessage::parse(datagram.as_bytes()).unwrap();
        assert_eq!(
            msg,
            SsdpMessage::SearchResponse(SearchResponse {
                st: "upnp:rootdevice".to_string(),
                usn: "uuid:dev-1::upnp:rootdevice".to_string(),
                locations: vec!["http://10.0.0.5:80/desc.xml".to_string()],
                max_age: Some(120),
            })
        );
    }

    #[test]
    fn test_parse_search_request() {
        let datagram = search_request("ssdp:all", 3, "test/1.0");
        let msg = SsdpMessage::parse(datagram.as_bytes()).unwrap();
        assert_eq!(
            msg,
            SsdpMessage::Search(SearchRequest {
                st: "ssdp:all".to_string(),
                mx: 3,
            })
        );
    }

    #[rstest]
    #[case::empty("", SsdpError::Empty)]
    #[case::wrong_status(
        "HTTP/1.1 404 Not Found\r\nST: a\r\nUSN: b\r\n\r\n",
        SsdpError::UnexpectedStatus("404".to_string())
    )]
    #[case::unknown_method(
        "SUBSCRIBE * HTTP/1.1\r\n\r\n",
        SsdpError::UnsupportedMethod("SUBSCRIBE".to_string())
    )]
    #[case::missing_usn(
        "NOTIFY * HTTP/1.1\r\nNT: a\r\nNTS: ssdp:alive\r\n\r\n",
        SsdpError::MissingHeader("USN")
    )]
    #[case::bad_man(
        "M-SEARCH * HTTP/1.1\r\nMAN: ssdp:other\r\nST: ssdp:all\r\n\r\n",
        SsdpError::InvalidHeader { name: "MAN", value: "ssdp:other".to_string() }
    )]
    #[case::header_without_colon(
        "NOTIFY * HTTP/1.1\r\ngarbage\r\n\r\n",
        SsdpError::MalformedHeader("garbage".to_string())
    )]
    fn test_parse_rejects(#[case] datagram: &str, #[case] expected: SsdpError) {
        assert_eq!(SsdpMessage::parse(datagram.as_bytes()), Err(expected));
    }

    #[test]
    fn test_parse_rejects_non_utf8() {
        assert_eq!(
            SsdpMessage::parse(&[0xff, 0xfe, 0x00]),
            Err(SsdpError::NotUtf8)
        );
    }

    #[test]
    fn test_notify_alive_parses_back() {
        let text = notify_alive(&Advertisement {
            target: "upnp:rootdevice",
            usn: "uuid:1234::upnp:rootdevice",
            location: "http://10.0.0.2:8080/canon-ssdp.xml",
            server: "Microsoft-Windows-NT/5.1 UPnP/1.0 UPnP-Device-Host/1.0",
            max_age: 1800,
        });
        assert!(text.contains("SERVER: Microsoft-Windows-NT/5.1 UPnP/1.0 UPnP-Device-Host/1.0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));

        let SsdpMessage::Notify(notify) = SsdpMessage::parse(text.as_bytes()).unwrap() else {
            panic!("expected notify");
        };
        assert_eq!(notify.usn, "uuid:1234::upnp:rootdevice");
        assert_eq!(notify.locations.len(), 1);
    }

    #[test]
    fn test_search_response_carries_date_and_ext() {
        let text = search_response(&Advertisement {
            target: "ssdp:all",
            usn: "uuid:1234",
            location: "http://10.0.0.2/d.xml",
            server: "s",
            max_age: 60,
        });
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("\r\nDATE: "));
        assert!(text.contains("\r\nEXT:\r\n"));
    }

    #[test]
    fn test_notify_byebye_has_no_location() {
        let text = notify_byebye("upnp:rootdevice", "uuid:1234::upnp:rootdevice");
        assert!(!text.contains("LOCATION"));
        assert!(text.contains("NTS: ssdp:byebye\r\n"));
    }
}
