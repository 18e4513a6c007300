//! UPnP device description for this daemon.
//!
//! The document is written once, with the local hostname as friendly name
//! and a random UUID as UDN. Later runs reuse the file verbatim, which is
//! what keeps the UDN stable across restarts.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::error::DescriptionError;

/// HTTP path the description is served under.
pub const DESCRIPTION_HTTP_PATH: &str = "/canon-ssdp.xml";

/// UPnP device type we announce as.
pub const DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:Basic:1";

/// A loaded description document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub document: String,
    /// Unique device name, `uuid:...`.
    pub udn: String,
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Render a description document.
pub fn render(friendly_name: &str, uuid: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <root xmlns=\"urn:schemas-upnp-org:device-1-0\">\n\
         <specVersion>\n\
         \x20   <major>1</major>\n\
         \x20   <minor>0</minor>\n\
         </specVersion>\n\
         <device>\n\
         \x20   <deviceType>{DEVICE_TYPE}</deviceType>\n\
         \x20   <friendlyName>{}</friendlyName>\n\
         \x20   <manufacturer>GPL</manufacturer>\n\
         \x20   <modelName>Canon PTP Endpoint</modelName>\n\
         \x20   <UDN>uuid:{}</UDN>\n\
         </device>\n\
         </root>\n",
        escape_xml(friendly_name),
        escape_xml(uuid),
    )
}

/// Pull the UDN out of a document.
fn extract_udn(document: &str) -> Option<String> {
    let start = document.find("<UDN>")? + "<UDN>".len();
    let len = document[start..].find("</UDN>")?;
    let udn = document[start..start + len].trim();
    udn.starts_with("uuid:").then(|| udn.to_string())
}

/// Local hostname.
pub fn local_hostname() -> Result<String, DescriptionError> {
    Ok(nix::unistd::gethostname()?.to_string_lossy().into_owned())
}

/// Write a fresh document to `path`. Fails if the file already exists.
pub fn create(path: &Path, friendly_name: &str, uuid: &str) -> Result<(), DescriptionError> {
    let io_err = |source| DescriptionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(render(friendly_name, uuid).as_bytes())
        .map_err(io_err)
}

/// Read an existing document.
pub fn load(path: &Path) -> Result<DeviceDescription, DescriptionError> {
    let document = std::fs::read_to_string(path).map_err(|source| DescriptionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let udn = extract_udn(&document).ok_or_else(|| DescriptionError::MissingUdn(path.to_path_buf()))?;
    Ok(DeviceDescription { document, udn })
}

/// Create the document if absent, then load it.
pub fn ensure(path: &Path) -> Result<DeviceDescription, DescriptionError> {
    if !path.exists() {
        let hostname = local_hostname()?;
        let uuid = Uuid::new_v4().to_string();
        match create(path, &hostname, &uuid) {
            Ok(()) => info!(path = %path.display(), uuid = %uuid, "Created device description"),
            Err(DescriptionError::Io { source, .. })
                if source.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    load(path)
}

async fn description_handler(State(document): State<Arc<str>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")],
        document.to_string(),
    )
}

/// Serve the document over HTTP until shutdown.
pub async fn serve(
    listener: TcpListener,
    document: Arc<str>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let app = Router::new()
        .route(DESCRIPTION_HTTP_PATH, get(description_handler))
        .with_state(document);

    info!(addr = ?listener.local_addr().ok(), "Serving device description");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
}
