//! Command templating.
//!
//! A command template is a shell-style command line. After splitting it into
//! words, the first `$HOSTNAME` in each word is replaced by the host of the
//! announcing device. Later occurrences within the same word are kept as-is.

use url::{Host, Url};

use crate::error::DispatchError;

/// Placeholder replaced by the discovered host.
pub const HOST_PLACEHOLDER: &str = "$HOSTNAME";

/// Split a command line into words using POSIX shell quoting rules.
pub fn tokenize(command: &str) -> Result<Vec<String>, DispatchError> {
    let words = shell_words::split(command)?;
    if words.is_empty() {
        return Err(DispatchError::EmptyCommand);
    }
    Ok(words)
}

/// Replace the first occurrence of `placeholder` in `word` with `value`.
pub fn substitute_first(word: &str, placeholder: &str, value: &str) -> String {
    match word.split_once(placeholder) {
        Some((before, after)) => format!("{before}{value}{after}"),
        None => word.to_string(),
    }
}

/// Tokenize `command` and substitute `host` into each word.
pub fn render(command: &str, host: &str) -> Result<Vec<String>, DispatchError> {
    Ok(tokenize(command)?
        .iter()
        .map(|word| substitute_first(word, HOST_PLACEHOLDER, host))
        .collect())
}

/// Extract the host from an announced location URL.
///
/// IPv6 literals are returned without brackets.
pub fn host_from_location(location: &str) -> Result<String, DispatchError> {
    let invalid = || DispatchError::InvalidLocation(location.to_string());
    let url = Url::parse(location).map_err(|_| invalid())?;
    match url.host() {
        Some(Host::Domain("")) | None => Err(invalid()),
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(addr)) => Ok(addr.to_string()),
        Some(Host::Ipv6(addr)) => Ok(addr.to_string()),
    }
}
