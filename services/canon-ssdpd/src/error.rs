//! Error types for the daemon.
//!
//! Registry and description errors are fatal at startup. Dispatch and spawn
//! errors abandon a single dispatch and never stop the control loop.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Device configuration could not be loaded.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Config file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not a valid key file.
    #[error("cannot parse device configuration: {0}")]
    Parse(#[from] ini::ParseError),
}

impl RegistryError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            RegistryError::Read { .. } => "config_read_failed",
            RegistryError::Parse(_) => "config_parse_failed",
        }
    }
}

/// A process could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Nothing to execute.
    #[error("empty argument vector")]
    EmptyArgv,

    /// Log file could not be opened for appending.
    #[error("cannot open log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Process creation failed.
    #[error("cannot execute {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A single dispatch was abandoned.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Announcement carried no location.
    #[error("announcement has no location")]
    NoLocation,

    /// Location has no usable host.
    #[error("no host in location {0:?}")]
    InvalidLocation(String),

    /// Command line could not be split into words.
    #[error("cannot parse command: {0}")]
    Tokenize(#[from] shell_words::ParseError),

    /// Command line contains no words.
    #[error("command is empty")]
    EmptyCommand,

    /// Process could not be started.
    #[error("cannot spawn command: {0}")]
    Spawn(#[from] SpawnError),
}

impl DispatchError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            DispatchError::NoLocation => "no_location",
            DispatchError::InvalidLocation(_) => "invalid_location",
            DispatchError::Tokenize(_) => "command_parse_failed",
            DispatchError::EmptyCommand => "command_empty",
            DispatchError::Spawn(_) => "spawn_failed",
        }
    }
}

/// Device description document could not be produced or read.
#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("cannot determine hostname: {0}")]
    Hostname(#[from] nix::Error),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Existing document has no `<UDN>uuid:...</UDN>` element.
    #[error("{0} has no UDN element")]
    MissingUdn(PathBuf),
}
