//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

/// Run commands when known devices announce themselves over SSDP.
#[derive(Debug, Clone, Parser)]
#[command(name = "canon-ssdp", version, about)]
pub struct Cli {
    /// Network interface to listen on (default: first non-loopback IPv4 interface).
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Device configuration file.
    #[arg(short, long, default_value = "canon-ssdp.conf")]
    pub config: PathBuf,
}
