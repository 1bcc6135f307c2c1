//! CLI argument parsing

use crate::port;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a byte count (hex or decimal); zero is rejected
fn parse_length(s: &str) -> Result<u32, String> {
    match parse_hex_u32(s)? {
        0 => Err("Length must be at least 1 byte".to_string()),
        n => Ok(n),
    }
}

/// Generate dynamic help text for the port argument
fn port_help() -> String {
    format!(
        "Programmer connection: a serial device, dev=<path>[:baud] or ip=<host>:<port> [also: {}]",
        port::port_names_short()
    )
}

#[derive(Parser)]
#[command(name = "wincflash")]
#[command(author, version, about = "WINC module firmware flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Serial baud rate (overrides any rate given in the connection string)
    #[arg(long, global = true)]
    pub baud: Option<u32>,

    /// Per-read timeout in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Erase, write and verify a firmware image
    Flash {
        /// Programmer connection
        #[arg(short, long, help = port_help())]
        port: String,

        /// Firmware image file
        #[arg(short, long)]
        input: PathBuf,

        /// Flash address of the first image byte (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0x0")]
        address: u32,

        /// Check the programmer version before flashing
        #[arg(long)]
        handshake: bool,
    },

    /// Read flash contents to file
    Read {
        /// Programmer connection
        #[arg(short, long, help = port_help())]
        port: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_length)]
        length: u32,
    },

    /// Erase a flash region
    Erase {
        /// Programmer connection
        #[arg(short, long, help = port_help())]
        port: String,

        /// Start address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Length of region to erase (hex or decimal)
        #[arg(short, long, value_parser = parse_length)]
        length: u32,
    },

    /// Check that the programmer speaks a supported protocol version
    Hello {
        /// Programmer connection
        #[arg(short, long, help = port_help())]
        port: String,
    },

    /// Show programmer information
    Info {
        /// Programmer connection
        #[arg(short, long, help = port_help())]
        port: String,
    },

    /// Look up a board's firmware in a module firmware index
    Firmware {
        /// Path to module_firmware_index.json
        #[arg(long)]
        index: PathBuf,

        /// Fully qualified board name (e.g. arduino:samd:mkr1000)
        #[arg(long)]
        fqbn: String,

        /// Firmware version (defaults to the latest listed)
        #[arg(long)]
        version: Option<String>,

        /// Skip signature verification and trust the index as-is
        #[arg(long)]
        no_verify: bool,
    },

    /// List supported connection kinds
    ListPorts,
}
