//! wincflash - Firmware flasher for WINC Wi-Fi modules
//!
//! Talks to a programmer sketch running on the host board, which relays
//! erase, write and read requests to the flash of the attached WINC module.
//!
//! # Architecture
//!
//! - **wincflash-core** - wire protocol, transports, programmer session and
//!   the erase/write/verify sequence
//! - **wincflash-dummy** - in-memory emulated programmer (`--port dummy`)
//! - **wincflash-index** - module firmware catalog lookups

mod cli;
mod commands;
mod port;

use clap::Parser;
use cli::{Cli, Commands};
use commands::PortOptions;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let timeout = Duration::from_millis(cli.timeout_ms);
    let baud = cli.baud;
    let opts = |port| PortOptions::new(port, baud, timeout);

    match &cli.command {
        Commands::Flash {
            port,
            input,
            address,
            handshake,
        } => commands::run_flash(&opts(port), input, *address, *handshake),
        Commands::Read {
            port,
            output,
            address,
            length,
        } => commands::run_read(&opts(port), output, *address, *length),
        Commands::Erase {
            port,
            address,
            length,
        } => commands::run_erase(&opts(port), *address, *length),
        Commands::Hello { port } => commands::run_hello(&opts(port)),
        Commands::Info { port } => commands::run_info(&opts(port)),
        Commands::Firmware {
            index,
            fqbn,
            version,
            no_verify,
        } => commands::run_firmware(index, fqbn, version.as_deref(), *no_verify),
        Commands::ListPorts => {
            commands::list_ports();
            Ok(())
        }
    }
}
