//! Connection kinds and programmer session setup
//!
//! A port string is either a serial device path, an explicit
//! `dev=<path>[:baud]` / `ip=<host>:<port>` connection, or (with the `dummy`
//! feature) the word `dummy` for the in-memory emulator.

use std::time::Duration;
use wincflash_core::{Transport, WincFlasher};

/// Session over whichever transport the port string selected
pub type Flasher = WincFlasher<Box<dyn Transport + Send>>;

/// Information about a connection kind
pub struct PortInfo {
    /// Name or syntax shown to the user
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Get information about all connection kinds enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_ports() -> Vec<PortInfo> {
    let mut ports = Vec::new();

    #[cfg(feature = "serial")]
    ports.push(PortInfo {
        name: "dev=<path>[:baud]",
        description: "Serial port (a bare path such as /dev/ttyACM0 or COM3 also works)",
    });

    ports.push(PortInfo {
        name: "ip=<host>:<port>",
        description: "TCP serial bridge",
    });

    #[cfg(feature = "dummy")]
    ports.push(PortInfo {
        name: "dummy",
        description: "In-memory emulated programmer for testing",
    });

    ports
}

/// Generate a short list of the special port names for CLI help
pub fn port_names_short() -> String {
    let names: Vec<&str> = available_ports()
        .iter()
        .map(|p| p.name)
        .filter(|n| !n.contains('='))
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Open a programmer session on the given port
///
/// This negotiates the payload size but does not run the version handshake.
pub fn open_flasher(
    port: &str,
    baud: Option<u32>,
    timeout: Duration,
) -> Result<Flasher, Box<dyn std::error::Error>> {
    #[cfg(feature = "dummy")]
    if port == "dummy" {
        log::info!("Opening emulated programmer...");
        let transport: Box<dyn Transport + Send> =
            Box::new(wincflash_dummy::EmulatedWinc::new_default());
        return Ok(WincFlasher::new(transport)?);
    }

    log::info!("Opening programmer on {}...", port);
    wincflash_core::open(port, baud, timeout).map_err(|e| {
        format!(
            "Failed to open programmer on {}: {}\nMake sure the programmer sketch is running on the board.",
            port, e
        )
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_always_listed() {
        assert!(available_ports().iter().any(|p| p.name.starts_with("ip=")));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy() {
        assert!(port_names_short().contains("dummy"));
        let flasher = open_flasher("dummy", None, Duration::from_secs(1)).unwrap();
        assert_eq!(flasher.payload_size(), 4096);
    }

    #[test]
    fn test_open_rejects_bad_port() {
        let err = open_flasher("", None, Duration::from_secs(1)).err().unwrap();
        assert!(err.to_string().contains("Failed to open programmer"));
    }
}
