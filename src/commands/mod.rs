//! CLI command implementations
//!
//! Device commands (flash, read, erase, hello, info) open a programmer
//! session through [`crate::port`]; `firmware` only consults the catalog.

mod device;
mod firmware;
mod list;
mod progress;

pub use device::{run_erase, run_flash, run_hello, run_info, run_read, PortOptions};
pub use firmware::run_firmware;
pub use list::list_ports;
