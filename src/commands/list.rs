//! List command implementation

use crate::port;

/// List all supported connection kinds
pub fn list_ports() {
    println!("Supported connections:");
    println!();
    for p in port::available_ports() {
        println!("  {:20} - {}", p.name, p.description);
    }
}
