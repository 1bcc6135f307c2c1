//! Programmer command implementations

use super::progress::IndicatifProgress;
use crate::port::{self, Flasher};
use std::fs;
use std::path::Path;
use std::time::Duration;
use wincflash_core::{flash_image, read_image, FirmwareImage, FlashProgress};

/// Connection settings shared by every device command
pub struct PortOptions<'a> {
    pub port: &'a str,
    pub baud: Option<u32>,
    pub timeout: Duration,
}

impl<'a> PortOptions<'a> {
    pub fn new(port: &'a str, baud: Option<u32>, timeout: Duration) -> Self {
        Self {
            port,
            baud,
            timeout,
        }
    }

    fn open(&self) -> Result<Flasher, Box<dyn std::error::Error>> {
        port::open_flasher(self.port, self.baud, self.timeout)
    }
}

/// Run the flash command
pub fn run_flash(
    opts: &PortOptions<'_>,
    input: &Path,
    address: u32,
    handshake: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    // Validate before touching the device
    let image = FirmwareImage::new(address, data)?;

    let mut flasher = opts.open()?;
    if handshake {
        flasher.hello()?;
        println!("Programmer version OK");
    }
    println!("Payload size: {} bytes", flasher.payload_size());

    let mut progress = IndicatifProgress::new();
    flash_image(&mut flasher, &image, &mut progress)?;
    flasher.close()?;

    println!("Flash complete!");
    Ok(())
}

/// Run the read command
pub fn run_read(
    opts: &PortOptions<'_>,
    output: &Path,
    address: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut flasher = opts.open()?;

    let mut progress = IndicatifProgress::new();
    let data = read_image(&mut flasher, address, length as usize, &mut progress)?;
    progress.finish("Read complete");
    flasher.close()?;

    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Run the erase command
pub fn run_erase(
    opts: &PortOptions<'_>,
    address: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut flasher = opts.open()?;

    let mut progress = IndicatifProgress::new();
    progress.erasing(address, length as usize);
    flasher.erase(address, length)?;
    progress.finish("Erase complete");
    flasher.close()?;

    println!("Erased {} bytes at 0x{:08X}", length, address);
    Ok(())
}

/// Run the hello command
pub fn run_hello(opts: &PortOptions<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let mut flasher = opts.open()?;
    flasher.hello()?;
    flasher.close()?;

    println!("Programmer responded with a supported version");
    Ok(())
}

/// Run the info command
pub fn run_info(opts: &PortOptions<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let flasher = opts.open()?;

    println!("Programmer Information:");
    println!("  Port:         {}", opts.port);
    println!("  Payload size: {} bytes", flasher.payload_size());

    flasher.close()?;
    Ok(())
}
