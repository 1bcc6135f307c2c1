//! Firmware catalog lookup command

use std::path::Path;
use wincflash_index::{Index, SignatureVerifier};

/// Verifier used when no index signing key is configured
///
/// Every check fails, so a signed index still loads but stays untrusted.
struct NoKeyVerifier;

impl SignatureVerifier for NoKeyVerifier {
    fn verify(
        &self,
        _data: &[u8],
        _signature: &[u8],
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Err("no public key configured for index signatures".into())
    }
}

/// Run the firmware command
pub fn run_firmware(
    index_path: &Path,
    fqbn: &str,
    version: Option<&str>,
    no_verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = if no_verify {
        Index::load_unsigned(index_path)?
    } else {
        Index::load(index_path, &NoKeyVerifier)?
    };

    if !index.is_trusted() {
        log::warn!(
            "Firmware index {} is not trusted; check the URLs before using them",
            index_path.display()
        );
    }

    let board = index
        .board(fqbn)
        .ok_or_else(|| format!("Board {} not found in {}", fqbn, index_path.display()))?;

    let firmware_url = match version {
        Some(v) => index.firmware_url(fqbn, v)?,
        None => index.latest_firmware_url(fqbn)?,
    };

    println!("Board:         {} ({})", board.name, board.fqbn);
    println!("Module:        {}", board.module);
    println!("Firmware:      {}", firmware_url);
    println!("Loader sketch: {}", index.loader_sketch_url(fqbn)?);
    println!(
        "Uploader:      {}",
        board.uploader_command(std::env::consts::OS)
    );
    Ok(())
}
