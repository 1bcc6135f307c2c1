//! wincflash-index - Module firmware catalog
//!
//! Loads the JSON catalog listing, per board, the firmware versions that
//! can be flashed onto its network module, and answers lookups on it.
//!
//! Whether the catalog can be trusted is decided by checking a detached
//! signature (`<index>.sig`). The check itself is delegated to a
//! [`SignatureVerifier`]; this crate only records the outcome.

pub mod error;
pub mod index;
pub mod version;

pub use error::{IndexError, Result};
pub use index::{
    Index, IndexBoard, IndexFirmware, IndexLoaderSketch, SignatureVerifier, UploaderCommand,
};
pub use version::RelaxedVersion;
