//! Catalog model, loading and lookups

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::{IndexError, Result};
use crate::version::RelaxedVersion;

/// Module whose firmware versions do not follow a usable ordering
const SARA_MODULE: &str = "SARA";

/// Checks a detached signature over the raw catalog bytes
///
/// Returns `Ok(true)` when the signature is valid for a trusted key and
/// `Ok(false)` when it is not. An `Err` means the check could not be made
/// at all (missing key, unreadable signature, ...).
pub trait SignatureVerifier {
    fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
    ) -> core::result::Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// A single firmware release for a board
#[derive(Debug, Clone, Deserialize)]
pub struct IndexFirmware {
    pub version: String,
    pub url: String,
    pub checksum: String,
    #[serde(deserialize_with = "number_or_string")]
    pub size: u64,
    #[serde(default)]
    pub module: String,
}

/// The sketch that turns a board into a flash programmer
#[derive(Debug, Clone, Deserialize)]
pub struct IndexLoaderSketch {
    pub url: String,
    pub checksum: String,
    #[serde(deserialize_with = "number_or_string")]
    pub size: u64,
}

/// Command used to upload the loader sketch
///
/// Older catalogs carry a single command string; newer ones carry one per
/// host OS, with `linux` as the generic fallback.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UploaderCommand {
    Generic(String),
    PerOs {
        linux: String,
        #[serde(default)]
        windows: String,
        #[serde(default)]
        macosx: String,
    },
}

impl Default for UploaderCommand {
    fn default() -> Self {
        UploaderCommand::Generic(String::new())
    }
}

/// A board entry in the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct IndexBoard {
    pub fqbn: String,
    pub name: String,
    pub module: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(rename = "firmware", default)]
    pub firmwares: Vec<IndexFirmware>,
    pub loader_sketch: IndexLoaderSketch,
    #[serde(rename = "uploader.command", default)]
    pub uploader_command: UploaderCommand,
    #[serde(
        rename = "upload.use_1200bps_touch",
        default,
        deserialize_with = "bool_or_string"
    )]
    pub upload_touch: bool,
    #[serde(
        rename = "upload.wait_for_upload_port",
        default,
        deserialize_with = "bool_or_string"
    )]
    pub upload_wait: bool,
}

impl IndexBoard {
    /// Uploader command for the given host OS (`std::env::consts::OS` names)
    ///
    /// Falls back to the Linux command when the OS has no entry of its own.
    pub fn uploader_command(&self, os: &str) -> &str {
        match &self.uploader_command {
            UploaderCommand::Generic(cmd) => cmd,
            UploaderCommand::PerOs {
                linux,
                windows,
                macosx,
            } => match os {
                "windows" if !windows.is_empty() => windows,
                "macos" | "darwin" if !macosx.is_empty() => macosx,
                _ => linux,
            },
        }
    }

    /// Firmware release with exactly this version string
    pub fn firmware(&self, version: &str) -> Option<&IndexFirmware> {
        self.firmwares.iter().find(|f| f.version == version)
    }

    /// Newest firmware release, by relaxed version ordering
    ///
    /// On equal versions the first listed entry wins.
    pub fn latest_firmware(&self) -> Option<&IndexFirmware> {
        let mut latest: Option<(RelaxedVersion, &IndexFirmware)> = None;
        for fw in &self.firmwares {
            let version = RelaxedVersion::parse(&fw.version);
            match &latest {
                Some((best, _)) if !version.is_newer_than(best) => {}
                _ => latest = Some((version, fw)),
            }
        }
        latest.map(|(_, fw)| fw)
    }
}

/// The firmware catalog
#[derive(Debug, Clone, Default)]
pub struct Index {
    boards: Vec<IndexBoard>,
    trusted: bool,
}

impl Index {
    /// Load a catalog and check its detached signature
    ///
    /// The signature is read from `<path>.sig`. If the signature cannot be
    /// read or the verifier fails, the problem is logged and the catalog is
    /// returned untrusted; only a malformed catalog is an error.
    pub fn load(path: impl AsRef<Path>, verifier: &dyn SignatureVerifier) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let boards = Self::parse_boards(&data)?;

        let sig_path = signature_path(path);
        let trusted = match std::fs::read(&sig_path) {
            Ok(signature) => match verifier.verify(&data, &signature) {
                Ok(trusted) => {
                    log::info!(
                        "Checked signature of {} against {}: trusted={}",
                        path.display(),
                        sig_path.display(),
                        trusted
                    );
                    trusted
                }
                Err(e) => {
                    log::info!(
                        "Could not check signature of {} against {}: {}",
                        path.display(),
                        sig_path.display(),
                        e
                    );
                    false
                }
            },
            Err(e) => {
                log::info!("Could not read signature {}: {}", sig_path.display(), e);
                false
            }
        };

        Ok(Self { boards, trusted })
    }

    /// Load a catalog without any signature check
    ///
    /// The caller has opted out of verification, so the catalog is marked
    /// trusted.
    pub fn load_unsigned(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(Self {
            boards: Self::parse_boards(&data)?,
            trusted: true,
        })
    }

    /// Build an untrusted catalog from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(Self {
            boards: Self::parse_boards(content.as_bytes())?,
            trusted: false,
        })
    }

    fn parse_boards(data: &[u8]) -> Result<Vec<IndexBoard>> {
        let boards: Vec<IndexBoard> = serde_json::from_slice(data)?;
        log::debug!("Loaded {} boards from firmware index", boards.len());
        Ok(boards)
    }

    /// Whether the catalog passed signature verification
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// All boards in catalog order
    pub fn boards(&self) -> &[IndexBoard] {
        &self.boards
    }

    /// Board with the given FQBN
    pub fn board(&self, fqbn: &str) -> Option<&IndexBoard> {
        self.boards.iter().find(|b| b.fqbn == fqbn)
    }

    fn require_board(&self, fqbn: &str) -> Result<&IndexBoard> {
        self.board(fqbn)
            .ok_or_else(|| IndexError::InvalidFqbn(fqbn.to_string()))
    }

    /// Network module fitted on the given board
    pub fn module(&self, fqbn: &str) -> Result<&str> {
        Ok(&self.require_board(fqbn)?.module)
    }

    /// Download URL of a specific firmware version
    pub fn firmware_url(&self, fqbn: &str, version: &str) -> Result<&str> {
        self.require_board(fqbn)?
            .firmware(version)
            .map(|f| f.url.as_str())
            .ok_or_else(|| IndexError::InvalidVersion(version.to_string()))
    }

    /// Download URL of the newest firmware for the board
    ///
    /// Not available for SARA modules, whose versions must be named
    /// explicitly.
    pub fn latest_firmware_url(&self, fqbn: &str) -> Result<&str> {
        let board = self.require_board(fqbn)?;
        if board.module == SARA_MODULE {
            return Err(IndexError::NotSupported(board.module.clone()));
        }
        board
            .latest_firmware()
            .map(|f| f.url.as_str())
            .ok_or_else(|| IndexError::NoFirmware(fqbn.to_string()))
    }

    /// Download URL of the board's loader sketch
    pub fn loader_sketch_url(&self, fqbn: &str) -> Result<&str> {
        Ok(&self.require_board(fqbn)?.loader_sketch.url)
    }
}

fn signature_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sig");
    PathBuf::from(name)
}

fn number_or_string<'de, D>(deserializer: D) -> core::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn bool_or_string<'de, D>(deserializer: D) -> core::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Text(s) => match s.trim() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected boolean, got {other:?}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "fqbn": "arduino:samd:mkr1000",
            "firmware": [
                {
                    "version": "19.5.4",
                    "url": "https://example.org/fw/mkr1000/19.5.4.bin",
                    "checksum": "SHA-256:aa",
                    "size": "412308",
                    "module": "WINC1500"
                },
                {
                    "version": "19.6.1",
                    "url": "https://example.org/fw/mkr1000/19.6.1.bin",
                    "checksum": "SHA-256:bb",
                    "size": 413644,
                    "module": "WINC1500"
                }
            ],
            "loader_sketch": {
                "url": "https://example.org/loader/mkr1000.bin",
                "checksum": "SHA-256:cc",
                "size": "10772"
            },
            "module": "WINC1500",
            "name": "Arduino MKR1000",
            "uploader": "arduino:bossac@1.7.0",
            "upload.use_1200bps_touch": "true",
            "upload.wait_for_upload_port": true,
            "uploader.command": {
                "linux": "bossac --port={serial.port} -U -e -w -R {loader.sketch}.bin",
                "windows": "bossac.exe --port={serial.port} -U -e -w -R {loader.sketch}.bin"
            }
        },
        {
            "fqbn": "arduino:samd:mkrnb1500",
            "firmware": [
                {
                    "version": "5.6A2.00-to-5.6A2.01",
                    "url": "https://example.org/fw/sara/a.bin",
                    "checksum": "SHA-256:dd",
                    "size": "1024",
                    "module": "SARA"
                }
            ],
            "loader_sketch": {
                "url": "https://example.org/loader/mkrnb1500.bin",
                "checksum": "SHA-256:ee",
                "size": "9000"
            },
            "module": "SARA",
            "name": "Arduino MKR NB 1500",
            "uploader": "arduino:bossac@1.7.0",
            "uploader.command": "bossac --port={serial.port} -U -e -w -R {loader.sketch}.bin"
        }
    ]"#;

    struct FixedVerifier(core::result::Result<bool, &'static str>);

    impl SignatureVerifier for FixedVerifier {
        fn verify(
            &self,
            _data: &[u8],
            signature: &[u8],
        ) -> core::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            assert_eq!(signature, b"sig");
            self.0.map_err(|e| e.into())
        }
    }

    fn write_catalog(dir: &Path, with_sig: bool) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("module_firmware_index.json");
        std::fs::write(&path, SAMPLE).unwrap();
        if with_sig {
            std::fs::write(signature_path(&path), b"sig").unwrap();
        }
        path
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wincflash-index-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_parse_sample() {
        let index = Index::from_json(SAMPLE).unwrap();
        assert_eq!(index.boards().len(), 2);
        assert!(!index.is_trusted());

        let board = index.board("arduino:samd:mkr1000").unwrap();
        assert_eq!(board.name, "Arduino MKR1000");
        assert_eq!(board.firmwares[0].size, 412308);
        assert_eq!(board.firmwares[1].size, 413644);
        assert_eq!(board.loader_sketch.size, 10772);
        assert!(board.upload_touch);
        assert!(board.upload_wait);

        let sara = index.board("arduino:samd:mkrnb1500").unwrap();
        assert!(!sara.upload_touch);
    }

    #[test]
    fn test_malformed_catalog() {
        assert!(matches!(
            Index::from_json("{\"not\": \"a list\"}"),
            Err(IndexError::Parse(_))
        ));
    }

    #[test]
    fn test_lookups() {
        let index = Index::from_json(SAMPLE).unwrap();
        let fqbn = "arduino:samd:mkr1000";

        assert_eq!(index.module(fqbn).unwrap(), "WINC1500");
        assert_eq!(
            index.firmware_url(fqbn, "19.5.4").unwrap(),
            "https://example.org/fw/mkr1000/19.5.4.bin"
        );
        assert_eq!(
            index.latest_firmware_url(fqbn).unwrap(),
            "https://example.org/fw/mkr1000/19.6.1.bin"
        );
        assert_eq!(
            index.loader_sketch_url(fqbn).unwrap(),
            "https://example.org/loader/mkr1000.bin"
        );
    }

    #[test]
    fn test_lookup_errors() {
        let index = Index::from_json(SAMPLE).unwrap();

        assert!(index.board("arduino:avr:uno").is_none());
        assert!(matches!(
            index.module("arduino:avr:uno"),
            Err(IndexError::InvalidFqbn(_))
        ));
        assert!(matches!(
            index.firmware_url("arduino:samd:mkr1000", "1.0.0"),
            Err(IndexError::InvalidVersion(v)) if v == "1.0.0"
        ));
        assert!(matches!(
            index.latest_firmware_url("arduino:samd:mkrnb1500"),
            Err(IndexError::NotSupported(m)) if m == "SARA"
        ));
        // Explicit versions still work for SARA
        assert!(index
            .firmware_url("arduino:samd:mkrnb1500", "5.6A2.00-to-5.6A2.01")
            .is_ok());
    }

    #[test]
    fn test_no_firmware_listed() {
        let mut index = Index::from_json(SAMPLE).unwrap();
        index.boards[0].firmwares.clear();
        assert!(matches!(
            index.latest_firmware_url("arduino:samd:mkr1000"),
            Err(IndexError::NoFirmware(_))
        ));
    }

    #[test]
    fn test_latest_orders_numeric_prereleases() {
        let mut index = Index::from_json(SAMPLE).unwrap();
        let board = &mut index.boards[0];
        board.firmwares = ["20.0.0-rc.9", "20.0.0-rc.10", "20.0.0-rc.2"]
            .iter()
            .map(|version| IndexFirmware {
                version: version.to_string(),
                url: format!("https://example.org/fw/{}.bin", version),
                checksum: String::new(),
                size: 0,
                module: "WINC1500".to_string(),
            })
            .collect();

        assert_eq!(
            index.latest_firmware_url("arduino:samd:mkr1000").unwrap(),
            "https://example.org/fw/20.0.0-rc.10.bin"
        );
    }

    #[test]
    fn test_uploader_command_per_os() {
        let index = Index::from_json(SAMPLE).unwrap();
        let board = index.board("arduino:samd:mkr1000").unwrap();

        assert!(board.uploader_command("linux").starts_with("bossac --port"));
        assert!(board.uploader_command("windows").starts_with("bossac.exe"));
        // No macOS entry, falls back to linux
        assert!(board.uploader_command("macos").starts_with("bossac --port"));

        let sara = index.board("arduino:samd:mkrnb1500").unwrap();
        assert_eq!(
            sara.uploader_command("windows"),
            sara.uploader_command("linux")
        );
    }

    #[test]
    fn test_load_trusted() {
        let dir = scratch_dir("trusted");
        let path = write_catalog(&dir, true);

        let index = Index::load(&path, &FixedVerifier(Ok(true))).unwrap();
        assert!(index.is_trusted());

        let index = Index::load(&path, &FixedVerifier(Ok(false))).unwrap();
        assert!(!index.is_trusted());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_verifier_error_leaves_untrusted() {
        let dir = scratch_dir("verifier-error");
        let path = write_catalog(&dir, true);

        let index = Index::load(&path, &FixedVerifier(Err("no key"))).unwrap();
        assert!(!index.is_trusted());
        assert_eq!(index.boards().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_signature() {
        let dir = scratch_dir("no-sig");
        let path = write_catalog(&dir, false);

        let index = Index::load(&path, &FixedVerifier(Ok(true))).unwrap();
        assert!(!index.is_trusted());

        let index = Index::load_unsigned(&path).unwrap();
        assert!(index.is_trusted());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Index::load_unsigned("/nonexistent/module_firmware_index.json"),
            Err(IndexError::Io(_))
        ));
    }
}
