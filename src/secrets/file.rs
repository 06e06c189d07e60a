use super::{SecretError, SecretSink};
use crate::prelude::debug;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

/// [`SecretSink`] writing PEM files.
///
/// Each write goes to a temporary file in the destination directory which is
/// then renamed over the target, so readers never observe a partial file.
/// The key file is created with mode `0600`.
#[derive(Debug, Clone)]
pub struct FileSecretSink {
    cert_chain_file: PathBuf,
    key_file: PathBuf,
}

impl FileSecretSink {
    /// Creates a sink writing to the given paths.
    pub fn new(cert_chain_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            cert_chain_file: cert_chain_file.into(),
            key_file: key_file.into(),
        }
    }

    /// Certificate chain destination.
    pub fn cert_chain_file(&self) -> &Path {
        &self.cert_chain_file
    }

    /// Private key destination.
    pub fn key_file(&self) -> &Path {
        &self.key_file
    }
}

impl SecretSink for FileSecretSink {
    fn set_identity_cert(&self, cert_chain_pem: &[u8]) -> Result<(), SecretError> {
        write_atomic(&self.cert_chain_file, cert_chain_pem, CERT_MODE)
    }

    fn set_identity_private_key(&self, key_pem: &[u8]) -> Result<(), SecretError> {
        write_atomic(&self.key_file, key_pem, KEY_MODE)
    }
}

fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<(), SecretError> {
    let err = |source| SecretError::Write {
        path: path.to_path_buf(),
        source,
    };

    let tmp = temp_path(path);
    let result = (|| {
        let mut file = open_with_mode(&tmp, mode)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(err(e));
    }

    debug!("Secret file written: path={}, bytes={}", path.display(), contents.len());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp.{}", std::process::id()))
}

#[cfg(unix)]
fn open_with_mode(path: &Path, mode: u32) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn open_with_mode(path: &Path, _mode: u32) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
