//! Certificate persistence.
//!
//! Certificates issued in a join response are written to
//! `<data_dir>/certs/<ip>/private.pem` and `<data_dir>/certs/<ip>/cert.pem`
//! with owner-only permissions. Each file is written independently; a
//! failure is logged and never fails the join.

use std::collections::BTreeMap;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::protocol::CertPair;

/// Private key file name inside an address directory.
pub const PRIVATE_KEY_FILE: &str = "private.pem";

/// Certificate file name inside an address directory.
pub const CERT_FILE: &str = "cert.pem";

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Writes issued certificates under a root directory.
#[derive(Clone, Debug)]
pub struct CertStore {
    root: PathBuf,
}

impl CertStore {
    /// Store rooted at `<data_dir>/certs`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("certs"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the material for `ip`.
    pub fn dir_for(&self, ip: &str) -> PathBuf {
        self.root.join(ip)
    }

    /// Persist every pair, returning the number of files written.
    ///
    /// Keys that are not IP addresses are skipped so that no write lands
    /// outside the certs directory.
    pub async fn persist(&self, certs: &BTreeMap<String, CertPair>) -> usize {
        let mut written = 0;
        for (ip, pair) in certs {
            if ip.parse::<IpAddr>().is_err() {
                warn!(key = %ip, "Skipping certificate with invalid address key");
                continue;
            }

            let dir = self.dir_for(ip);
            if let Err(e) = create_dir(&dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to create certificate directory");
                continue;
            }

            for (name, contents) in [
                (PRIVATE_KEY_FILE, &pair.private_key_pem),
                (CERT_FILE, &pair.cert_pem),
            ] {
                let path = dir.join(name);
                match write_private(&path, contents.as_bytes()).await {
                    Ok(()) => {
                        debug!(path = %path.display(), "Wrote certificate file");
                        written += 1;
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Failed to write certificate file");
                    }
                }
            }
        }
        written
    }
}

async fn create_dir(dir: &Path) -> io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(DIR_MODE)).await?;
    }
    Ok(())
}

async fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;

    // The mode above only applies when the file is created.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE)).await?;
    }
    Ok(())
}
