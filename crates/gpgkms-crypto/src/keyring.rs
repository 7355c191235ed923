//! Single-use GnuPG home directories.
//!
//! Every key generation and every decryption runs against a fresh home
//! directory that is owned by exactly one call. Dropping the guard stops the
//! agent GnuPG started for that home and removes the directory, so nothing
//! created inside it outlives the call, whichever way the call exits.

use gpgkms_core::{GpgKmsError, GpgKmsResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tokio::runtime::{Handle, RuntimeFlavor};

pub struct IsolatedKeyring {
    dir: TempDir,
    gpgconf: PathBuf,
}

impl IsolatedKeyring {
    /// Create a private (0700) home directory under the system temp dir.
    ///
    /// `gpgconf` is used on teardown to stop the keyring's gpg-agent.
    pub fn create(gpgconf: impl Into<PathBuf>) -> GpgKmsResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gpgkms-");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o700));
        }
        let dir = builder
            .tempdir()
            .map_err(|e| GpgKmsError::io(std::env::temp_dir().display(), e))?;
        tracing::debug!(home = %dir.path().display(), "created isolated keyring");
        Ok(Self {
            dir,
            gpgconf: gpgconf.into(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for IsolatedKeyring {
    fn drop(&mut self) {
        let kill_agent = || {
            Command::new(&self.gpgconf)
                .arg("--homedir")
                .arg(self.dir.path())
                .args(["--kill", "gpg-agent"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
        };
        // Drop cannot await; gpgconf blocks until the agent is gone
        let killed = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(kill_agent)
            }
            _ => kill_agent(),
        };
        if let Err(e) = killed {
            tracing::debug!("could not stop keyring agent via {}: {e}", self.gpgconf.display());
        }
        tracing::debug!(home = %self.dir.path().display(), "destroying isolated keyring");
        // `dir` is removed when the TempDir field drops
    }
}

impl std::fmt::Debug for IsolatedKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedKeyring")
            .field("home", &self.dir.path())
            .finish()
    }
}
