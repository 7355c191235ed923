//! Passphrase cache invalidation.
//!
//! gpg-agent caches the passphrase of the last unlocked key and will accept
//! any passphrase for the next operation on that key while the entry lives.
//! After every decrypt the agents that could hold the entry are told to
//! reload, which drops all cached passphrases.

use async_trait::async_trait;
use gpgkms_core::config::GpgConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const RELOAD_DEADLINE: Duration = Duration::from_secs(5);

/// Discards cached passphrases. Best effort: implementations log and return.
#[async_trait]
pub trait PassphraseCache: Send + Sync {
    /// `home` is the keyring the passphrase was just used in.
    async fn invalidate(&self, home: &Path);
}

/// Sends `RELOADAGENT` through `gpg-connect-agent`.
pub struct GpgAgentCache {
    program: PathBuf,
    clear_default_agent: bool,
}

impl GpgAgentCache {
    pub fn new(program: impl Into<PathBuf>, clear_default_agent: bool) -> Self {
        Self {
            program: program.into(),
            clear_default_agent,
        }
    }

    pub fn from_config(gpg: &GpgConfig) -> Self {
        Self::new(gpg.connect_agent_program.clone(), gpg.clear_default_agent)
    }

    async fn reload(&self, home: Option<&Path>) {
        let mut cmd = Command::new(&self.program);
        if let Some(home) = home {
            cmd.arg("--homedir").arg(home);
        }
        cmd.args(["--no-autostart", "RELOADAGENT", "/bye"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let target = home
            .map(|h| h.display().to_string())
            .unwrap_or_else(|| "default".into());

        match tokio::time::timeout(RELOAD_DEADLINE, cmd.output()).await {
            Ok(Ok(out)) if out.status.success() => {
                tracing::debug!(agent = %target, "cleared gpg-agent passphrase cache");
            }
            Ok(Ok(out)) => tracing::warn!(
                agent = %target,
                status = %out.status,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "gpg-agent reload reported failure"
            ),
            Ok(Err(e)) => tracing::warn!(
                agent = %target,
                "could not run {}: {e}",
                self.program.display()
            ),
            Err(_) => tracing::warn!(agent = %target, "gpg-agent reload timed out"),
        }
    }
}

#[async_trait]
impl PassphraseCache for GpgAgentCache {
    async fn invalidate(&self, home: &Path) {
        self.reload(Some(home)).await;
        if self.clear_default_agent {
            self.reload(None).await;
        }
    }
}
