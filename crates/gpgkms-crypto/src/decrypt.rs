//! Decryption of ciphertext files with a passphrase-protected private key.

use async_trait::async_trait;
use gpgkms_core::config::GpgConfig;
use gpgkms_core::{GpgKmsError, GpgKmsResult};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use crate::agent::PassphraseCache;
use crate::gpg::{primary_fingerprints, Gpg};
use crate::keyring::IsolatedKeyring;
use crate::passphrase::Passphrase;

/// Outcome of a decrypt attempt. A wrong passphrase or a ciphertext that is not
/// for this key is `ok == false`, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaintextResult {
    pub ok: bool,
    pub data: Vec<u8>,
    pub diagnostic: String,
}

#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(
        &self,
        protected_private_key: &str,
        passphrase: &Passphrase,
        ciphertext: &Path,
    ) -> GpgKmsResult<PlaintextResult>;
}

pub struct GpgDecryptor {
    gpg: GpgConfig,
    cache: Arc<dyn PassphraseCache>,
}

impl GpgDecryptor {
    pub fn new(gpg: GpgConfig, cache: Arc<dyn PassphraseCache>) -> Self {
        Self { gpg, cache }
    }

    async fn decrypt_in(
        &self,
        keyring: &IsolatedKeyring,
        protected_private_key: &str,
        passphrase: &Passphrase,
        ciphertext: &Path,
    ) -> GpgKmsResult<PlaintextResult> {
        tokio::fs::File::open(ciphertext)
            .await
            .map_err(|e| GpgKmsError::io(ciphertext.display(), e))?;

        let gpg = Gpg::new(&self.gpg.program, keyring);

        let imported = gpg
            .run(["--import"], Some(protected_private_key.as_bytes()))
            .await
            .map_err(|e| GpgKmsError::Import(format!("running gpg: {e}")))?;
        if !imported.success {
            return Err(GpgKmsError::Import(imported.reason()));
        }

        let listing = gpg
            .run(["--with-colons", "--list-secret-keys"], None)
            .await
            .map_err(|e| GpgKmsError::Import(format!("running gpg: {e}")))?;
        let fingerprints = primary_fingerprints(&String::from_utf8_lossy(&listing.stdout));
        if fingerprints.is_empty() {
            return Err(GpgKmsError::Import(
                "no secret key found in the protected private key".into(),
            ));
        }

        // ultimate trust, scoped to this keyring only
        let ownertrust: String = fingerprints.iter().map(|f| format!("{f}:6:\n")).collect();
        let trusted = gpg
            .run(["--import-ownertrust"], Some(ownertrust.as_bytes()))
            .await
            .map_err(|e| GpgKmsError::Import(format!("running gpg: {e}")))?;
        if !trusted.success {
            return Err(GpgKmsError::Import(trusted.reason()));
        }
        tracing::debug!(keys = fingerprints.len(), "imported and trusted private key");

        let mut args: Vec<&OsStr> = [
            "--pinentry-mode",
            "loopback",
            "--passphrase-fd",
            "0",
            "--yes",
            "--output",
            "-",
            "--decrypt",
        ]
        .into_iter()
        .map(OsStr::new)
        .collect();
        args.push(ciphertext.as_os_str());

        let fd_input = passphrase.as_fd_input();
        let out = gpg
            .run(args, Some(fd_input.as_slice()))
            .await
            .map_err(|e| GpgKmsError::io(self.gpg.program.display(), e))?;

        if out.success {
            tracing::info!(file = %ciphertext.display(), "file decrypted with private key");
            Ok(PlaintextResult {
                ok: true,
                data: out.stdout,
                diagnostic: out.stderr,
            })
        } else {
            let diagnostic = out.reason();
            tracing::warn!(file = %ciphertext.display(), %diagnostic, "decryption rejected");
            Ok(PlaintextResult {
                ok: false,
                data: Vec::new(),
                diagnostic,
            })
        }
    }
}

#[async_trait]
impl Decryptor for GpgDecryptor {
    async fn decrypt(
        &self,
        protected_private_key: &str,
        passphrase: &Passphrase,
        ciphertext: &Path,
    ) -> GpgKmsResult<PlaintextResult> {
        let keyring = IsolatedKeyring::create(&self.gpg.gpgconf_program)?;
        let result = self
            .decrypt_in(&keyring, protected_private_key, passphrase, ciphertext)
            .await;
        // every exit path clears the cache before the keyring goes away
        self.cache.invalidate(keyring.path()).await;
        drop(keyring);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpgkms_core::ErrorKind;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCache {
        homes: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PassphraseCache for RecordingCache {
        async fn invalidate(&self, home: &Path) {
            assert!(home.exists(), "cache must be cleared before keyring teardown");
            self.homes.lock().unwrap().push(home.to_path_buf());
        }
    }

    fn decryptor(cache: Arc<RecordingCache>) -> GpgDecryptor {
        let gpg = GpgConfig {
            gpgconf_program: "/nonexistent/gpgconf".into(),
            ..GpgConfig::default()
        };
        GpgDecryptor::new(gpg, cache)
    }

    #[tokio::test]
    async fn test_missing_ciphertext_is_io_error_and_clears_cache() {
        let cache = Arc::new(RecordingCache::default());
        let dec = decryptor(cache.clone());
        let passphrase = Passphrase::from("irrelevant".to_string());

        let err = dec
            .decrypt("key", &passphrase, Path::new("/nonexistent/file.gpg"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        let homes = cache.homes.lock().unwrap();
        assert_eq!(homes.len(), 1);
        assert!(!homes[0].exists(), "keyring removed after the call");
    }

    #[tokio::test]
    async fn test_unparseable_key_is_import_error_and_clears_cache() {
        let cache = Arc::new(RecordingCache::default());
        let dec = decryptor(cache.clone());
        let passphrase = Passphrase::from("irrelevant".to_string());

        let dir = tempfile::tempdir().unwrap();
        let ct = dir.path().join("file.gpg");
        std::fs::write(&ct, b"not really ciphertext").unwrap();

        let err = dec
            .decrypt("this is not an OpenPGP key", &passphrase, &ct)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Import);
        assert_eq!(cache.homes.lock().unwrap().len(), 1);
    }
}
