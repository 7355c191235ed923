//! In-process backends for offline runs and tests.

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use gpgkms_core::{GpgKmsError, GpgKmsResult, KekRef, SecretId, VersionRef};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use zeroize::{Zeroize, Zeroizing};

use crate::envelope::Envelope;
use crate::secret_store::{CreateOutcome, SecretStore};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// XChaCha20-Poly1305 KEKs held in memory.
///
/// Output layout: `[24-byte nonce][ciphertext + 16-byte tag]`. Unknown KEKs are
/// `NotFound`, like an unknown key in Cloud KMS.
#[derive(Default)]
pub struct LocalEnvelope {
    keks: Mutex<HashMap<KekRef, Zeroizing<[u8; KEY_SIZE]>>>,
}

impl LocalEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a KEK with fresh random key material.
    pub fn add_kek(&self, kek: KekRef) {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        self.insert(kek, Zeroizing::new(bytes));
        bytes.zeroize();
    }

    pub fn add_kek_with_key(&self, kek: KekRef, key: [u8; KEY_SIZE]) {
        self.insert(kek, Zeroizing::new(key));
    }

    fn insert(&self, kek: KekRef, key: Zeroizing<[u8; KEY_SIZE]>) {
        if let Ok(mut keks) = self.keks.lock() {
            keks.insert(kek, key);
        }
    }

    fn cipher(&self, kek: &KekRef) -> GpgKmsResult<XChaCha20Poly1305> {
        let keks = self
            .keks
            .lock()
            .map_err(|_| GpgKmsError::Unavailable("local KEK table poisoned".into()))?;
        let key = keks
            .get(kek)
            .ok_or_else(|| GpgKmsError::NotFound(format!("KEK {kek}")))?;
        let key: &[u8; KEY_SIZE] = key;
        Ok(XChaCha20Poly1305::new(key.into()))
    }
}

#[async_trait]
impl Envelope for LocalEnvelope {
    async fn encrypt(&self, kek: &KekRef, plaintext: &[u8]) -> GpgKmsResult<Vec<u8>> {
        let cipher = self.cipher(kek)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| GpgKmsError::Other(anyhow::anyhow!("envelope encryption failed: {e}")))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    async fn decrypt(&self, kek: &KekRef, ciphertext: &[u8]) -> GpgKmsResult<Zeroizing<Vec<u8>>> {
        let cipher = self.cipher(kek)?;
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(GpgKmsError::DecryptionFailed(format!(
                "enveloped payload too short: {} bytes (expected at least {})",
                ciphertext.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, sealed).map_err(|_| {
            GpgKmsError::DecryptionFailed("envelope unwrap failed: wrong KEK or corrupted data".into())
        })?;
        Ok(Zeroizing::new(plaintext))
    }
}

/// Append-only versions per secret, kept in memory.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<SecretId, Vec<Vec<u8>>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions stored for `secret`, or `None` if it does not exist.
    pub fn version_count(&self, secret: &SecretId) -> Option<usize> {
        self.secrets
            .lock()
            .ok()
            .and_then(|s| s.get(secret).map(Vec::len))
    }

    fn lock(&self) -> GpgKmsResult<std::sync::MutexGuard<'_, HashMap<SecretId, Vec<Vec<u8>>>>> {
        self.secrets
            .lock()
            .map_err(|_| GpgKmsError::Unavailable("memory secret store poisoned".into()))
    }
}

impl Drop for MemorySecretStore {
    fn drop(&mut self) {
        if let Ok(secrets) = self.secrets.get_mut() {
            for versions in secrets.values_mut() {
                versions.iter_mut().for_each(|v| v.zeroize());
            }
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn create_if_absent(&self, secret: &SecretId) -> GpgKmsResult<CreateOutcome> {
        let mut secrets = self.lock()?;
        if secrets.contains_key(secret) {
            return Ok(CreateOutcome::AlreadyPresent);
        }
        secrets.insert(secret.clone(), Vec::new());
        Ok(CreateOutcome::Created)
    }

    async fn put_version(&self, secret: &SecretId, payload: &[u8]) -> GpgKmsResult<VersionRef> {
        let mut secrets = self.lock()?;
        let versions = secrets
            .get_mut(secret)
            .ok_or_else(|| GpgKmsError::NotFound(format!("secret {secret}")))?;
        versions.push(payload.to_vec());
        Ok(VersionRef::Number(versions.len() as u64))
    }

    async fn get_version(
        &self,
        secret: &SecretId,
        version: &VersionRef,
    ) -> GpgKmsResult<Zeroizing<Vec<u8>>> {
        let secrets = self.lock()?;
        let versions = secrets
            .get(secret)
            .ok_or_else(|| GpgKmsError::NotFound(format!("secret {secret}")))?;
        let payload = match version {
            VersionRef::Latest => versions.last(),
            VersionRef::Number(n) => usize::try_from(*n)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| versions.get(i)),
        };
        payload
            .map(|p| Zeroizing::new(p.clone()))
            .ok_or_else(|| GpgKmsError::NotFound(format!("secret {secret} version {version}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpgkms_core::ErrorKind;
    use proptest::prelude::*;

    fn kek() -> KekRef {
        "proj/ring/key".parse().unwrap()
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread().build().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_kek_is_not_found() {
        let env = LocalEnvelope::new();
        let err = env.encrypt(&kek(), b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_wrong_kek_fails() {
        let env = LocalEnvelope::new();
        let other: KekRef = "proj/ring/other".parse().unwrap();
        env.add_kek(kek());
        env.add_kek(other.clone());

        let ct = env.encrypt(&kek(), b"passphrase").await.unwrap();
        let err = env.decrypt(&other, &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    #[tokio::test]
    async fn test_ciphertext_layout_and_randomized_nonce() {
        let env = LocalEnvelope::new();
        env.add_kek_with_key(kek(), [7u8; KEY_SIZE]);
        let a = env.encrypt(&kek(), b"same").await.unwrap();
        let b = env.encrypt(&kek(), b"same").await.unwrap();
        assert_eq!(a.len(), NONCE_SIZE + 4 + TAG_SIZE);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_truncated_ciphertext_rejected() {
        let env = LocalEnvelope::new();
        env.add_kek(kek());
        let err = env.decrypt(&kek(), &[0u8; 10]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_envelope_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..=64 * 1024)) {
            let env = LocalEnvelope::new();
            env.add_kek(kek());
            let rt = runtime();
            let ct = rt.block_on(env.encrypt(&kek(), &payload)).unwrap();
            let pt = rt.block_on(env.decrypt(&kek(), &ct)).unwrap();
            prop_assert_eq!(pt.as_slice(), payload.as_slice());
        }
    }

    #[tokio::test]
    async fn test_store_put_then_get_exact_bytes() {
        let store = MemorySecretStore::new();
        let id = SecretId::new("proj", "priv-1");
        assert_eq!(store.create_if_absent(&id).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            store.create_if_absent(&id).await.unwrap(),
            CreateOutcome::AlreadyPresent
        );

        let v1 = store.put_version(&id, b"\x00first\xff").await.unwrap();
        let v2 = store.put_version(&id, b"second").await.unwrap();
        assert_eq!(v1, VersionRef::Number(1));
        assert_eq!(v2, VersionRef::Number(2));

        assert_eq!(store.get_version(&id, &v1).await.unwrap().as_slice(), b"\x00first\xff");
        assert_eq!(
            store.get_version(&id, &VersionRef::Latest).await.unwrap().as_slice(),
            b"second"
        );
        assert_eq!(store.version_count(&id), Some(2));
    }

    #[tokio::test]
    async fn test_store_missing_secret_or_version() {
        let store = MemorySecretStore::new();
        let id = SecretId::new("proj", "nope");
        assert_eq!(
            store.get_version(&id, &VersionRef::Latest).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.put_version(&id, b"x").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        store.create_if_absent(&id).await.unwrap();
        assert_eq!(
            store.get_version(&id, &VersionRef::Latest).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store
                .get_version(&id, &VersionRef::Number(3))
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}
