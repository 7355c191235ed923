use gpgkms_core::{GpgKmsError, GpgKmsResult, KekRef, SecretId, VersionRef};
use gpgkms_crypto::KeyPairProvider;
use gpgkms_secrets::{Envelope, SecretStore};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::{ensure_distinct, store_secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateState {
    Start,
    KeypairGenerated,
    PassphraseEnveloped,
    PassphraseStored,
    PrivateKeyStored,
    PublicKeyExported,
    Done,
    Failed,
}

impl fmt::Display for GenerateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GenerateState::Start => "START",
            GenerateState::KeypairGenerated => "KEYPAIR_GENERATED",
            GenerateState::PassphraseEnveloped => "PASSPHRASE_ENVELOPED",
            GenerateState::PassphraseStored => "PASSPHRASE_STORED",
            GenerateState::PrivateKeyStored => "PRIVATEKEY_STORED",
            GenerateState::PublicKeyExported => "PUBLICKEY_EXPORTED",
            GenerateState::Done => "DONE",
            GenerateState::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Email-like subject of the key
    pub identity: String,
    pub kek: KekRef,
    pub private_key_secret: SecretId,
    pub passphrase_secret: SecretId,
    pub public_key_path: PathBuf,
}

impl GenerateRequest {
    pub fn validate(&self) -> GpgKmsResult<()> {
        if self.identity.trim().is_empty() {
            return Err(GpgKmsError::Config("identity must not be empty".into()));
        }
        ensure_distinct(&self.private_key_secret, &self.passphrase_secret)
    }
}

#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub fingerprint: String,
    pub passphrase_version: VersionRef,
    pub private_key_version: VersionRef,
    pub public_key_path: PathBuf,
}

pub struct GenerateWorkflow {
    keys: Arc<dyn KeyPairProvider>,
    envelope: Arc<dyn Envelope>,
    store: Arc<dyn SecretStore>,
    state: GenerateState,
}

impl GenerateWorkflow {
    pub fn new(
        keys: Arc<dyn KeyPairProvider>,
        envelope: Arc<dyn Envelope>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            keys,
            envelope,
            store,
            state: GenerateState::Start,
        }
    }

    pub fn state(&self) -> GenerateState {
        self.state
    }

    pub async fn run(
        &mut self,
        req: &GenerateRequest,
    ) -> Result<GenerateReport, WorkflowError<GenerateState>> {
        self.state = GenerateState::Start;
        match self.steps(req).await {
            Ok(report) => {
                self.advance(GenerateState::Done);
                Ok(report)
            }
            Err(source) => {
                let last_state = self.state;
                self.advance(GenerateState::Failed);
                Err(WorkflowError { last_state, source })
            }
        }
    }

    async fn steps(&mut self, req: &GenerateRequest) -> GpgKmsResult<GenerateReport> {
        req.validate()?;

        let keys = self.keys.generate(&req.identity).await?;
        self.advance(GenerateState::KeypairGenerated);

        let enveloped = self
            .envelope
            .encrypt(&req.kek, keys.passphrase.expose().as_bytes())
            .await?;
        tracing::info!(kek = %req.kek, "passphrase enveloped under KEK");
        self.advance(GenerateState::PassphraseEnveloped);

        let passphrase_version =
            store_secret(self.store.as_ref(), &req.passphrase_secret, &enveloped).await?;
        tracing::info!(
            secret_id = %req.passphrase_secret,
            version = %passphrase_version,
            "enveloped passphrase stored"
        );
        self.advance(GenerateState::PassphraseStored);

        let private_key_version = store_secret(
            self.store.as_ref(),
            &req.private_key_secret,
            keys.protected_private_key.as_bytes(),
        )
        .await?;
        tracing::info!(
            secret_id = %req.private_key_secret,
            version = %private_key_version,
            "protected private key stored"
        );
        self.advance(GenerateState::PrivateKeyStored);

        gpgkms_storage::write_public_key(&req.public_key_path, &keys.public_key).await?;
        self.advance(GenerateState::PublicKeyExported);

        Ok(GenerateReport {
            fingerprint: keys.fingerprint.clone(),
            passphrase_version,
            private_key_version,
            public_key_path: req.public_key_path.clone(),
        })
    }

    fn advance(&mut self, next: GenerateState) {
        tracing::debug!(workflow = "generate", from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            identity: "user@example.com".into(),
            kek: "proj/ring/key".parse().unwrap(),
            private_key_secret: SecretId::new("proj", "priv-1"),
            passphrase_secret: SecretId::new("proj", "pass-1"),
            public_key_path: "public_key.asc".into(),
        }
    }

    #[test]
    fn test_state_names() {
        assert_eq!(GenerateState::PrivateKeyStored.to_string(), "PRIVATEKEY_STORED");
        assert_eq!(GenerateState::Done.to_string(), "DONE");
    }

    #[test]
    fn test_validate_rejects_same_secret() {
        let mut req = request();
        assert!(req.validate().is_ok());
        req.passphrase_secret = req.private_key_secret.clone();
        assert!(matches!(req.validate(), Err(GpgKmsError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_blank_identity() {
        let req = GenerateRequest {
            identity: " ".into(),
            ..request()
        };
        assert!(matches!(req.validate(), Err(GpgKmsError::Config(_))));
    }
}
