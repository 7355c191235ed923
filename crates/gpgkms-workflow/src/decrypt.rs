use gpgkms_core::{GpgKmsError, GpgKmsResult, KekRef, SecretId, VersionRef};
use gpgkms_crypto::{Decryptor, Passphrase};
use gpgkms_secrets::{Envelope, SecretStore};
use gpgkms_storage::PlaintextSink;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::ensure_distinct;
use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptState {
    Start,
    SecretsFetched,
    PassphraseUnveiled,
    PlaintextRecovered,
    OutputWritten,
    Done,
    Failed,
}

impl fmt::Display for DecryptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecryptState::Start => "START",
            DecryptState::SecretsFetched => "SECRETS_FETCHED",
            DecryptState::PassphraseUnveiled => "PASSPHRASE_UNVEILED",
            DecryptState::PlaintextRecovered => "PLAINTEXT_RECOVERED",
            DecryptState::OutputWritten => "OUTPUT_WRITTEN",
            DecryptState::Done => "DONE",
            DecryptState::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DecryptRequest {
    pub kek: KekRef,
    pub private_key_secret: SecretId,
    pub passphrase_secret: SecretId,
    /// Applies to both secrets; they are written together by `generate`
    pub version: VersionRef,
    pub ciphertext: PathBuf,
}

impl DecryptRequest {
    pub fn validate(&self) -> GpgKmsResult<()> {
        ensure_distinct(&self.private_key_secret, &self.passphrase_secret)
    }
}

#[derive(Debug, Clone)]
pub struct DecryptReport {
    pub location: String,
    pub bytes: usize,
}

pub struct DecryptWorkflow {
    store: Arc<dyn SecretStore>,
    envelope: Arc<dyn Envelope>,
    decryptor: Arc<dyn Decryptor>,
    sink: Arc<dyn PlaintextSink>,
    state: DecryptState,
}

impl DecryptWorkflow {
    pub fn new(
        store: Arc<dyn SecretStore>,
        envelope: Arc<dyn Envelope>,
        decryptor: Arc<dyn Decryptor>,
        sink: Arc<dyn PlaintextSink>,
    ) -> Self {
        Self {
            store,
            envelope,
            decryptor,
            sink,
            state: DecryptState::Start,
        }
    }

    pub fn state(&self) -> DecryptState {
        self.state
    }

    pub async fn run(
        &mut self,
        req: &DecryptRequest,
    ) -> Result<DecryptReport, WorkflowError<DecryptState>> {
        self.state = DecryptState::Start;
        match self.steps(req).await {
            Ok(report) => {
                self.advance(DecryptState::Done);
                Ok(report)
            }
            Err(source) => {
                let last_state = self.state;
                self.advance(DecryptState::Failed);
                Err(WorkflowError { last_state, source })
            }
        }
    }

    async fn steps(&mut self, req: &DecryptRequest) -> GpgKmsResult<DecryptReport> {
        req.validate()?;

        let private_key = self
            .store
            .get_version(&req.private_key_secret, &req.version)
            .await?;
        let enveloped = self
            .store
            .get_version(&req.passphrase_secret, &req.version)
            .await?;
        tracing::info!(
            private_key = %req.private_key_secret,
            passphrase = %req.passphrase_secret,
            version = %req.version,
            "secrets fetched"
        );
        self.advance(DecryptState::SecretsFetched);

        let raw = self.envelope.decrypt(&req.kek, &enveloped).await?;
        let passphrase = Passphrase::from_bytes(raw.to_vec())?;
        drop(raw);
        self.advance(DecryptState::PassphraseUnveiled);

        let private_key = Zeroizing::new(String::from_utf8(private_key.to_vec()).map_err(|_| {
            GpgKmsError::Import(format!(
                "secret {} does not hold an ASCII-armored key",
                req.private_key_secret
            ))
        })?);
        let result = self
            .decryptor
            .decrypt(&private_key, &passphrase, &req.ciphertext)
            .await?;
        if !result.ok {
            return Err(GpgKmsError::DecryptionFailed(result.diagnostic));
        }
        let plaintext = Zeroizing::new(result.data);
        self.advance(DecryptState::PlaintextRecovered);

        let location = self.sink.write(&plaintext).await?;
        self.advance(DecryptState::OutputWritten);

        Ok(DecryptReport {
            location,
            bytes: plaintext.len(),
        })
    }

    fn advance(&mut self, next: DecryptState) {
        tracing::debug!(workflow = "decrypt", from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}
