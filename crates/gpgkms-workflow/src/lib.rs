//! gpgkms-workflow: the two key-protection workflows
//!
//! ```text
//! generate: keypair ─► envelope(passphrase) ─► store passphrase ─► store private key ─► public key file
//! decrypt:  fetch secrets ─► unveil passphrase ─► gpg decrypt ─► plaintext sink
//! ```
//!
//! Both are explicit state machines. A failure stops the run without retrying
//! and reports the last state reached alongside the original error.

pub mod decrypt;
pub mod error;
pub mod generate;

pub use decrypt::{DecryptReport, DecryptRequest, DecryptState, DecryptWorkflow};
pub use error::WorkflowError;
pub use generate::{GenerateReport, GenerateRequest, GenerateState, GenerateWorkflow};

use gpgkms_core::{GpgKmsError, GpgKmsResult, SecretId, VersionRef};
use gpgkms_secrets::{CreateOutcome, SecretStore};

/// Create-if-absent then append one version. Re-running appends a new version
/// to the existing secret.
pub(crate) async fn store_secret(
    store: &dyn SecretStore,
    secret: &SecretId,
    payload: &[u8],
) -> GpgKmsResult<VersionRef> {
    if store.create_if_absent(secret).await? == CreateOutcome::Created {
        tracing::debug!(secret_id = %secret, "new secret");
    }
    store.put_version(secret, payload).await
}

/// Both ids must be well formed, and the private key and the enveloped
/// passphrase must never share a record.
pub(crate) fn ensure_distinct(private_key: &SecretId, passphrase: &SecretId) -> GpgKmsResult<()> {
    private_key.validate()?;
    passphrase.validate()?;
    if private_key == passphrase {
        return Err(GpgKmsError::Config(format!(
            "private key and passphrase must be stored in different secrets (both are {private_key})"
        )));
    }
    Ok(())
}
