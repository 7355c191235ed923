//! OpenPGP keypair generation inside an isolated keyring.

use async_trait::async_trait;
use gpgkms_core::config::{GpgConfig, KeygenConfig};
use gpgkms_core::{GpgKmsError, GpgKmsResult};
use zeroize::Zeroizing;

use crate::gpg::{is_armored, primary_fingerprints, Gpg};
use crate::keyring::IsolatedKeyring;
use crate::passphrase::Passphrase;

/// Output of one key generation. The private key is only usable with `passphrase`.
pub struct GeneratedKeyPair {
    pub fingerprint: String,
    /// ASCII-armored public key
    pub public_key: String,
    /// ASCII-armored private key, protected by `passphrase`
    pub protected_private_key: String,
    pub passphrase: Passphrase,
}

impl std::fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("fingerprint", &self.fingerprint)
            .field("public_key", &format_args!("{} bytes", self.public_key.len()))
            .field("protected_private_key", &"[REDACTED]")
            .field("passphrase", &self.passphrase)
            .finish()
    }
}

#[async_trait]
pub trait KeyPairProvider: Send + Sync {
    /// Generate a keypair for `identity` (an email-like subject).
    async fn generate(&self, identity: &str) -> GpgKmsResult<GeneratedKeyPair>;
}

/// Generates keys with GnuPG's unattended key generation.
pub struct GpgKeyPairProvider {
    gpg: GpgConfig,
    keygen: KeygenConfig,
}

impl GpgKeyPairProvider {
    pub fn new(gpg: GpgConfig, keygen: KeygenConfig) -> Self {
        Self { gpg, keygen }
    }
}

#[async_trait]
impl KeyPairProvider for GpgKeyPairProvider {
    async fn generate(&self, identity: &str) -> GpgKmsResult<GeneratedKeyPair> {
        validate_identity(identity)?;
        let passphrase = Passphrase::generate();

        let keyring = IsolatedKeyring::create(&self.gpg.gpgconf_program)?;
        let gpg = Gpg::new(&self.gpg.program, &keyring);

        let params = key_parameters(&self.keygen, identity, &passphrase);
        let created = gpg
            .run(["--pinentry-mode", "loopback", "--gen-key"], Some(params.as_bytes()))
            .await
            .map_err(|e| GpgKmsError::KeyGeneration(format!("running gpg: {e}")))?;
        if !created.success {
            return Err(GpgKmsError::KeyGeneration(created.reason()));
        }

        let listing = gpg
            .run(["--with-colons", "--list-secret-keys"], None)
            .await
            .map_err(|e| GpgKmsError::KeyGeneration(format!("running gpg: {e}")))?;
        let fingerprint = primary_fingerprints(&String::from_utf8_lossy(&listing.stdout))
            .into_iter()
            .next()
            .ok_or_else(|| {
                GpgKmsError::KeyGeneration("gpg reported success but no secret key exists".into())
            })?;
        tracing::info!(fingerprint = %fingerprint, "OpenPGP keypair generated");

        let fd_input = passphrase.as_fd_input();
        let secret = gpg
            .run(
                [
                    "--pinentry-mode",
                    "loopback",
                    "--passphrase-fd",
                    "0",
                    "--armor",
                    "--export-secret-keys",
                    fingerprint.as_str(),
                ],
                Some(fd_input.as_slice()),
            )
            .await
            .map_err(|e| GpgKmsError::Export(format!("running gpg: {e}")))?;
        let protected_private_key = armored_export(secret, "PRIVATE KEY")?;

        let public = gpg
            .run(["--armor", "--export", fingerprint.as_str()], None)
            .await
            .map_err(|e| GpgKmsError::Export(format!("running gpg: {e}")))?;
        let public_key = armored_export(public, "PUBLIC KEY")?;

        Ok(GeneratedKeyPair {
            fingerprint,
            public_key,
            protected_private_key,
            passphrase,
        })
    }
}

fn armored_export(out: crate::gpg::GpgOutput, block: &str) -> GpgKmsResult<String> {
    if !out.success {
        return Err(GpgKmsError::Export(out.reason()));
    }
    let text = String::from_utf8(out.stdout)
        .map_err(|_| GpgKmsError::Export(format!("{block} export is not ASCII armor")))?;
    if !is_armored(&text, block) {
        return Err(GpgKmsError::Export(format!(
            "gpg produced no armored {} block",
            block.to_lowercase()
        )));
    }
    Ok(text)
}

/// Identities become a line of the batch parameter block, so they must be a
/// single non-empty line.
fn validate_identity(identity: &str) -> GpgKmsResult<()> {
    if identity.trim().is_empty() {
        return Err(GpgKmsError::KeyGeneration("identity must not be empty".into()));
    }
    if identity.chars().any(char::is_control) {
        return Err(GpgKmsError::KeyGeneration(
            "identity must not contain control characters".into(),
        ));
    }
    Ok(())
}

/// Unattended key generation parameters (see GnuPG "Unattended key generation").
fn key_parameters(
    keygen: &KeygenConfig,
    identity: &str,
    passphrase: &Passphrase,
) -> Zeroizing<String> {
    Zeroizing::new(format!(
        "Key-Type: {}\n\
         Key-Curve: {}\n\
         Subkey-Type: {}\n\
         Subkey-Curve: {}\n\
         Name-Real: {}\n\
         Name-Email: {}\n\
         Expire-Date: {}\n\
         Passphrase: {}\n\
         %commit\n",
        keygen.key_type,
        keygen.key_curve,
        keygen.subkey_type,
        keygen.subkey_curve,
        keygen.name_real,
        identity.trim(),
        keygen.expire_date,
        passphrase.expose(),
    ))
}
