//! Random passphrases that protect exported private keys.

use gpgkms_core::{GpgKmsError, GpgKmsResult};
use rand::{rngs::OsRng, Rng};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, Zeroizing};

/// Number of symbols in a generated passphrase.
pub const PASSPHRASE_LEN: usize = 32;

/// Digits, ASCII letters and ASCII punctuation (94 symbols).
pub const PASSPHRASE_ALPHABET: &[u8] = b"0123456789\
abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// A passphrase held only in memory. Zeroized on drop.
pub struct Passphrase(SecretString);

impl Passphrase {
    /// Draw a fresh passphrase from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let phrase: String = (0..PASSPHRASE_LEN)
            .map(|_| PASSPHRASE_ALPHABET[rng.gen_range(0..PASSPHRASE_ALPHABET.len())] as char)
            .collect();
        Self(SecretString::from(phrase))
    }

    /// Rebuild a passphrase from bytes recovered by the envelope service.
    pub fn from_bytes(bytes: Vec<u8>) -> GpgKmsResult<Self> {
        match String::from_utf8(bytes) {
            Ok(phrase) => Ok(Self(SecretString::from(phrase))),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(GpgKmsError::DecryptionFailed(
                    "unwrapped passphrase is not valid UTF-8".into(),
                ))
            }
        }
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    /// The passphrase followed by a newline, as GnuPG reads it from a descriptor.
    pub(crate) fn as_fd_input(&self) -> Zeroizing<Vec<u8>> {
        let mut line = Zeroizing::new(Vec::with_capacity(self.len() + 1));
        line.extend_from_slice(self.expose().as_bytes());
        line.push(b'\n');
        line
    }
}

impl From<String> for Passphrase {
    fn from(phrase: String) -> Self {
        Self(SecretString::from(phrase))
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Passphrase").field(&"[REDACTED]").finish()
    }
}
