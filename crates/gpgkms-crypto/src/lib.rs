//! gpgkms-crypto: OpenPGP key lifecycle backed by GnuPG
//!
//! Each operation runs in its own throwaway keyring:
//! ```text
//! generate:  passphrase ─► gpg --gen-key ─► export (armored, protected) ─► drop keyring
//! decrypt:   import key ─► ownertrust ─► gpg --decrypt ─► RELOADAGENT ─► drop keyring
//! ```

pub mod agent;
pub mod decrypt;
pub mod gpg;
pub mod keypair;
pub mod keyring;
pub mod passphrase;

pub use agent::{GpgAgentCache, PassphraseCache};
pub use decrypt::{Decryptor, GpgDecryptor, PlaintextResult};
pub use keypair::{GeneratedKeyPair, GpgKeyPairProvider, KeyPairProvider};
pub use keyring::IsolatedKeyring;
pub use passphrase::{Passphrase, PASSPHRASE_ALPHABET, PASSPHRASE_LEN};
