//! gpgkms-secrets: KEK envelope encryption and versioned secret storage
//!
//! Google Cloud KMS and Secret Manager clients speak the public REST APIs with
//! a bearer token from [`auth::find_access_token`]. [`local`] provides
//! in-process equivalents used for offline runs and tests.

pub mod auth;
pub mod envelope;
mod http;
pub mod local;
pub mod secret_store;

pub use auth::{find_access_token, AccessToken};
pub use envelope::{CloudKms, Envelope};
pub use local::{LocalEnvelope, MemorySecretStore};
pub use secret_store::{CreateOutcome, SecretManager, SecretStore};
