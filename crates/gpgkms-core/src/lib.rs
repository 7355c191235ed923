pub mod config;
pub mod error;
pub mod types;

pub use error::{ErrorKind, GpgKmsError, GpgKmsResult};
pub use types::{KekRef, OutputTarget, SecretId, VersionRef};
