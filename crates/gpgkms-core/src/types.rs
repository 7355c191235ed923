use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::GpgKmsError;

/// Location used when a KEK reference does not name one.
pub const DEFAULT_KMS_LOCATION: &str = "global";

/// Reference to a key-encrypting key held by the external KMS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KekRef {
    pub project: String,
    pub location: String,
    pub keyring: String,
    pub key: String,
}

impl KekRef {
    pub fn new(
        project: impl Into<String>,
        keyring: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: DEFAULT_KMS_LOCATION.into(),
            keyring: keyring.into(),
            key: key.into(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Cloud KMS resource name of the crypto key.
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.project, self.location, self.keyring, self.key
        )
    }
}

impl fmt::Display for KekRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project, self.location, self.keyring, self.key
        )
    }
}

/// Parses `project/keyring/key` or `project/location/keyring/key`.
impl FromStr for KekRef {
    type Err = GpgKmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(GpgKmsError::Config(format!("invalid KEK reference: {s:?}")));
        }
        match parts.as_slice() {
            [project, keyring, key] => Ok(KekRef::new(*project, *keyring, *key)),
            [project, location, keyring, key] => {
                Ok(KekRef::new(*project, *keyring, *key).with_location(*location))
            }
            _ => Err(GpgKmsError::Config(format!(
                "KEK reference must be project/keyring/key or project/location/keyring/key, got {s:?}"
            ))),
        }
    }
}

const MAX_SECRET_ID_LEN: usize = 255;

/// A named secret inside a project scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretId {
    pub scope: String,
    pub id: String,
}

impl SecretId {
    pub fn new(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            id: id.into(),
        }
    }

    /// Reject names the secret store would misread once placed in a URL.
    /// Ids are 1-255 of `[A-Za-z0-9_-]`; the scope must be a single path segment.
    pub fn validate(&self) -> Result<(), GpgKmsError> {
        let id_ok = (1..=MAX_SECRET_ID_LEN).contains(&self.id.len())
            && self
                .id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !id_ok {
            return Err(GpgKmsError::Config(format!(
                "invalid secret id {:?}: expected 1-{MAX_SECRET_ID_LEN} letters, digits, '_' or '-'",
                self.id
            )));
        }
        if self.scope.is_empty() || self.scope.contains(['/', '?', '&', '#']) {
            return Err(GpgKmsError::Config(format!(
                "invalid secret scope {:?}",
                self.scope
            )));
        }
        Ok(())
    }

    /// Secret Manager resource name of the secret.
    pub fn resource_name(&self) -> String {
        format!("projects/{}/secrets/{}", self.scope, self.id)
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.id)
    }
}

/// Version selector for a secret: an explicit version number or the newest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionRef {
    #[default]
    Latest,
    Number(u64),
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRef::Latest => f.write_str("latest"),
            VersionRef::Number(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for VersionRef {
    type Err = GpgKmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionRef::Latest);
        }
        match s.parse::<u64>() {
            Ok(n) if n > 0 => Ok(VersionRef::Number(n)),
            _ => Err(GpgKmsError::Config(format!(
                "secret version must be a positive integer or \"latest\", got {s:?}"
            ))),
        }
    }
}

/// Where recovered plaintext goes. Exactly one sink is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Bucket(String),
}

impl OutputTarget {
    /// Pick the sink from the two mutually exclusive options.
    pub fn select(path: Option<PathBuf>, bucket: Option<String>) -> Result<Self, GpgKmsError> {
        let bucket = bucket.filter(|b| !b.trim().is_empty());
        match (path, bucket) {
            (Some(path), None) => Ok(OutputTarget::File(path)),
            (None, Some(bucket)) => Ok(OutputTarget::Bucket(bucket)),
            (Some(_), Some(_)) => Err(GpgKmsError::Config(
                "specify either an output path or a bucket name, not both".into(),
            )),
            (None, None) => Err(GpgKmsError::Config(
                "specify either an output path or a bucket name to store the output file".into(),
            )),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(path) => write!(f, "file:{}", path.display()),
            OutputTarget::Bucket(bucket) => write!(f, "bucket:{bucket}"),
        }
    }
}
