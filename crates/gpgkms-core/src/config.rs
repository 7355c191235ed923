use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GpgKmsError, GpgKmsResult};

/// Top-level configuration (loaded from gpgkms.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpgKmsConfig {
    pub gcp: GcpConfig,
    pub keygen: KeygenConfig,
    pub gpg: GpgConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl GpgKmsConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> GpgKmsResult<Self> {
        if !path.exists() {
            tracing::debug!("config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| GpgKmsError::io(path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| GpgKmsError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Google Cloud endpoints and the default KEK / secret scope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Project that owns the secrets and the KEK
    pub project_id: Option<String>,
    /// KMS location of the keyring (default: global)
    pub location: String,
    /// KMS keyring name of the KEK
    pub kms_keyring: Option<String>,
    /// KMS key name of the KEK
    pub kms_key: Option<String>,
    /// Deadline applied to every KMS / Secret Manager call
    pub timeout_secs: u64,
    pub kms_endpoint: String,
    pub secretmanager_endpoint: String,
    /// File holding an OAuth2 access token
    pub access_token_file: Option<PathBuf>,
}

/// Parameters of the generated OpenPGP keypair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeygenConfig {
    /// Real-name part of the user ID
    pub name_real: String,
    pub key_type: String,
    pub key_curve: String,
    pub subkey_type: String,
    pub subkey_curve: String,
    /// Expiry horizon in GnuPG notation (default: 2y)
    pub expire_date: String,
}

/// External GnuPG tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpgConfig {
    pub program: PathBuf,
    pub connect_agent_program: PathBuf,
    pub gpgconf_program: PathBuf,
    /// Also send RELOADAGENT to the user's default gpg-agent after a decrypt
    pub clear_default_agent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where `generate` writes the armored public key
    pub public_key_path: PathBuf,
    /// Object prefix for plaintext uploaded to a bucket
    pub bucket_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: crate::types::DEFAULT_KMS_LOCATION.into(),
            kms_keyring: None,
            kms_key: None,
            timeout_secs: 30,
            kms_endpoint: "https://cloudkms.googleapis.com".into(),
            secretmanager_endpoint: "https://secretmanager.googleapis.com".into(),
            access_token_file: None,
        }
    }
}

impl Default for KeygenConfig {
    fn default() -> Self {
        Self {
            name_real: "output-file-key".into(),
            key_type: "EDDSA".into(),
            key_curve: "ed25519".into(),
            subkey_type: "ECDH".into(),
            subkey_curve: "cv25519".into(),
            expire_date: "2y".into(),
        }
    }
}

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gpg"),
            connect_agent_program: PathBuf::from("gpg-connect-agent"),
            gpgconf_program: PathBuf::from("gpgconf"),
            clear_default_agent: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            public_key_path: PathBuf::from("public_key.asc"),
            bucket_prefix: "output_files".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[gcp]
project_id = "acme-prod"
location = "europe-west1"
kms_keyring = "gpg-ring"
kms_key = "passphrase-kek"
timeout_secs = 10

[keygen]
name_real = "batch-key"
expire_date = "1y"

[gpg]
program = "/usr/local/bin/gpg"
clear_default_agent = false

[output]
public_key_path = "/tmp/pub.asc"
bucket_prefix = "decrypted"

[logging]
level = "debug"
format = "json"
"#;
        let config: GpgKmsConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.gcp.project_id.as_deref(), Some("acme-prod"));
        assert_eq!(config.gcp.location, "europe-west1");
        assert_eq!(config.gcp.kms_keyring.as_deref(), Some("gpg-ring"));
        assert_eq!(config.gcp.timeout_secs, 10);
        assert_eq!(config.keygen.name_real, "batch-key");
        assert_eq!(config.keygen.expire_date, "1y");
        // untouched keygen fields keep their defaults
        assert_eq!(config.keygen.key_curve, "ed25519");
        assert_eq!(config.gpg.program, PathBuf::from("/usr/local/bin/gpg"));
        assert!(!config.gpg.clear_default_agent);
        assert_eq!(config.output.bucket_prefix, "decrypted");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: GpgKmsConfig = toml::from_str("").unwrap();

        assert!(config.gcp.project_id.is_none());
        assert_eq!(config.gcp.location, "global");
        assert_eq!(config.gcp.timeout_secs, 30);
        assert_eq!(config.gcp.kms_endpoint, "https://cloudkms.googleapis.com");
        assert_eq!(config.keygen.key_type, "EDDSA");
        assert_eq!(config.keygen.subkey_curve, "cv25519");
        assert_eq!(config.keygen.expire_date, "2y");
        assert_eq!(config.gpg.program, PathBuf::from("gpg"));
        assert!(config.gpg.clear_default_agent);
        assert_eq!(config.output.public_key_path, PathBuf::from("public_key.asc"));
        assert_eq!(config.output.bucket_prefix, "output_files");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = GpgKmsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: GpgKmsConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.gcp.location, parsed.gcp.location);
        assert_eq!(config.keygen.name_real, parsed.keygen.name_real);
        assert_eq!(config.output.public_key_path, parsed.output.public_key_path);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GpgKmsConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.gcp.timeout_secs, 30);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpgkms.toml");
        std::fs::write(&path, "[gcp\nproject_id = ").unwrap();
        let err = GpgKmsConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
