//! OpenDAL Operator factory for the plaintext bucket sink

use gpgkms_core::{GpgKmsError, GpgKmsResult};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

/// Minimal config needed to reach a GCS bucket
#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub bucket: String,
    /// OAuth2 access token; when absent OpenDAL falls back to its own
    /// credential loading (GOOGLE_APPLICATION_CREDENTIALS, VM metadata)
    pub token: Option<SecretString>,
}

/// Build an OpenDAL Operator for a Google Cloud Storage bucket
pub fn build_gcs_operator(cfg: &BucketConfig) -> GpgKmsResult<Operator> {
    if cfg.bucket.trim().is_empty() {
        return Err(GpgKmsError::Config("bucket name must not be empty".into()));
    }

    // opendal 0.55: builders use the consuming pattern
    let mut builder = opendal::services::Gcs::default().bucket(cfg.bucket.trim());
    if let Some(token) = &cfg.token {
        builder = builder.token(token.expose_secret().to_string());
    }

    let op = Operator::new(builder)
        .map_err(|e| GpgKmsError::Config(format!("creating OpenDAL GCS operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpgkms_core::ErrorKind;

    #[test]
    fn test_build_operator_valid() {
        let cfg = BucketConfig {
            bucket: "test-bucket".into(),
            token: Some(SecretString::from("ya29.test".to_string())),
        };
        assert!(build_gcs_operator(&cfg).is_ok(), "operator construction should succeed");
    }

    #[test]
    fn test_build_operator_rejects_blank_bucket() {
        let cfg = BucketConfig {
            bucket: "  ".into(),
            token: None,
        };
        assert_eq!(
            build_gcs_operator(&cfg).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }
}
