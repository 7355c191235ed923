//! KEK envelope encryption.
//!
//! A KEK never leaves the key service; callers only hand it short payloads
//! (the key passphrase) and get ciphertext back. Each call is independent.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use gpgkms_core::config::GcpConfig;
use gpgkms_core::{GpgKmsError, GpgKmsResult, KekRef};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

use crate::http::GcpHttp;

#[async_trait]
pub trait Envelope: Send + Sync {
    async fn encrypt(&self, kek: &KekRef, plaintext: &[u8]) -> GpgKmsResult<Vec<u8>>;
    async fn decrypt(&self, kek: &KekRef, ciphertext: &[u8]) -> GpgKmsResult<Zeroizing<Vec<u8>>>;
}

/// Google Cloud KMS over its REST API.
pub struct CloudKms {
    http: GcpHttp,
    endpoint: String,
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    plaintext: &'a str,
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    ciphertext: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
    #[serde(default)]
    plaintext: String,
}

impl CloudKms {
    pub fn new(config: &GcpConfig, token: SecretString) -> GpgKmsResult<Self> {
        Ok(Self {
            http: GcpHttp::new(token, Duration::from_secs(config.timeout_secs))?,
            endpoint: config.kms_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, kek: &KekRef, verb: &str) -> String {
        format!("{}/v1/{}:{verb}", self.endpoint, kek.resource_name())
    }
}

#[async_trait]
impl Envelope for CloudKms {
    async fn encrypt(&self, kek: &KekRef, plaintext: &[u8]) -> GpgKmsResult<Vec<u8>> {
        let encoded = Zeroizing::new(B64.encode(plaintext));
        let resp: EncryptResponse = self
            .http
            .post_json(
                &self.url(kek, "encrypt"),
                &EncryptRequest {
                    plaintext: &encoded,
                },
            )
            .await?;
        tracing::debug!(kek = %kek, "payload enveloped");
        B64.decode(resp.ciphertext.as_bytes())
            .map_err(|e| GpgKmsError::Other(anyhow::anyhow!("KMS returned invalid base64: {e}")))
    }

    async fn decrypt(&self, kek: &KekRef, ciphertext: &[u8]) -> GpgKmsResult<Zeroizing<Vec<u8>>> {
        let encoded = B64.encode(ciphertext);
        let resp: DecryptResponse = self
            .http
            .post_json(
                &self.url(kek, "decrypt"),
                &DecryptRequest {
                    ciphertext: &encoded,
                },
            )
            .await?;
        let encoded = Zeroizing::new(resp.plaintext);
        let plaintext = B64
            .decode(encoded.as_bytes())
            .map_err(|e| GpgKmsError::Other(anyhow::anyhow!("KMS returned invalid base64: {e}")))?;
        tracing::debug!(kek = %kek, "payload unveiled");
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout() {
        let config = GcpConfig {
            kms_endpoint: "https://kms.example/".into(),
            ..GcpConfig::default()
        };
        let kms = CloudKms::new(&config, SecretString::from("t".to_string())).unwrap();
        let kek: KekRef = "proj/ring/key".parse().unwrap();
        assert_eq!(
            kms.url(&kek, "encrypt"),
            "https://kms.example/v1/projects/proj/locations/global/keyRings/ring/cryptoKeys/key:encrypt"
        );
    }
}
