//! Versioned opaque secret storage.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use gpgkms_core::config::GcpConfig;
use gpgkms_core::{GpgKmsError, GpgKmsResult, SecretId, VersionRef};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

use crate::http::GcpHttp;

/// Result of [`SecretStore::create_if_absent`]. An existing secret is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyPresent,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn create_if_absent(&self, secret: &SecretId) -> GpgKmsResult<CreateOutcome>;

    /// Append a new version holding `payload`; returns its version number.
    async fn put_version(&self, secret: &SecretId, payload: &[u8]) -> GpgKmsResult<VersionRef>;

    async fn get_version(
        &self,
        secret: &SecretId,
        version: &VersionRef,
    ) -> GpgKmsResult<Zeroizing<Vec<u8>>>;
}

/// Google Secret Manager over its REST API.
pub struct SecretManager {
    http: GcpHttp,
    endpoint: String,
}

#[derive(Serialize)]
struct CreateSecretRequest {
    replication: Replication,
}

#[derive(Serialize)]
struct Replication {
    automatic: Automatic,
}

#[derive(Serialize)]
struct Automatic {}

#[derive(Serialize)]
struct AddVersionRequest<'a> {
    payload: PayloadOut<'a>,
}

#[derive(Serialize)]
struct PayloadOut<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
struct SecretResource {
    name: String,
}

#[derive(Deserialize)]
struct VersionResource {
    name: String,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: PayloadIn,
}

#[derive(Deserialize)]
struct PayloadIn {
    #[serde(default)]
    data: String,
}

impl SecretManager {
    pub fn new(config: &GcpConfig, token: SecretString) -> GpgKmsResult<Self> {
        Ok(Self {
            http: GcpHttp::new(token, Duration::from_secs(config.timeout_secs))?,
            endpoint: config.secretmanager_endpoint.trim_end_matches('/').to_string(),
        })
    }
}

/// `projects/p/secrets/s/versions/3` → `3`
fn version_from_name(name: &str) -> GpgKmsResult<VersionRef> {
    name.rsplit('/')
        .next()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .map(VersionRef::Number)
        .ok_or_else(|| {
            GpgKmsError::Other(anyhow::anyhow!(
                "Secret Manager returned unexpected version name {name:?}"
            ))
        })
}

#[async_trait]
impl SecretStore for SecretManager {
    async fn create_if_absent(&self, secret: &SecretId) -> GpgKmsResult<CreateOutcome> {
        let url = format!(
            "{}/v1/projects/{}/secrets?secretId={}",
            self.endpoint, secret.scope, secret.id
        );
        let body = CreateSecretRequest {
            replication: Replication {
                automatic: Automatic {},
            },
        };
        match self.http.post_json::<_, SecretResource>(&url, &body).await {
            Ok(created) => {
                tracing::info!(secret_id = %secret, name = %created.name, "secret created");
                Ok(CreateOutcome::Created)
            }
            Err(GpgKmsError::AlreadyExists(_)) => {
                tracing::debug!(secret_id = %secret, "secret already exists");
                Ok(CreateOutcome::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    async fn put_version(&self, secret: &SecretId, payload: &[u8]) -> GpgKmsResult<VersionRef> {
        let url = format!("{}/v1/{}:addVersion", self.endpoint, secret.resource_name());
        let data = Zeroizing::new(B64.encode(payload));
        let created: VersionResource = self
            .http
            .post_json(
                &url,
                &AddVersionRequest {
                    payload: PayloadOut { data: &data },
                },
            )
            .await?;
        let version = version_from_name(&created.name)?;
        tracing::info!(secret_id = %secret, %version, "secret version added");
        Ok(version)
    }

    async fn get_version(
        &self,
        secret: &SecretId,
        version: &VersionRef,
    ) -> GpgKmsResult<Zeroizing<Vec<u8>>> {
        let url = format!(
            "{}/v1/{}/versions/{version}:access",
            self.endpoint,
            secret.resource_name()
        );
        let resp: AccessResponse = self.http.get_json(&url).await?;
        let encoded = Zeroizing::new(resp.payload.data);
        let payload = B64.decode(encoded.as_bytes()).map_err(|e| {
            GpgKmsError::Other(anyhow::anyhow!("secret payload is not valid base64: {e}"))
        })?;
        tracing::debug!(secret_id = %secret, %version, "secret version accessed");
        Ok(Zeroizing::new(payload))
    }
}
