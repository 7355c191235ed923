//! Google OAuth access token discovery chain

use gpgkms_core::config::GcpConfig;
use gpgkms_core::{GpgKmsError, GpgKmsResult};
use secrecy::SecretString;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;

pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const PROBE_DEADLINE: Duration = Duration::from_secs(3);

/// A bearer token and where it came from.
pub struct AccessToken {
    pub token: SecretString,
    pub source: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Discover an access token using the priority chain:
///   1. $GOOGLE_OAUTH_ACCESS_TOKEN
///   2. config.access_token_file (from gpgkms.toml)
///   3. `gcloud auth print-access-token`
///   4. GCE metadata server (default service account)
pub async fn find_access_token(config: &GcpConfig) -> GpgKmsResult<AccessToken> {
    // 1. explicit env var
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(AccessToken {
                token: SecretString::from(token.trim().to_string()),
                source: format!("{TOKEN_ENV} (env)"),
            });
        }
    }

    // 2. token file
    if let Some(path) = &config.access_token_file {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GpgKmsError::io(path.display(), e))?;
        let token = content.trim();
        if token.is_empty() {
            return Err(GpgKmsError::Config(format!(
                "access token file {} is empty",
                path.display()
            )));
        }
        return Ok(AccessToken {
            token: SecretString::from(token.to_string()),
            source: format!("config:{}", path.display()),
        });
    }

    // 3. gcloud CLI
    if let Some(token) = gcloud_token().await {
        return Ok(AccessToken {
            token: SecretString::from(token),
            source: "gcloud".into(),
        });
    }

    // 4. metadata server
    if let Some(token) = metadata_token(METADATA_TOKEN_URL).await {
        return Ok(AccessToken {
            token: SecretString::from(token),
            source: "metadata".into(),
        });
    }

    Err(GpgKmsError::PermissionDenied(format!(
        "no Google access token found. Tried: ${TOKEN_ENV}, [gcp].access_token_file, \
         `gcloud auth print-access-token` and the GCE metadata server"
    )))
}

async fn gcloud_token() -> Option<String> {
    let mut cmd = tokio::process::Command::new("gcloud");
    cmd.args(["auth", "print-access-token"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(PROBE_DEADLINE * 5, cmd.output()).await {
        Ok(Ok(out)) if out.status.success() => {
            let token = String::from_utf8(out.stdout).ok()?.trim().to_string();
            (!token.is_empty()).then_some(token)
        }
        Ok(Ok(out)) => {
            tracing::debug!(status = %out.status, "gcloud did not print an access token");
            None
        }
        Ok(Err(e)) => {
            tracing::debug!("gcloud not available: {e}");
            None
        }
        Err(_) => {
            tracing::debug!("gcloud timed out");
            None
        }
    }
}

async fn metadata_token(url: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_DEADLINE)
        .build()
        .ok()?;
    let resp = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| tracing::debug!("metadata server unreachable: {e}"))
        .ok()?;
    if !resp.status().is_success() {
        tracing::debug!(status = %resp.status(), "metadata server refused token request");
        return None;
    }
    resp.json::<MetadataToken>()
        .await
        .ok()
        .map(|t| t.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpgkms_core::ErrorKind;
    use secrecy::ExposeSecret;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // env-dependent branches are not exercised here; tests run in parallel
    // and share the process environment

    #[tokio::test]
    async fn test_token_file_is_trimmed() {
        if std::env::var(TOKEN_ENV).is_ok() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "ya29.abc\n").unwrap();
        let config = GcpConfig {
            access_token_file: Some(path),
            ..GcpConfig::default()
        };

        let found = find_access_token(&config).await.unwrap();
        assert_eq!(found.token.expose_secret(), "ya29.abc");
        assert!(found.source.starts_with("config:"));
        assert!(!format!("{found:?}").contains("ya29"));
    }

    #[tokio::test]
    async fn test_missing_token_file_is_io_error() {
        if std::env::var(TOKEN_ENV).is_ok() {
            return;
        }
        let config = GcpConfig {
            access_token_file: Some("/nonexistent/token".into()),
            ..GcpConfig::default()
        };
        let err = find_access_token(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_metadata_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.meta", "expires_in": 3599, "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        assert_eq!(metadata_token(&server.uri()).await.as_deref(), Some("ya29.meta"));
    }

    #[tokio::test]
    async fn test_metadata_refusal_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        assert!(metadata_token(&server.uri()).await.is_none());
    }
}
