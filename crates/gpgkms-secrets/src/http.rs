//! Authenticated JSON transport shared by the Google API clients.

use gpgkms_core::{GpgKmsError, GpgKmsResult};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Google's error envelope: `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`
#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

pub(crate) struct GcpHttp {
    client: Client,
    token: SecretString,
}

impl GcpHttp {
    pub(crate) fn new(token: SecretString, timeout: Duration) -> GpgKmsResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GpgKmsError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self { client, token })
    }

    pub(crate) async fn post_json<B, R>(&self, url: &str, body: &B) -> GpgKmsResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self.send(self.client.post(url).json(body)).await?;
        decode(resp).await
    }

    pub(crate) async fn get_json<R: DeserializeOwned>(&self, url: &str) -> GpgKmsResult<R> {
        let resp = self.send(self.client.get(url)).await?;
        decode(resp).await
    }

    async fn send(&self, req: RequestBuilder) -> GpgKmsResult<Response> {
        let resp = req
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) => match body.error.status {
                Some(s) => format!("{s}: {}", body.error.message),
                None => body.error.message,
            },
            Err(_) if text.trim().is_empty() => status.to_string(),
            Err(_) => text.trim().to_string(),
        };
        Err(GpgKmsError::from_http_status(status.as_u16(), message))
    }
}

async fn decode<R: DeserializeOwned>(resp: Response) -> GpgKmsResult<R> {
    let url = resp.url().to_string();
    resp.json::<R>()
        .await
        .map_err(|e| GpgKmsError::Other(anyhow::anyhow!("malformed response from {url}: {e}")))
}

fn transport_error(e: reqwest::Error) -> GpgKmsError {
    if e.is_timeout() {
        GpgKmsError::Unavailable(format!("deadline exceeded: {e}"))
    } else if let Some(status) = e.status() {
        GpgKmsError::from_http_status(status.as_u16(), e.to_string())
    } else {
        // connect, DNS and TLS failures
        GpgKmsError::Unavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpgkms_core::ErrorKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http(timeout: Duration) -> GcpHttp {
        GcpHttp::new(SecretString::from("tok".to_string()), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_token_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let v: serde_json::Value = http(Duration::from_secs(5))
            .get_json(&format!("{}/ping", server.uri()))
            .await
            .unwrap();
        assert_eq!(v["ok"], true);
    }

    #[tokio::test]
    async fn test_google_error_body_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "caller lacks permission", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = http(Duration::from_secs(5))
            .get_json::<serde_json::Value>(&server.uri())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(err.to_string().contains("caller lacks permission"));
    }

    #[tokio::test]
    async fn test_deadline_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = http(Duration::from_millis(100))
            .get_json::<serde_json::Value>(&server.uri())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // nothing listens on port 9 of localhost in test environments
        let err = http(Duration::from_secs(2))
            .get_json::<serde_json::Value>("http://127.0.0.1:9/")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
