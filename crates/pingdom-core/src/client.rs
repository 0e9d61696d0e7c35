//! Pingdom 3.1 HTTP client.
//!
//! Implements [`ChecksApi`] and [`OutageApi`] on top of `reqwest`. Every call
//! is a single request with the configured timeout; failures are returned to
//! the caller as-is.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::api::{ApiError, CheckFilter, ChecksApi, OutageApi};
use crate::config::ConfigError;
use crate::model::{Check, OutageInterval, OutageWindow};

pub const DEFAULT_BASE_URL: &str = "https://api.pingdom.com/api/3.1";

#[derive(Deserialize)]
struct ChecksEnvelope {
    #[serde(default)]
    checks: Vec<Check>,
}

#[derive(Deserialize)]
struct OutageEnvelope {
    summary: OutageSummary,
}

#[derive(Deserialize)]
struct OutageSummary {
    #[serde(default)]
    states: Vec<OutageInterval>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    statuscode: u16,
    #[serde(default)]
    statusdesc: String,
    #[serde(default)]
    errormessage: String,
}

/// Authenticated Pingdom API handle.
#[derive(Clone)]
pub struct PingdomClient {
    http: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for PingdomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingdomClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PingdomClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pingdom-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    /// Points the client at another API root (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        trace!(%url, "pingdom request");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Maps a non-2xx response to an [`ApiError::Api`], using Pingdom's error
/// envelope when the body carries one.
fn error_from_body(status: StatusCode, body: &[u8]) -> ApiError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(env) => ApiError::Api {
            status: if env.error.statuscode == 0 {
                status.as_u16()
            } else {
                env.error.statuscode
            },
            description: env.error.statusdesc,
            message: env.error.errormessage,
        },
        Err(_) => ApiError::Api {
            status: status.as_u16(),
            description: status.canonical_reason().unwrap_or_default().to_string(),
            message: String::from_utf8_lossy(body).trim().to_string(),
        },
    }
}

impl ChecksApi for PingdomClient {
    async fn list_checks(&self, filter: &CheckFilter) -> Result<Vec<Check>, ApiError> {
        let mut query = vec![("include_tags", filter.include_tags.to_string())];
        if !filter.tags.is_empty() {
            query.push(("tags", filter.tags.clone()));
        }
        let env: ChecksEnvelope = self.get("/checks", &query).await?;
        Ok(env.checks)
    }
}

impl OutageApi for PingdomClient {
    async fn list_outages(
        &self,
        check_id: i64,
        window: OutageWindow,
    ) -> Result<Vec<OutageInterval>, ApiError> {
        let query = [
            ("from", window.from.to_string()),
            ("to", window.to.to_string()),
        ];
        let env: OutageEnvelope = self
            .get(&format!("/summary.outage/{}", check_id), &query)
            .await?;
        Ok(env.summary.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            PingdomClient::new("  ", Duration::from_secs(1)),
            Err(ConfigError::MissingToken)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let c = PingdomClient::new("t", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://127.0.0.1:1/api/");
        assert_eq!(c.base_url(), "http://127.0.0.1:1/api");
    }

    #[test]
    fn test_debug_hides_token() {
        let c = PingdomClient::new("secret-token", Duration::from_secs(1)).unwrap();
        assert!(!format!("{:?}", c).contains("secret-token"));
    }

    #[test]
    fn test_error_envelope() {
        let body = br#"{"error":{"statuscode":403,"statusdesc":"Forbidden","errormessage":"Invalid token"}}"#;
        match error_from_body(StatusCode::FORBIDDEN, body) {
            ApiError::Api {
                status,
                description,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(description, "Forbidden");
                assert_eq!(message, "Invalid token");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_without_envelope() {
        match error_from_body(StatusCode::BAD_GATEWAY, b"upstream down\n") {
            ApiError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_outage_envelope_decodes() {
        let json = r#"{"summary":{"states":[
            {"status":"up","timefrom":1293143523,"timeto":1294180263},
            {"status":"down","timefrom":1294180263,"timeto":1294180323}
        ]}}"#;
        let env: OutageEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.summary.states.len(), 2);
        assert_eq!(env.summary.states[1].duration_seconds(), 60.0);
    }
}
