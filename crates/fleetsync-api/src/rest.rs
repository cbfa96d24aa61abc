// REST fallback client
//
// Wraps `reqwest::Client` with the remote's URL layout and response shape.
// Used in degraded mode while the persistent channel is down: command
// submission and single-entity status fetch.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::protocol::{CommandRequest, CommandResponse};
use crate::transport::TransportConfig;

/// Longest body excerpt carried in error messages.
const BODY_PREVIEW_LEN: usize = 200;

/// HTTP client for the remote's REST surface.
///
/// Endpoints live under `{base_url}/api/v1/robots/{entity_id}`.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<SecretString>,
}

impl RestClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            auth_token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// The remote base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `POST /api/v1/robots/{entity_id}/commands`
    ///
    /// Returns the same outcome a `command_response` event would carry
    /// (see [`CommandResponse::into_outcome`]). A body with `success: false`
    /// becomes [`Error::Rejected`].
    pub async fn submit_command(
        &self,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let url = self.api_url(&["robots", &request.entity_id, "commands"])?;
        debug!(
            command_id = %request.command_id,
            command_type = %request.command_type,
            "POST {}",
            url
        );

        let builder = self.authorize(self.http.post(url).json(request).timeout(timeout));
        let resp = builder
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let body = self.parse_body(resp, timeout).await?;
        let response = CommandResponse::from_value(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.to_string(),
        })?;

        response
            .into_outcome()
            .map_err(|reason| Error::Rejected { reason })
    }

    /// `GET /api/v1/robots/{entity_id}`
    pub async fn fetch_status(&self, entity_id: &str, timeout: Duration) -> Result<Value, Error> {
        let url = self.api_url(&["robots", entity_id])?;
        debug!("GET {}", url);

        let builder = self.authorize(self.http.get(url).timeout(timeout));
        let resp = builder
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        self.parse_body(resp, timeout).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Build `{base}/api/v1/{segments...}` with each segment percent-encoded.
    fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Check the status and decode the JSON body.
    ///
    /// Non-success statuses become [`Error::Http`], with the message taken
    /// from a `detail`, `error`, or `message` field when the body is JSON.
    /// The request `timeout` also bounds the body read.
    async fn parse_body(&self, resp: reqwest::Response, timeout: Duration) -> Result<Value, Error> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        Error::Transport(err)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "error", "message"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str).map(String::from))
        })
        .unwrap_or_else(|| preview(body).to_owned())
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(BODY_PREVIEW_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
