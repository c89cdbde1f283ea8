use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::api::error::{ApiError, Result};
use crate::api::multipart::MultipartForm;

/// Blocking HTTP client for the detection service and the user service.
///
/// Calls block the current thread; async callers go through
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct ApiClient {
    agent: ureq::Agent,
    detect_base: String,
    users_base: String,
}

impl ApiClient {
    pub fn new(detect_base: &str, users_base: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            detect_base: detect_base.trim_end_matches('/').to_string(),
            users_base: users_base.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL of a detection service endpoint.
    pub fn detect_url(&self, path: &str) -> String {
        format!("{}/{}", self.detect_base, path.trim_start_matches('/'))
    }

    /// Absolute URL of a user service endpoint.
    pub fn users_url(&self, path: &str) -> String {
        format!("{}/{}", self.users_base, path.trim_start_matches('/'))
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, action: &'static str, url: &str) -> Result<T> {
        tracing::debug!("GET {url}");
        read_json(action, self.agent.get(url).call())
    }

    /// POST `body` as JSON. Returns the raw response text, which callers
    /// decode leniently since some endpoints answer with an empty body.
    pub(crate) fn post_json<B: Serialize>(
        &self,
        action: &'static str,
        url: &str,
        body: &B,
    ) -> Result<String> {
        let json = serde_json::to_string(body).map_err(|e| ApiError::Decode {
            action,
            message: e.to_string(),
        })?;
        tracing::debug!("POST {url}");
        read_text(
            action,
            self.agent
                .post(url)
                .set("Content-Type", "application/json")
                .send_string(&json),
        )
    }

    pub(crate) fn post_multipart<T: DeserializeOwned>(
        &self,
        action: &'static str,
        url: &str,
        form: MultipartForm,
    ) -> Result<T> {
        let (content_type, body) = form.finish();
        tracing::debug!("POST {url} (multipart, {} bytes)", body.len());
        read_json(
            action,
            self.agent
                .post(url)
                .set("Content-Type", &content_type)
                .send_bytes(&body),
        )
    }
}

fn read_json<T: DeserializeOwned>(
    action: &'static str,
    response: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<T> {
    let body = read_text(action, response)?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        action,
        message: e.to_string(),
    })
}

fn read_text(
    action: &'static str,
    response: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<String> {
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(status, _)) => {
            return Err(ApiError::Status { action, status });
        }
        Err(e) => {
            return Err(ApiError::Transport {
                action,
                message: e.to_string(),
            });
        }
    };
    response.into_string().map_err(|e| ApiError::Transport {
        action,
        message: e.to_string(),
    })
}
