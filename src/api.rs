//! HTTP client for the donor directory REST API.

use crate::model::{
    DonorFilters, DonorRecord, LoginRequest, LoginResponse, MessageBody, ProfileUpdate,
    RegistrationPayload, User,
};
use crate::storage::{self, Storage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("unauthorized: {}", .message.as_deref().unwrap_or("authentication required"))]
    Unauthorized { message: Option<String> },
    #[error("API error {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Status { status: u16, message: Option<String> },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The `message` the server put in its error body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { message } | Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Banner text: the server's message, else `fallback`.
    pub fn banner(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The remote endpoints this client consumes. A trait so tests can stand in
/// for the server.
pub trait DonorApi {
    fn register(&self, payload: &RegistrationPayload) -> ApiResult<()>;
    fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse>;
    fn profile(&self) -> ApiResult<User>;
    fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<()>;
    fn donors(&self, filters: &DonorFilters) -> ApiResult<Vec<DonorRecord>>;
    fn donor(&self, id: &str) -> ApiResult<DonorRecord>;
}

pub struct HttpApi {
    base_url: String,
    agent: ureq::Agent,
    storage: Rc<dyn Storage>,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout_ms: u64, storage: Rc<dyn Storage>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            storage,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with the JSON content type and, when a session token
    /// is stored, the bearer header.
    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "api request");
        let req = self
            .agent
            .request(method, &url)
            .set("Content-Type", "application/json");
        match storage::token(self.storage.as_ref()) {
            Some(token) => req.set("Authorization", &format!("Bearer {}", token)),
            None => req,
        }
    }

    fn finish(&self, result: Result<ureq::Response, ureq::Error>) -> ApiResult<ureq::Response> {
        match result {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(status_error(self.storage.as_ref(), code, &body))
            }
            Err(e) => {
                tracing::debug!(error = %e, "api transport failure");
                Err(ApiError::Network(e.to_string()))
            }
        }
    }

    fn send<B: Serialize>(&self, method: &str, path: &str, body: &B) -> ApiResult<ureq::Response> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.finish(self.request(method, path).send_json(value))
    }

    fn decode<T: DeserializeOwned>(resp: ureq::Response) -> ApiResult<T> {
        resp.into_json::<T>()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Map a non-2xx response to an [`ApiError`].
///
/// A 401 forces a local logout: the stored token and user are dropped here so
/// every caller observes it, without any redirect.
pub fn status_error(storage: &dyn Storage, status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<MessageBody>(body)
        .ok()
        .and_then(|b| b.message);

    if status == 401 {
        tracing::warn!("server rejected credentials, clearing stored session");
        if let Err(e) = storage::clear_session(storage) {
            tracing::warn!(error = %e, "failed to clear stored session");
        }
        return ApiError::Unauthorized { message };
    }

    tracing::debug!(status, body, "api error response");
    ApiError::Status { status, message }
}

impl DonorApi for HttpApi {
    fn register(&self, payload: &RegistrationPayload) -> ApiResult<()> {
        self.send("POST", "/register", payload)?;
        Ok(())
    }

    fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let resp = self.send("POST", "/login", &LoginRequest { email, password })?;
        Self::decode(resp)
    }

    fn profile(&self) -> ApiResult<User> {
        let resp = self.finish(self.request("GET", "/profile").call())?;
        Self::decode(resp)
    }

    fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<()> {
        self.send("PUT", "/update-profile", update)?;
        Ok(())
    }

    fn donors(&self, filters: &DonorFilters) -> ApiResult<Vec<DonorRecord>> {
        let mut req = self.request("GET", "/donors");
        for (key, value) in filters.query_pairs() {
            req = req.query(key, &value);
        }
        let resp = self.finish(req.call())?;
        Self::decode(resp)
    }

    fn donor(&self, id: &str) -> ApiResult<DonorRecord> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(ApiError::Status {
                status: 404,
                message: Some("Donor not found".to_string()),
            });
        }
        let resp = self.finish(self.request("GET", &format!("/donor/{}", id)).call())?;
        Self::decode(resp)
    }
}
