use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Thin wrapper over `reqwest` that owns base-URL joining, bearer-token
/// injection and decoding of the backend `{success, data, message}`
/// envelope. All workflow services talk to the backend through this type.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| ServiceError::ConfigError(format!("Invalid api_base_url: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            auth_token: config.auth_token.clone(),
        })
    }

    /// Client against a bare base URL with default settings. Used by tests
    /// and short-lived tooling; production callers go through `AppConfig`.
    pub fn from_base_url(base_url: &str) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::ConfigError(format!("Invalid base url: {}", e)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            auth_token: None,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        let trimmed = path.trim_start_matches('/');
        // Url::join replaces the last path segment unless the base ends in '/'.
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(trimmed)
            .map_err(|e| ServiceError::InternalError(format!("Invalid request path {}: {}", path, e)))
    }

    /// GET returning the raw response body after status and `success: false`
    /// checks. List endpoints need the unstripped body so that
    /// `extract_collection` can apply its full shape priority.
    #[instrument(skip(self))]
    pub async fn get_raw(&self, path: &str) -> Result<Value, ServiceError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.get(url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::decode(response).await
    }

    /// GET returning the envelope `data` payload when the backend wraps the
    /// response, or the body itself when it does not.
    pub async fn get_data(&self, path: &str) -> Result<Value, ServiceError> {
        self.get_raw(path).await.map(unwrap_data)
    }

    /// POST returning the envelope `data` payload.
    #[instrument(skip(self, body))]
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ServiceError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::decode(response).await.map(unwrap_data)
    }

    /// Maps the HTTP status and the `{success, message}` envelope onto the
    /// error taxonomy: 404 is `NotFound`, any other non-2xx or an explicit
    /// `success: false` is `ExternalApiError` carrying the backend message.
    async fn decode(response: reqwest::Response) -> Result<Value, ServiceError> {
        let status = response.status();
        let body_text = response.text().await?;
        // Error responses may carry a non-JSON body (proxy pages, bare
        // text); only the success path demands well-formed JSON.
        let parsed: Option<Value> = serde_json::from_str(&body_text).ok();

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(
                parsed
                    .as_ref()
                    .and_then(remote_message)
                    .unwrap_or_else(|| "Resource not found".to_string()),
            ));
        }
        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(remote_message)
                .unwrap_or_else(|| format!("Backend returned status {}", status));
            return Err(ServiceError::ExternalApiError(message));
        }

        let body = if body_text.trim().is_empty() {
            Value::Null
        } else {
            parsed.ok_or_else(|| {
                ServiceError::SerializationError("Backend response was not valid JSON".to_string())
            })?
        };
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = remote_message(&body)
                .unwrap_or_else(|| "Backend reported a failure".to_string());
            return Err(ServiceError::ExternalApiError(message));
        }

        debug!(status = status.as_u16(), "Backend call succeeded");
        Ok(body)
    }
}

fn remote_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Normalizes the envelope shapes the backend is known to produce for list
/// endpoints. Accepted shapes, first match wins:
///
/// 1. a bare array
/// 2. `{<key>: [...]}`
/// 3. `{data: [...]}`
/// 4. `{data: {<key>: [...]}}`
///
/// Anything else yields `None`; call sites treat that as a contract
/// violation rather than guessing further.
pub(crate) fn extract_collection(body: &Value, key: &str) -> Option<Vec<Value>> {
    if let Value::Array(items) = body {
        return Some(items.clone());
    }
    if let Some(Value::Array(items)) = body.get(key) {
        return Some(items.clone());
    }
    match body.get("data") {
        Some(Value::Array(items)) => Some(items.clone()),
        Some(data) => match data.get(key) {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        },
        None => None,
    }
}
