//! The request wrapper.
//!
//! # Design
//! `FetchClient` holds an immutable `GlobalConfig`, a `Transport` and a
//! `CredentialProvider`. A call goes through three steps that are also
//! exposed on their own:
//!
//! 1. `build_request` merges headers, encodes the body and joins the URL;
//! 2. `effective_signal` combines the caller's signal with a timeout signal;
//! 3. `parse_response` classifies what came back.
//!
//! `request` glues them together around the transport and races the
//! in-flight call against the effective signal.
//!
//! Header layering, later layers winning on collision: built-in headers
//! (`authorization`, `content-type`, `x-app-version`), then per-call headers,
//! then the global defaults. Global defaults therefore beat per-call headers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::config::{GlobalConfig, RequestBody, RequestConfig};
use crate::credentials::{CredentialProvider, NoCredentials};
use crate::error::{FetchError, TransportError};
use crate::http::{Body, HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Async HTTP client with layered configuration and cancellable calls.
#[derive(Clone)]
pub struct FetchClient {
    config: GlobalConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FetchClient {
    /// Client using `UreqTransport` and no credentials.
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            config,
            transport: Arc::new(UreqTransport::new()),
            credentials: Arc::new(NoCredentials),
        }
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_credentials(mut self, credentials: impl CredentialProvider + 'static) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Resolve method, URL, headers, body and timeout for a call to `path`.
    pub fn build_request(&self, path: &str, config: &RequestConfig) -> Result<HttpRequest, FetchError> {
        if path.is_empty() {
            return Err(FetchError::InvalidRequest {
                reason: "path must not be empty".to_string(),
            });
        }
        let timeout = self.effective_timeout(config)?;

        let body = match &config.body {
            None => None,
            Some(RequestBody::Json(value)) => {
                let text = serde_json::to_string(value).map_err(|e| FetchError::InvalidRequest {
                    reason: format!("body is not serializable: {e}"),
                })?;
                Some(Body::Text(text))
            }
            Some(RequestBody::Binary { bytes, .. }) => Some(Body::Binary(bytes.clone())),
        };

        let mut headers = BTreeMap::new();
        if let Some(token) = self.credentials.token() {
            headers.insert("authorization".to_string(), format!("Bearer {token}"));
        }
        let content_type = match &config.body {
            Some(RequestBody::Binary { content_type, .. }) => content_type.clone(),
            _ => Some(JSON_CONTENT_TYPE.to_string()),
        };
        if let Some(content_type) = content_type {
            headers.insert("content-type".to_string(), content_type);
        }
        if let Some(version) = self.config.app_version() {
            headers.insert("x-app-version".to_string(), version.to_string());
        }
        for (name, value) in config.headers.iter().chain(self.config.default_headers()) {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        Ok(HttpRequest {
            method: config.resolved_method(),
            url: format!("{}{path}", self.config.base_url()),
            headers: headers.into_iter().collect(),
            body,
            timeout,
        })
    }

    /// Per-call timeout, falling back to the global default.
    pub fn effective_timeout(&self, config: &RequestConfig) -> Result<Option<Duration>, FetchError> {
        match config.timeout.or(self.config.default_timeout()) {
            Some(timeout) if timeout.is_zero() => Err(FetchError::InvalidRequest {
                reason: "timeout must be positive".to_string(),
            }),
            timeout => Ok(timeout),
        }
    }

    /// The signal handed to the transport: the caller's signal, a timeout
    /// signal, both OR-ed together, or nothing.
    pub fn effective_signal(&self, config: &RequestConfig) -> Result<Option<CancelSignal>, FetchError> {
        let timeout = self.effective_timeout(config)?;
        Ok(compose_signal(config.signal.clone(), timeout))
    }

    /// Classify a response to `method path` and decode its payload.
    pub fn parse_response<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        response: &HttpResponse,
    ) -> Result<T, FetchError> {
        if !response.is_success() {
            if response.status == 401 {
                warn!(%method, path, "session expired: server answered 401 Unauthorized");
            }
            return Err(FetchError::HttpStatus {
                method,
                path: path.to_string(),
                status: response.status,
            });
        }

        // Empty bodies (204 No Content) decode like JSON null.
        let body = match response.body.trim() {
            "" => "null",
            body => {
                if let Some(content_type) = response.header("content-type") {
                    if !content_type.to_ascii_lowercase().contains("json") {
                        return Err(FetchError::Network {
                            cause: format!("unexpected content type {content_type:?}"),
                        });
                    }
                }
                body
            }
        };
        serde_json::from_str(body).map_err(|e| FetchError::Network {
            cause: format!("malformed response body: {e}"),
        })
    }

    /// Issue a call to `path` and decode the payload as `T`.
    #[tracing::instrument(name = "fetch", skip(self, config), fields(method = tracing::field::Empty))]
    pub async fn request<T: DeserializeOwned>(&self, path: &str, config: RequestConfig) -> Result<T, FetchError> {
        let request = self.build_request(path, &config)?;
        let timeout = request.timeout;
        let signal = compose_signal(config.signal, timeout);
        let method = request.method;
        tracing::Span::current().record("method", method.as_str());

        if let Some(reason) = signal.as_ref().and_then(CancelSignal::reason) {
            debug!(?reason, "signal already fired, request not sent");
            return Err(FetchError::from_cancel(reason, timeout));
        }

        debug!(url = %request.url, ?timeout, "dispatching request");
        let send = self.transport.send(request, signal.clone());
        let result = match &signal {
            None => send.await,
            Some(signal) => tokio::select! {
                biased;
                reason = signal.fired() => {
                    debug!(?reason, input = ?signal.fired_input(), "request abandoned");
                    return Err(FetchError::from_cancel(reason, timeout));
                }
                result = send => result,
            },
        };

        let response = match result {
            Ok(response) => response,
            Err(TransportError::Aborted) => {
                let reason = signal.as_ref().and_then(CancelSignal::reason);
                return Err(match reason {
                    Some(reason) => FetchError::from_cancel(reason, timeout),
                    None => FetchError::Cancelled,
                });
            }
            Err(TransportError::Failed(cause)) => {
                debug!(%cause, "transport failed");
                return Err(FetchError::Network { cause });
            }
        };

        debug!(status = response.status, "response received");
        self.parse_response(method, path, &response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, config: RequestConfig) -> Result<T, FetchError> {
        self.request(path, config.method(HttpMethod::Get)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        config: RequestConfig,
    ) -> Result<T, FetchError> {
        self.request(path, config.method(HttpMethod::Post).body(body)).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        config: RequestConfig,
    ) -> Result<T, FetchError> {
        self.request(path, config.method(HttpMethod::Put).body(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, config: RequestConfig) -> Result<T, FetchError> {
        self.request(path, config.method(HttpMethod::Delete)).await
    }
}

fn compose_signal(caller: Option<CancelSignal>, timeout: Option<Duration>) -> Option<CancelSignal> {
    match (caller, timeout) {
        (caller, None) => caller,
        (None, Some(timeout)) => Some(CancelSignal::timeout(timeout)),
        (Some(caller), Some(timeout)) => Some(CancelSignal::any([caller, CancelSignal::timeout(timeout)])),
    }
}
