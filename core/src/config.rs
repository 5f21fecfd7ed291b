//! Client-wide and per-call configuration.
//!
//! # Design
//! `GlobalConfig` is fixed when a `FetchClient` is built and never mutated
//! afterwards; every call through that client reads the same values.
//! `RequestConfig` describes one call and is consumed by it.
//!
//! Header maps are keyed by lowercase name so that merging is a plain map
//! overwrite regardless of how callers spelled the names.
//!
//! A default timeout is always positive: every constructor rejects zero, so a
//! client that builds can issue calls.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::error::FetchError;
use crate::http::HttpMethod;

pub const ENV_BASE_URL: &str = "FETCH_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "FETCH_TIMEOUT_MS";
pub const ENV_APP_VERSION: &str = "FETCH_APP_VERSION";
pub const ENV_HEADERS: &str = "FETCH_HEADERS";

/// Settings shared by every call issued through one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    base_url: String,
    #[serde(default, deserialize_with = "deserialize_headers")]
    default_headers: BTreeMap<String, String>,
    #[serde(
        rename = "default_timeout_ms",
        default,
        skip_serializing_if = "Option::is_none",
        with = "timeout_ms"
    )]
    default_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_version: Option<String>,
}

impl GlobalConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers: BTreeMap::new(),
            default_timeout: None,
            app_version: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Set the timeout used by calls that carry none. Zero is rejected.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Result<Self, FetchError> {
        if timeout.is_zero() {
            return Err(FetchError::InvalidRequest {
                reason: "default timeout must be positive".to_string(),
            });
        }
        self.default_timeout = Some(timeout);
        Ok(self)
    }

    pub fn with_app_version(mut self, version: &str) -> Self {
        self.app_version = Some(version.to_string());
        self
    }

    /// Parse a JSON document such as
    /// `{"base_url": "...", "default_headers": {...}, "default_timeout_ms": 4000}`.
    pub fn from_json(raw: &str) -> Result<Self, FetchError> {
        let mut config: GlobalConfig =
            serde_json::from_str(raw).map_err(|e| FetchError::InvalidRequest {
                reason: format!("global config: {e}"),
            })?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Read the configuration from `FETCH_*` environment variables.
    ///
    /// `FETCH_BASE_URL` is required. `FETCH_HEADERS` is a comma separated
    /// list of `name=value` pairs.
    pub fn from_env() -> Result<Self, FetchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FetchError> {
        let base_url = lookup(ENV_BASE_URL).ok_or_else(|| FetchError::InvalidRequest {
            reason: format!("{ENV_BASE_URL} is not set"),
        })?;
        let mut config = GlobalConfig::new(&base_url);

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| FetchError::InvalidRequest {
                reason: format!("{ENV_TIMEOUT_MS} must be a number of milliseconds, got {raw:?}"),
            })?;
            config = config
                .with_default_timeout(Duration::from_millis(ms))
                .map_err(|_| FetchError::InvalidRequest {
                    reason: format!("{ENV_TIMEOUT_MS} must be positive, got {raw:?}"),
                })?;
        }
        if let Some(version) = lookup(ENV_APP_VERSION) {
            config = config.with_app_version(&version);
        }
        if let Some(raw) = lookup(ENV_HEADERS) {
            for pair in raw.split(',').filter(|pair| !pair.trim().is_empty()) {
                let (name, value) = pair.split_once('=').ok_or_else(|| FetchError::InvalidRequest {
                    reason: format!("{ENV_HEADERS} entry {pair:?} is not name=value"),
                })?;
                config = config.with_header(name.trim(), value.trim());
            }
        }
        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect())
}

/// `default_timeout_ms` on the wire: whole milliseconds, never zero.
mod timeout_ms {
    use std::time::Duration;

    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timeout: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match timeout {
            // Round up so a sub-millisecond timeout does not come back as zero.
            Some(timeout) => {
                let ms = u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).map_err(ser::Error::custom)?;
                serializer.serialize_some(&ms)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        match Option::<u64>::deserialize(deserializer)? {
            Some(0) => Err(de::Error::custom("default_timeout_ms must be positive")),
            ms => Ok(ms.map(Duration::from_millis)),
        }
    }
}

/// Request body before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured payload, serialized to JSON text before sending.
    Json(serde_json::Value),
    /// Opaque binary form (file or form upload), sent byte for byte.
    Binary {
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, FetchError> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| FetchError::InvalidRequest {
                reason: format!("body is not serializable: {e}"),
            })
    }

    pub fn binary(content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        RequestBody::Binary {
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

/// Options for a single call.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub method: Option<HttpMethod>,
    pub body: Option<RequestBody>,
    pub headers: BTreeMap<String, String>,
    pub signal: Option<CancelSignal>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resolved_method(&self) -> HttpMethod {
        self.method.unwrap_or_default()
    }
}
