//! The network boundary.
//!
//! # Design
//! `FetchClient` never touches sockets itself. It hands a resolved
//! `HttpRequest` plus the effective cancellation signal to a `Transport` and
//! gets back an `HttpResponse` or a `TransportError`. 4xx/5xx responses are
//! data, not errors: status classification belongs to the client.
//!
//! `UreqTransport` runs the blocking ureq agent on tokio's blocking pool. When
//! the signal fires it stops waiting and detaches the blocking job; whatever
//! that job eventually reads is dropped. The request's effective timeout is
//! also handed to ureq, so a detached job stops within that bound instead of
//! holding a blocking thread until the server answers.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// "Send a request, get a response or a fault."
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request`. Implementations should give up with
    /// `TransportError::Aborted` once `signal` fires.
    async fn send(
        &self,
        request: HttpRequest,
        signal: Option<CancelSignal>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a ureq agent.
///
/// Clones share the agent and the in-flight count.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    in_flight: Arc<AtomicUsize>,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent,
            in_flight: Arc::default(),
        }
    }

    /// Number of blocking jobs still running, including detached ones.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Counts a blocking job for as long as it runs.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(
        &self,
        request: HttpRequest,
        signal: Option<CancelSignal>,
    ) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let counted = InFlight::enter(&self.in_flight);
        let task = tokio::task::spawn_blocking(move || {
            let _counted = counted;
            execute(&agent, request)
        });

        let joined = match signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.fired() => return Err(TransportError::Aborted),
                joined = task => joined,
            },
            None => task.await,
        };
        joined.map_err(|e| TransportError::Failed(format!("transport task failed: {e}")))?
    }
}

/// Apply headers and the per-request timeout to a ureq builder.
fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
    timeout: Option<Duration>,
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    match timeout {
        Some(timeout) => builder.config().timeout_global(Some(timeout)).build(),
        None => builder,
    }
}

fn execute(agent: &ureq::Agent, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let HttpRequest {
        method,
        url,
        headers,
        body,
        timeout,
    } = request;

    let result = match (method, body) {
        (HttpMethod::Get, _) => prepare(agent.get(&url), &headers, timeout).call(),
        (HttpMethod::Delete, _) => prepare(agent.delete(&url), &headers, timeout).call(),
        (HttpMethod::Post, Some(body)) => prepare(agent.post(&url), &headers, timeout).send(body.as_bytes()),
        (HttpMethod::Post, None) => prepare(agent.post(&url), &headers, timeout).send_empty(),
        (HttpMethod::Put, Some(body)) => prepare(agent.put(&url), &headers, timeout).send(body.as_bytes()),
        (HttpMethod::Put, None) => prepare(agent.put(&url), &headers, timeout).send_empty(),
    };
    let mut response = result.map_err(|e| TransportError::Failed(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| TransportError::Failed(format!("reading response body: {e}")))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
