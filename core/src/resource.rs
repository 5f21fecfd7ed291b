//! Caller-side view of a request: value, loading flag and error.
//!
//! # Design
//! `Resource` is a small state machine driven by three events:
//!
//! - `begin` moves to `Loading` and hands out a `LoadTicket` whose signal
//!   cancels the call. A newer `begin` cancels the previous ticket, which is
//!   how search-as-you-type style superseding works.
//! - `settle` records the outcome of a ticket. Outcomes of superseded or
//!   cancelled tickets are ignored, and a `Cancelled` outcome never surfaces
//!   as an error.
//! - `cancel` abandons the in-flight load and returns to `Idle`.

use serde::de::DeserializeOwned;

use crate::cancel::{CancelHandle, CancelSignal};
use crate::client::FetchClient;
use crate::config::RequestConfig;
use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<T> {
    Idle,
    Loading,
    Succeeded(T),
    Failed(FetchError),
}

/// Proof that a load was started; pass it back to `Resource::settle`.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    signal: CancelSignal,
}

impl LoadTicket {
    pub fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }
}

#[derive(Debug)]
pub struct Resource<T> {
    state: ResourceState<T>,
    generation: u64,
    in_flight: Option<CancelHandle>,
    last: Option<(String, RequestConfig)>,
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Self {
            state: ResourceState::Idle,
            generation: 0,
            in_flight: None,
            last: None,
        }
    }
}

impl<T> Resource<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ResourceState<T> {
        &self.state
    }

    pub fn value(&self) -> Option<&T> {
        match &self.state {
            ResourceState::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, ResourceState::Loading)
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.state {
            ResourceState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Start a load, cancelling any load still in flight.
    pub fn begin(&mut self) -> LoadTicket {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
        self.generation += 1;
        let handle = CancelHandle::new();
        let ticket = LoadTicket {
            generation: self.generation,
            signal: handle.signal(),
        };
        self.in_flight = Some(handle);
        self.state = ResourceState::Loading;
        ticket
    }

    /// Record the outcome of `ticket`. Returns `false` when the ticket was
    /// superseded or cancelled and the outcome was dropped.
    pub fn settle(&mut self, ticket: &LoadTicket, outcome: Result<T, FetchError>) -> bool {
        if ticket.generation != self.generation || self.in_flight.is_none() {
            return false;
        }
        self.in_flight = None;
        self.state = match outcome {
            Ok(value) => ResourceState::Succeeded(value),
            Err(error) if error.is_cancelled() => ResourceState::Idle,
            Err(error) => ResourceState::Failed(error),
        };
        true
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.cancel();
            if self.is_loading() {
                self.state = ResourceState::Idle;
            }
        }
    }

    /// Cancel `ticket` if it is still the load in flight.
    fn abandon(&mut self, ticket: &LoadTicket) {
        if ticket.generation == self.generation {
            self.cancel();
        }
    }
}

/// A `load` in progress. Dropping it before it settles abandons the ticket.
struct PendingLoad<'a, T> {
    resource: &'a mut Resource<T>,
    ticket: LoadTicket,
    settled: bool,
}

impl<T> PendingLoad<'_, T> {
    fn settle(mut self, outcome: Result<T, FetchError>) {
        self.resource.settle(&self.ticket, outcome);
        self.settled = true;
    }
}

impl<T> Drop for PendingLoad<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.resource.abandon(&self.ticket);
        }
    }
}

impl<T: DeserializeOwned> Resource<T> {
    /// Run a full begin/request/settle cycle against `client`.
    ///
    /// Dropping the returned future mid-flight cancels the call and returns
    /// the resource to `Idle`.
    pub async fn load(&mut self, client: &FetchClient, path: &str, mut config: RequestConfig) -> &ResourceState<T> {
        let ticket = self.begin();
        let mut remembered = config.clone();
        remembered.signal = None;
        self.last = Some((path.to_string(), remembered));
        config.signal = Some(match config.signal.take() {
            Some(caller) => CancelSignal::any([ticket.signal(), caller]),
            None => ticket.signal(),
        });

        let pending = PendingLoad {
            resource: &mut *self,
            ticket,
            settled: false,
        };
        let outcome = client.request(path, config).await;
        pending.settle(outcome);
        &self.state
    }

    /// Repeat the last `load`. Stays `Idle` if nothing was loaded yet.
    pub async fn reload(&mut self, client: &FetchClient) -> &ResourceState<T> {
        match self.last.take() {
            Some((path, config)) => self.load(client, &path, config).await,
            None => &self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::GlobalConfig;
    use crate::error::TransportError;
    use crate::http::{HttpRequest, HttpResponse};
    use crate::transport::Transport;

    /// Transport that never answers and keeps the signal it was given.
    #[derive(Default)]
    struct HangingTransport {
        signal: Arc<Mutex<Option<CancelSignal>>>,
    }

    #[async_trait]
    impl Transport for HangingTransport {
        async fn send(
            &self,
            _request: HttpRequest,
            signal: Option<CancelSignal>,
        ) -> Result<HttpResponse, TransportError> {
            *self.signal.lock().unwrap() = signal;
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_load_cancels_and_returns_to_idle() {
        let transport = HangingTransport::default();
        let seen = transport.signal.clone();
        let client = FetchClient::new(GlobalConfig::new("https://api.example.com")).with_transport(transport);
        let mut resource: Resource<Vec<u64>> = Resource::new();

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            resource.load(&client, "/users", RequestConfig::new()),
        )
        .await;
        assert!(waited.is_err());

        assert!(!resource.is_loading());
        assert_eq!(resource.state(), &ResourceState::Idle);
        let signal = seen.lock().unwrap().clone().unwrap();
        assert!(signal.is_fired(), "abandoned call must be cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_load_does_not_touch_a_newer_load() {
        let client = FetchClient::new(GlobalConfig::new("https://api.example.com"))
            .with_transport(HangingTransport::default());
        let mut resource: Resource<Vec<u64>> = Resource::new();

        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            resource.load(&client, "/users", RequestConfig::new()),
        )
        .await;
        let ticket = resource.begin();
        assert!(resource.is_loading());
        assert!(resource.settle(&ticket, Ok(vec![1])));
        assert_eq!(resource.value(), Some(&vec![1]));
    }

    #[test]
    fn starts_idle() {
        let resource: Resource<Vec<u64>> = Resource::new();
        assert_eq!(resource.state(), &ResourceState::Idle);
        assert!(!resource.is_loading());
        assert!(resource.value().is_none());
        assert!(resource.error().is_none());
    }

    #[test]
    fn begin_then_settle_success() {
        let mut resource = Resource::new();
        let ticket = resource.begin();
        assert!(resource.is_loading());

        assert!(resource.settle(&ticket, Ok(vec![1u64, 2])));
        assert_eq!(resource.value(), Some(&vec![1, 2]));
        assert!(!resource.is_loading());
    }

    #[test]
    fn failure_is_exposed_as_error() {
        let mut resource: Resource<()> = Resource::new();
        let ticket = resource.begin();
        let failure = FetchError::Network {
            cause: "dns".to_string(),
        };
        resource.settle(&ticket, Err(failure.clone()));
        assert_eq!(resource.error(), Some(&failure));
    }

    #[test]
    fn cancelled_outcome_is_silent() {
        let mut resource: Resource<()> = Resource::new();
        let ticket = resource.begin();
        resource.settle(&ticket, Err(FetchError::Cancelled));
        assert_eq!(resource.state(), &ResourceState::Idle);
        assert!(resource.error().is_none());
    }

    #[test]
    fn newer_begin_supersedes_older_ticket() {
        let mut resource = Resource::new();
        let first = resource.begin();
        let second = resource.begin();

        assert!(first.signal().is_fired(), "superseded load must be cancelled");
        assert!(!second.signal().is_fired());

        assert!(!resource.settle(&first, Ok("stale")));
        assert!(resource.is_loading());
        assert!(resource.settle(&second, Ok("fresh")));
        assert_eq!(resource.value(), Some(&"fresh"));
    }

    #[test]
    fn cancel_returns_to_idle_and_drops_late_outcome() {
        let mut resource = Resource::new();
        let ticket = resource.begin();
        resource.cancel();

        assert!(ticket.signal().is_fired());
        assert_eq!(resource.state(), &ResourceState::Idle);
        assert!(!resource.settle(&ticket, Ok(1)));
        assert_eq!(resource.state(), &ResourceState::Idle);
    }

    #[test]
    fn settling_twice_is_ignored() {
        let mut resource = Resource::new();
        let ticket = resource.begin();
        assert!(resource.settle(&ticket, Ok(1)));
        assert!(!resource.settle(&ticket, Ok(2)));
        assert_eq!(resource.value(), Some(&1));
    }
}
