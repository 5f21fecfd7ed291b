//! Cancellation signals.
//!
//! A `CancelSignal` starts unfired and fires at most once. There are three
//! kinds:
//!
//! - manual, fired through a [`CancelHandle`] (reason `Cancelled`);
//! - deadline, fired automatically once a point in time passes (reason
//!   `TimedOut`);
//! - `any`, which fires as soon as one of its inputs fires, takes over that
//!   input's reason and remembers which input it was.
//!
//! Deadlines are evaluated lazily against `tokio::time::Instant`, so no
//! background task is needed and paused-clock tests stay deterministic.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    TimedOut,
}

/// Observable, cloneable cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
enum Inner {
    Manual {
        token: CancellationToken,
        fired_at: Option<Arc<OnceLock<Instant>>>,
    },
    Deadline(Instant),
    Any {
        inputs: Vec<CancelSignal>,
        first: OnceLock<Fired>,
    },
}

/// Which input of an `any` fired, why, and when.
#[derive(Debug, Clone, Copy)]
struct Fired {
    index: usize,
    reason: CancelReason,
    at: Instant,
}

impl CancelSignal {
    fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Signal that fires `after` has elapsed from now.
    pub fn timeout(after: Duration) -> Self {
        Self::deadline(Instant::now() + after)
    }

    pub fn deadline(at: Instant) -> Self {
        Self::from_inner(Inner::Deadline(at))
    }

    /// Logical OR over `inputs`.
    ///
    /// An empty input list never fires. The input that fired earliest wins,
    /// even when the combinator is only observed after several inputs have
    /// fired; ties go to the lowest index.
    pub fn any(inputs: impl IntoIterator<Item = CancelSignal>) -> Self {
        Self::from_inner(Inner::Any {
            inputs: inputs.into_iter().collect(),
            first: OnceLock::new(),
        })
    }

    pub fn is_fired(&self) -> bool {
        self.reason().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.fired_at().map(|(_, reason)| reason)
    }

    /// Index of the input that fired first. Only meaningful for `any`.
    pub fn fired_input(&self) -> Option<usize> {
        self.first_fired().map(|fired| fired.index)
    }

    /// When and why the signal fired.
    ///
    /// Tokens cancelled outside a `CancelHandle` carry no timestamp; they
    /// count as firing at the moment they are observed.
    fn fired_at(&self) -> Option<(Instant, CancelReason)> {
        match &*self.inner {
            Inner::Manual { token, fired_at } => {
                if !token.is_cancelled() {
                    return None;
                }
                let at = fired_at
                    .as_ref()
                    .and_then(|at| at.get().copied())
                    .unwrap_or_else(Instant::now);
                Some((at, CancelReason::Cancelled))
            }
            Inner::Deadline(at) => (Instant::now() >= *at).then_some((*at, CancelReason::TimedOut)),
            Inner::Any { .. } => self.first_fired().map(|fired| (fired.at, fired.reason)),
        }
    }

    fn first_fired(&self) -> Option<Fired> {
        let Inner::Any { inputs, first } = &*self.inner else {
            return None;
        };
        if let Some(fired) = first.get() {
            return Some(*fired);
        }
        let earliest = inputs
            .iter()
            .enumerate()
            .filter_map(|(index, input)| {
                input
                    .fired_at()
                    .map(|(at, reason)| Fired { index, reason, at })
            })
            .min_by_key(|fired| (fired.at, fired.index))?;
        Some(*first.get_or_init(|| earliest))
    }

    /// Resolves once the signal fires. Dropping the future is harmless.
    pub fn fired(&self) -> BoxFuture<'_, CancelReason> {
        match &*self.inner {
            Inner::Manual { token, .. } => async move {
                token.cancelled().await;
                CancelReason::Cancelled
            }
            .boxed(),
            Inner::Deadline(at) => {
                let at = *at;
                async move {
                    tokio::time::sleep_until(at).await;
                    CancelReason::TimedOut
                }
                .boxed()
            }
            Inner::Any { inputs, first } => async move {
                if let Some(fired) = self.first_fired() {
                    return fired.reason;
                }
                if inputs.is_empty() {
                    return future::pending().await;
                }
                let (reason, index, _) =
                    future::select_all(inputs.iter().map(CancelSignal::fired)).await;
                // select_all favours the lowest ready index; timestamps decide.
                match self.first_fired() {
                    Some(fired) => fired.reason,
                    None => {
                        let at = Instant::now();
                        first.get_or_init(|| Fired { index, reason, at }).reason
                    }
                }
            }
            .boxed(),
        }
    }
}

impl From<CancellationToken> for CancelSignal {
    fn from(token: CancellationToken) -> Self {
        Self::from_inner(Inner::Manual {
            token,
            fired_at: None,
        })
    }
}

/// Owner side of a manual signal.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    fired_at: Arc<OnceLock<Instant>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal::from_inner(Inner::Manual {
            token: self.token.clone(),
            fired_at: Some(self.fired_at.clone()),
        })
    }

    /// Fire the signal, stamping the moment for `any` ordering.
    pub fn cancel(&self) {
        self.fired_at.get_or_init(Instant::now);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
