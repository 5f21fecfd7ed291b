//! Async HTTP request wrapper with layered configuration and cancellation.
//!
//! # Overview
//! `FetchClient` merges client-wide defaults with per-call options, races
//! each call against a cancellation signal (the caller's own, a timeout, or
//! both), and classifies the result into a decoded payload or exactly one
//! `FetchError`.
//!
//! # Design
//! - The network is behind the `Transport` trait; `UreqTransport` is the
//!   default implementation and tests substitute their own.
//! - `GlobalConfig` is immutable once the client is built.
//! - Global default headers beat per-call headers on collision.
//! - `Resource` is an optional caller-side state machine (value, loading,
//!   error) that supersedes stale loads.

pub mod cancel;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod resource;
pub mod transport;

pub use cancel::{CancelHandle, CancelReason, CancelSignal};
pub use client::FetchClient;
pub use config::{GlobalConfig, RequestBody, RequestConfig};
pub use credentials::{CredentialProvider, EnvToken, NoCredentials, StaticToken};
pub use error::{FetchError, TransportError};
pub use http::{Body, HttpMethod, HttpRequest, HttpResponse};
pub use resource::{LoadTicket, Resource, ResourceState};
pub use transport::{Transport, UreqTransport};
