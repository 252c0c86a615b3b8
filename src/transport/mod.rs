//! Transport seam between the query engine and an HTTP client
//!
//! The engine never talks HTTP itself. It hands fully built requests to a
//! [`Transport`], keeps the returned [`TransportHandle`], and later matches
//! the [`Completion`] the transport yields back to the query that issued it.
//!
//! The default implementation is [`HttpTransport`], backed by `reqwest`.

mod http;

pub use http::HttpTransport;

use crate::types::ReplyStatus;
use async_trait::async_trait;

/// Opaque identifier correlating a completion with the request that caused it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportHandle(pub u64);

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// HTTP method of an outbound request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// Plain GET (query has no attachment)
    Get,
    /// multipart/form-data POST (query carries an attachment)
    Post,
}

/// A fully built outbound request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method
    pub method: Method,
    /// Target URL including query string
    pub url: url::Url,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Request body (POST only)
    pub body: Option<Vec<u8>>,
}

/// Terminal report for one transport operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Handle returned by [`Transport::submit`]
    pub handle: TransportHandle,
    /// Outcome as reported by the transport
    pub status: ReplyStatus,
    /// HTTP status code, if a response was received
    pub http_status: Option<u16>,
    /// Response body
    pub body: Vec<u8>,
}

/// An HTTP client the engine can drive
///
/// # Contract
///
/// - `submit` never blocks and always returns a fresh handle; failures are
///   reported later as a [`Completion`] with a network error status.
/// - After `abort(handle)` returns, `next_completion` never yields a
///   completion for that handle. Aborting an unknown or finished handle is a
///   no-op.
///
///   The engine depends on this. A query aborted while its operation is in
///   flight is removed at the next heartbeat without waiting for the
///   operation to finish. A completion yielded after that belongs to no query:
///   it is dropped, logged at `error` level, and trips a `debug_assert!`.
/// - `next_completion` must be cancel safe: the engine polls it inside
///   `tokio::select!` and drops the future whenever another branch wins. When
///   nothing is in flight it stays pending rather than returning `None`;
///   `None` means the transport is permanently closed.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Start an operation for the request
    fn submit(&mut self, request: HttpRequest) -> TransportHandle;

    /// Cancel an operation and suppress its completion
    fn abort(&mut self, handle: TransportHandle);

    /// Wait for the next finished operation
    async fn next_completion(&mut self) -> Option<Completion>;
}
