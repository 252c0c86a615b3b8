//! Core types and events for usenet-webquery

use serde::{Deserialize, Serialize};

/// Unique identifier for a submitted query
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl QueryId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for QueryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a transport-level failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    /// The remote host refused the connection
    ConnectionRefused,
    /// The host name could not be resolved
    HostNotFound,
    /// The transport gave up waiting on the remote end
    Timeout,
    /// TLS handshake failure
    Tls,
    /// Redirect policy violation (loop, too many hops)
    Redirect,
    /// Malformed response or body decoding failure
    Protocol,
    /// HTTP 404
    ContentNotFound,
    /// HTTP 403
    AccessDenied,
    /// HTTP 401
    AuthenticationRequired,
    /// Any other non-success HTTP status
    HttpStatus(u16),
    /// Anything the transport could not classify
    Unknown,
}

impl NetworkErrorKind {
    /// Map a non-success HTTP status code to an error kind
    pub fn from_http_status(code: u16) -> Self {
        match code {
            401 => NetworkErrorKind::AuthenticationRequired,
            403 => NetworkErrorKind::AccessDenied,
            404 => NetworkErrorKind::ContentNotFound,
            other => NetworkErrorKind::HttpStatus(other),
        }
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkErrorKind::ConnectionRefused => f.write_str("connection refused"),
            NetworkErrorKind::HostNotFound => f.write_str("host not found"),
            NetworkErrorKind::Timeout => f.write_str("timeout"),
            NetworkErrorKind::Tls => f.write_str("SSL handshake failed"),
            NetworkErrorKind::Redirect => f.write_str("too many redirects"),
            NetworkErrorKind::Protocol => f.write_str("protocol failure"),
            NetworkErrorKind::ContentNotFound => f.write_str("content not found"),
            NetworkErrorKind::AccessDenied => f.write_str("access denied"),
            NetworkErrorKind::AuthenticationRequired => f.write_str("authentication required"),
            NetworkErrorKind::HttpStatus(code) => write!(f, "server replied with status {code}"),
            NetworkErrorKind::Unknown => f.write_str("unknown network"),
        }
    }
}

/// A transport failure reported verbatim to the query callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkError {
    /// Failure classification
    pub kind: NetworkErrorKind,
    /// Transport-provided detail
    pub message: String,
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Terminal status of a query as seen by its callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// The transport delivered a successful (2xx) response
    Success,
    /// The transport failed or the server answered with an error status
    NetworkError(NetworkError),
    /// The engine aborted the query after it exceeded its heartbeat budget
    TimedOut,
    /// The engine shut down while the query was still pending
    Canceled,
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyStatus::Success => f.write_str("success"),
            ReplyStatus::NetworkError(e) => write!(f, "{e}"),
            ReplyStatus::TimedOut => f.write_str("operation timed out"),
            ReplyStatus::Canceled => f.write_str("operation canceled"),
        }
    }
}

/// The single terminal answer a query receives
#[derive(Clone, Debug)]
pub struct Reply {
    /// The query this reply belongs to
    pub id: QueryId,
    /// Target URL of the query (including any auxiliary fields)
    pub url: url::Url,
    /// Terminal status
    pub status: ReplyStatus,
    /// HTTP status code, if the server answered at all
    pub http_status: Option<u16>,
    /// Response body (empty for timeouts, cancellations and transport failures)
    pub body: Vec<u8>,
}

impl Reply {
    /// Returns true if the transport delivered a successful response
    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// Response body as UTF-8 text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Events emitted by the query engine
///
/// Subscribe with [`WebEngine::subscribe`](crate::WebEngine::subscribe).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Query accepted into the pending collection
    Submitted {
        /// Query ID
        id: QueryId,
        /// Target URL
        url: String,
    },

    /// Query handed to the transport
    Admitted {
        /// Query ID
        id: QueryId,
    },

    /// Transport reported completion and the callback fired
    Completed {
        /// Query ID
        id: QueryId,
        /// Terminal status delivered to the callback
        status: ReplyStatus,
    },

    /// Query exceeded its heartbeat budget and was aborted
    TimedOut {
        /// Query ID
        id: QueryId,
    },

    /// Query was aborted by its caller and removed
    Aborted {
        /// Query ID
        id: QueryId,
    },

    /// The pending collection drained to empty
    AllFinished,

    /// Engine stopped
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: ReplyStatus, body: &[u8]) -> Reply {
        Reply {
            id: QueryId(1),
            url: url::Url::parse("http://example.com/api").unwrap(),
            status,
            http_status: Some(200),
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            NetworkErrorKind::from_http_status(404),
            NetworkErrorKind::ContentNotFound
        );
        assert_eq!(
            NetworkErrorKind::from_http_status(403),
            NetworkErrorKind::AccessDenied
        );
        assert_eq!(
            NetworkErrorKind::from_http_status(401),
            NetworkErrorKind::AuthenticationRequired
        );
        assert_eq!(
            NetworkErrorKind::from_http_status(503),
            NetworkErrorKind::HttpStatus(503)
        );
    }

    #[test]
    fn test_network_error_display() {
        let err = NetworkError {
            kind: NetworkErrorKind::ConnectionRefused,
            message: String::new(),
        };
        assert_eq!(err.to_string(), "connection refused");

        let err = NetworkError {
            kind: NetworkErrorKind::HostNotFound,
            message: "dns lookup failed".into(),
        };
        assert_eq!(err.to_string(), "host not found: dns lookup failed");
    }

    #[test]
    fn test_timeout_and_cancel_are_distinguishable() {
        assert_ne!(ReplyStatus::TimedOut, ReplyStatus::Canceled);
        assert_eq!(ReplyStatus::TimedOut.to_string(), "operation timed out");
        assert_eq!(ReplyStatus::Canceled.to_string(), "operation canceled");
    }

    #[test]
    fn test_reply_body_helpers() {
        let r = reply(ReplyStatus::Success, br#"{"version":"4.1.0"}"#);
        assert!(r.is_success());
        assert_eq!(r.text(), r#"{"version":"4.1.0"}"#);

        let value: serde_json::Value = r.json().unwrap();
        assert_eq!(value["version"], "4.1.0");

        let r = reply(ReplyStatus::TimedOut, b"");
        assert!(!r.is_success());
        assert!(r.json::<serde_json::Value>().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(Event::Admitted { id: QueryId(3) }).unwrap();
        assert_eq!(json["type"], "admitted");
        assert_eq!(json["id"], 3);

        let json = serde_json::to_value(Event::AllFinished).unwrap();
        assert_eq!(json["type"], "all_finished");
    }
}
