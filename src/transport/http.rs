//! `reqwest`-backed transport.

use super::{Completion, HttpRequest, Method, Transport, TransportHandle};
use crate::error::Result;
use crate::types::{NetworkError, NetworkErrorKind, ReplyStatus};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::HashMap;
use tokio::task::{AbortHandle, JoinError};

type Finished = BoxFuture<'static, (TransportHandle, std::result::Result<Completion, JoinError>)>;

/// HTTP transport running each request on its own tokio task
///
/// Aborting a handle aborts its task and forgets the handle, so a request
/// that is cancelled can never surface a completion afterwards.
pub struct HttpTransport {
    /// Shared HTTP client (connection pooling, redirects and TLS live here)
    client: reqwest::Client,
    /// Last handle issued
    next_handle: u64,
    /// Tasks that may still report, keyed by handle
    running: HashMap<TransportHandle, AbortHandle>,
    /// Join futures of every spawned task, including aborted ones
    finished: FuturesUnordered<Finished>,
}

impl HttpTransport {
    /// Create a transport with its own client sending the given User-Agent
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client))
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            next_handle: 0,
            running: HashMap::new(),
            finished: FuturesUnordered::new(),
        }
    }

    /// Number of operations that can still report a completion
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn submit(&mut self, request: HttpRequest) -> TransportHandle {
        self.next_handle += 1;
        let handle = TransportHandle(self.next_handle);

        tracing::debug!(%handle, method = ?request.method, url = %request.url, "starting HTTP request");

        let task = tokio::spawn(execute(self.client.clone(), handle, request));
        self.running.insert(handle, task.abort_handle());
        self.finished.push(async move { (handle, task.await) }.boxed());
        handle
    }

    fn abort(&mut self, handle: TransportHandle) {
        if let Some(task) = self.running.remove(&handle) {
            task.abort();
            tracing::debug!(%handle, "HTTP request aborted");
        }
    }

    async fn next_completion(&mut self) -> Option<Completion> {
        loop {
            let Some((handle, joined)) = self.finished.next().await else {
                // Nothing in flight; the engine will poll again after the next submit.
                return std::future::pending().await;
            };

            if self.running.remove(&handle).is_none() {
                // aborted
                continue;
            }

            match joined {
                Ok(completion) => return Some(completion),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    tracing::error!(%handle, error = %e, "HTTP request task failed");
                    return Some(Completion {
                        handle,
                        status: ReplyStatus::NetworkError(NetworkError {
                            kind: NetworkErrorKind::Unknown,
                            message: format!("request task failed: {e}"),
                        }),
                        http_status: None,
                        body: Vec::new(),
                    });
                }
            }
        }
    }
}

async fn execute(client: reqwest::Client, handle: TransportHandle, request: HttpRequest) -> Completion {
    let HttpRequest {
        method,
        url,
        headers,
        body,
    } = request;

    let mut builder = match method {
        Method::Get => client.get(url),
        Method::Post => client.post(url),
    };
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = body {
        builder = builder.body(body);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            return Completion {
                handle,
                status: ReplyStatus::NetworkError(classify(&e)),
                http_status: None,
                body: Vec::new(),
            };
        }
    };

    let code = response.status();
    let body = match response.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            return Completion {
                handle,
                status: ReplyStatus::NetworkError(classify(&e)),
                http_status: Some(code.as_u16()),
                body: Vec::new(),
            };
        }
    };

    let status = if code.is_success() {
        ReplyStatus::Success
    } else {
        ReplyStatus::NetworkError(NetworkError {
            kind: NetworkErrorKind::from_http_status(code.as_u16()),
            message: code.canonical_reason().unwrap_or_default().to_string(),
        })
    };

    Completion {
        handle,
        status,
        http_status: Some(code.as_u16()),
        body,
    }
}

/// Map a reqwest failure onto the error kinds callers branch on
pub(crate) fn classify(error: &reqwest::Error) -> NetworkError {
    let message = error_chain(error);
    let lower = message.to_lowercase();

    let kind = if error.is_timeout() {
        NetworkErrorKind::Timeout
    } else if error.is_redirect() {
        NetworkErrorKind::Redirect
    } else if error.is_body() || error.is_decode() {
        NetworkErrorKind::Protocol
    } else if error.is_connect() {
        if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
            NetworkErrorKind::HostNotFound
        } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl")
        {
            NetworkErrorKind::Tls
        } else {
            NetworkErrorKind::ConnectionRefused
        }
    } else {
        NetworkErrorKind::Unknown
    };

    NetworkError { kind, message }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
