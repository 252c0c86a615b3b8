//! A single logical HTTP request and its lifecycle state.
//!
//! A [`Query`] is built by the caller (target, optional fields and attachment,
//! reply callback) and handed to the engine, which owns it from then on. The
//! engine drives it through the lifecycle:
//!
//! ```text
//! pending --submit--> active --receive--> retired (callback fired)
//!    |                  |----tick budget spent--> retired (TimedOut)
//!    |                  '----abort--> retired (no callback)
//!    '----abort--> reaped at the next heartbeat (no callback)
//! ```

use crate::error::Result;
use crate::multipart::{self, Attachment};
use crate::transport::{Completion, HttpRequest, Method, Transport, TransportHandle};
use crate::types::{QueryId, Reply, ReplyStatus};
use url::Url;

/// Reply callback; invoked at most once per query
pub type OnReply = Box<dyn FnOnce(Reply) + Send + 'static>;

/// One outbound HTTP request plus its single-shot reply callback
pub struct Query {
    url: Url,
    attachment: Option<Attachment>,
    on_reply: Option<OnReply>,
    /// Set while the transport owns an operation for this query
    handle: Option<TransportHandle>,
    /// Monotonic; an aborted query is never (re)submitted
    aborted: bool,
    /// Heartbeats seen since submission
    ticks: u32,
}

impl Query {
    /// Create a GET query for the given URL
    pub fn new(url: Url) -> Self {
        Self {
            url,
            attachment: None,
            on_reply: None,
            handle: None,
            aborted: false,
            ticks: 0,
        }
    }

    /// Create a query from a URL string
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Append a key/value pair to the target's query string
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Attach a file; a non-empty attachment turns the request into a
    /// multipart POST
    pub fn with_attachment(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.attachment = Some(Attachment::new(name, data));
        self
    }

    /// Set the reply callback, replacing any previous one
    pub fn on_reply<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        self.on_reply = Some(Box::new(callback));
        self
    }

    /// Target URL including auxiliary fields
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns true if the query will be sent as a multipart POST
    pub fn has_attachment(&self) -> bool {
        self.attachment.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Returns true while the transport owns an operation for this query
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns true once the query has been aborted
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Heartbeats seen since submission
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub(crate) fn take_reply_callback(&mut self) -> Option<OnReply> {
        self.on_reply.take()
    }

    /// Build the outbound request; the attachment payload is released here
    fn build_request(&mut self) -> HttpRequest {
        match self.attachment.take().filter(|a| !a.is_empty()) {
            Some(attachment) => HttpRequest {
                method: Method::Post,
                url: self.url.clone(),
                headers: vec![("Content-Type".to_string(), multipart::content_type())],
                body: Some(multipart::encode(&attachment)),
            },
            None => HttpRequest {
                method: Method::Get,
                url: self.url.clone(),
                headers: Vec::new(),
                body: None,
            },
        }
    }

    /// Hand the request to the transport
    ///
    /// Returns false without side effects if the query is aborted or already
    /// active.
    pub(crate) fn submit(&mut self, transport: &mut dyn Transport) -> bool {
        if self.aborted || self.is_active() {
            return false;
        }
        let request = self.build_request();
        let handle = transport.submit(request);
        tracing::debug!(url = %self.url, %handle, "query submitted");

        self.handle = Some(handle);
        self.ticks = 0;
        true
    }

    /// Count one heartbeat; returns false once the budget is spent
    pub(crate) fn tick(&mut self, max_ticks: u32) -> bool {
        self.ticks = self.ticks.saturating_add(1);
        self.ticks < max_ticks
    }

    /// Offer a completion to this query
    ///
    /// If the completion belongs to this query it is consumed and `Ok` is
    /// returned, carrying the status delivered to the callback (`None` when
    /// the query was aborted and stays silent). Otherwise the completion is
    /// handed back untouched.
    pub(crate) fn receive(
        &mut self,
        id: QueryId,
        completion: Completion,
    ) -> std::result::Result<Option<ReplyStatus>, Completion> {
        if self.handle != Some(completion.handle) {
            return Err(completion);
        }
        self.handle = None;

        if self.aborted {
            tracing::debug!(query_id = %id, "dropping reply for aborted query");
            return Ok(None);
        }

        tracing::debug!(query_id = %id, url = %self.url, status = %completion.status, "query completed");
        let status = completion.status.clone();
        self.deliver(Reply {
            id,
            url: self.url.clone(),
            status: completion.status,
            http_status: completion.http_status,
            body: completion.body,
        });
        Ok(Some(status))
    }

    /// Caller-initiated cancellation; never produces a reply
    ///
    /// If the query is active the transport operation is cancelled, which
    /// also suppresses its completion. The handle is kept so the engine can
    /// still recognise the query as admitted until it is reaped.
    pub(crate) fn abort(&mut self, transport: &mut dyn Transport) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.on_reply = None;
        if let Some(handle) = self.handle {
            transport.abort(handle);
        }
        tracing::debug!(url = %self.url, "query aborted");
    }

    /// Engine-initiated termination with a synthesized status
    ///
    /// Cancels any transport operation and, unless the caller already aborted
    /// the query, delivers `status` to the callback.
    pub(crate) fn terminate(&mut self, id: QueryId, transport: &mut dyn Transport, status: ReplyStatus) {
        if let Some(handle) = self.handle.take()
            && !self.aborted
        {
            transport.abort(handle);
        }
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.deliver(Reply {
            id,
            url: self.url.clone(),
            status,
            http_status: None,
            body: Vec::new(),
        });
    }

    fn deliver(&mut self, reply: Reply) {
        if let Some(callback) = self.on_reply.take() {
            callback(reply);
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("url", &self.url.as_str())
            .field("attachment", &self.attachment.as_ref().map(|a| &a.name))
            .field("handle", &self.handle)
            .field("aborted", &self.aborted)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_helpers::{MockTransport, completion};
    use std::sync::{Arc, Mutex};

    fn recording_query(url: &str) -> (Query, Arc<Mutex<Vec<Reply>>>) {
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replies);
        let query = Query::parse(url)
            .unwrap()
            .on_reply(move |reply| sink.lock().unwrap().push(reply));
        (query, replies)
    }

    #[test]
    fn test_submit_without_attachment_issues_get() {
        let mut transport = MockTransport::new();
        let (mut query, _) = recording_query("http://example.com/api?t=caps");

        assert!(query.submit(&mut transport));
        assert!(query.is_active());

        let submitted = transport.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1.method, Method::Get);
        assert_eq!(submitted[0].1.url.as_str(), "http://example.com/api?t=caps");
        assert!(submitted[0].1.body.is_none());
    }

    #[test]
    fn test_submit_with_attachment_issues_multipart_post() {
        let mut transport = MockTransport::new();
        let mut query = Query::parse("http://example.com/feedback.php")
            .unwrap()
            .with_field("type", "4")
            .with_attachment("crash.log", b"stack".to_vec());
        assert!(query.has_attachment());

        assert!(query.submit(&mut transport));

        let (_, request) = transport.submitted().remove(0);
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url.query(), Some("type=4"));
        assert!(request.headers.iter().any(|(k, v)| k == "Content-Type"
            && v == "multipart/form-data; boundary=--abcdef123abcdef123"));
        let body = String::from_utf8(request.body.unwrap()).unwrap();
        assert!(body.contains("filename=\"crash.log\""));
        assert!(body.contains("stack"));

        // payload is released once sent
        assert!(!query.has_attachment());
    }

    #[test]
    fn test_fields_are_url_encoded() {
        let query = Query::parse("http://example.com/feedback.php")
            .unwrap()
            .with_field("text", "hello world & more");
        assert_eq!(query.url().query(), Some("text=hello+world+%26+more"));
    }

    #[test]
    fn test_submit_refused_when_active_or_aborted() {
        let mut transport = MockTransport::new();
        let (mut query, _) = recording_query("http://example.com/");

        assert!(query.submit(&mut transport));
        assert!(!query.submit(&mut transport), "active query must not resubmit");
        assert_eq!(transport.submitted().len(), 1);

        let (mut aborted, _) = recording_query("http://example.com/");
        aborted.abort(&mut transport);
        assert!(!aborted.submit(&mut transport));
        assert_eq!(transport.submitted().len(), 1);
    }

    #[test]
    fn test_tick_expires_at_budget() {
        let mut transport = MockTransport::new();
        let (mut query, _) = recording_query("http://example.com/");
        query.submit(&mut transport);

        assert!(query.tick(3));
        assert!(query.tick(3));
        assert!(!query.tick(3));
        assert_eq!(query.ticks(), 3);
    }

    #[test]
    fn test_receive_matches_only_own_handle() {
        let mut transport = MockTransport::new();
        let (mut a, a_replies) = recording_query("http://example.com/a");
        let (mut b, b_replies) = recording_query("http://example.com/b");
        a.submit(&mut transport);
        b.submit(&mut transport);

        let handle_b = transport.submitted()[1].0;
        let event = completion(handle_b, ReplyStatus::Success, b"pong");

        let event = a.receive(QueryId(1), event).unwrap_err();
        assert!(a_replies.lock().unwrap().is_empty());
        assert!(a.is_active());

        let status = b.receive(QueryId(2), event).unwrap();
        assert_eq!(status, Some(ReplyStatus::Success));
        assert!(!b.is_active());

        let replies = b_replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, QueryId(2));
        assert_eq!(replies[0].text(), "pong");
    }

    #[test]
    fn test_receive_after_abort_claims_without_callback() {
        let mut transport = MockTransport::new();
        let (mut query, replies) = recording_query("http://example.com/");
        query.submit(&mut transport);
        let handle = transport.submitted()[0].0;

        query.abort(&mut transport);
        assert!(query.is_aborted());
        assert!(query.is_active());
        assert_eq!(transport.aborted(), vec![handle]);

        let claimed = query.receive(QueryId(1), completion(handle, ReplyStatus::Success, b""));
        assert_eq!(claimed.unwrap(), None);
        assert!(replies.lock().unwrap().is_empty());
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut transport = MockTransport::new();
        let (mut query, _) = recording_query("http://example.com/");
        query.submit(&mut transport);

        query.abort(&mut transport);
        query.abort(&mut transport);
        assert_eq!(transport.aborted().len(), 1);
    }

    #[test]
    fn test_terminate_fires_once_with_status() {
        let mut transport = MockTransport::new();
        let (mut query, replies) = recording_query("http://example.com/slow");
        query.submit(&mut transport);

        query.terminate(QueryId(9), &mut transport, ReplyStatus::TimedOut);
        query.terminate(QueryId(9), &mut transport, ReplyStatus::Canceled);

        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status, ReplyStatus::TimedOut);
        assert_eq!(transport.aborted().len(), 1);
        assert!(!query.is_active());
    }

    #[test]
    fn test_terminate_after_abort_is_silent() {
        let mut transport = MockTransport::new();
        let (mut query, replies) = recording_query("http://example.com/");
        query.abort(&mut transport);

        query.terminate(QueryId(1), &mut transport, ReplyStatus::Canceled);
        assert!(replies.lock().unwrap().is_empty());
    }
}
