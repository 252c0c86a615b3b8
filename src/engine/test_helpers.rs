//! Shared test helpers: a scriptable in-memory transport.

use crate::transport::{Completion, HttpRequest, Transport, TransportHandle};
use crate::types::ReplyStatus;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct MockState {
    next_handle: u64,
    submitted: Vec<(TransportHandle, HttpRequest)>,
    aborted: Vec<TransportHandle>,
    ready: VecDeque<Completion>,
    /// When set, every submit immediately queues a completion with this status
    auto_reply: Option<ReplyStatus>,
}

/// In-memory transport; clones share state so a test can keep a controller
/// while the engine owns the transport.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
    notify: Arc<Notify>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A transport that answers every request with `status`
    pub(crate) fn replying(status: ReplyStatus) -> Self {
        let transport = Self::new();
        transport.state.lock().unwrap().auto_reply = Some(status);
        transport
    }

    pub(crate) fn submitted(&self) -> Vec<(TransportHandle, HttpRequest)> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub(crate) fn submitted_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    pub(crate) fn handle_of(&self, index: usize) -> TransportHandle {
        self.state.lock().unwrap().submitted[index].0
    }

    pub(crate) fn aborted(&self) -> Vec<TransportHandle> {
        self.state.lock().unwrap().aborted.clone()
    }

    /// Queue a completion for delivery through `next_completion`
    pub(crate) fn complete(&self, handle: TransportHandle, status: ReplyStatus, body: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .ready
            .push_back(completion(handle, status, body));
        self.notify.notify_one();
    }
}

/// Build a completion event for tests that drive dispatch by hand
pub(crate) fn completion(handle: TransportHandle, status: ReplyStatus, body: &[u8]) -> Completion {
    Completion {
        handle,
        status,
        http_status: Some(200),
        body: body.to_vec(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn submit(&mut self, request: HttpRequest) -> TransportHandle {
        let mut state = self.state.lock().unwrap();
        state.next_handle += 1;
        let handle = TransportHandle(state.next_handle);
        state.submitted.push((handle, request));
        if let Some(status) = state.auto_reply.clone() {
            state.ready.push_back(completion(handle, status, b"ok"));
            self.notify.notify_one();
        }
        handle
    }

    fn abort(&mut self, handle: TransportHandle) {
        let mut state = self.state.lock().unwrap();
        if !state.aborted.contains(&handle) {
            state.aborted.push(handle);
        }
        state.ready.retain(|c| c.handle != handle);
    }

    async fn next_completion(&mut self) -> Option<Completion> {
        loop {
            let next = {
                let mut state = self.state.lock().unwrap();
                let MockState { ready, aborted, .. } = &mut *state;
                ready.retain(|c| !aborted.contains(&c.handle));
                ready.pop_front()
            };
            if let Some(completion) = next {
                return Some(completion);
            }
            self.notify.notified().await;
        }
    }
}
