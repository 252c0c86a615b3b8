//! Grouping related queries behind one readiness callback.

use super::{QueryRef, WebEngine};
use crate::error::Result;
use crate::query::Query;
use crate::types::QueryId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type OnReady = Box<dyn FnMut() + Send + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct GroupState {
    /// Grouped queries that have not replied yet; the pending count is its size
    outstanding: Mutex<HashMap<QueryId, QueryRef>>,
    on_ready: Mutex<Option<OnReady>>,
}

impl GroupState {
    fn new() -> Self {
        Self {
            outstanding: Mutex::new(HashMap::new()),
            on_ready: Mutex::new(None),
        }
    }

    /// Retire `id` after its reply; fires `on_ready` if it was the last one
    ///
    /// A reply for a query that is no longer tracked (the group was
    /// cancelled while the reply was being delivered) changes nothing.
    fn finish_one(&self, id: QueryId) {
        let drained = {
            let mut outstanding = lock(&self.outstanding);
            outstanding.remove(&id).is_some() && outstanding.is_empty()
        };
        if drained && let Some(callback) = lock(&self.on_ready).as_mut() {
            callback();
        }
    }

    fn pending(&self) -> usize {
        lock(&self.outstanding).len()
    }

    /// Stop tracking every grouped query and hand back their references
    fn take_all(&self) -> Vec<QueryRef> {
        lock(&self.outstanding).drain().map(|(_, query)| query).collect()
    }
}

/// A set of queries submitted together, such as the requests of one dialog
///
/// Tracks how many grouped queries have not replied yet and fires the
/// `on_ready` callback each time that count drops to zero. Cancelling the
/// group (or dropping it) aborts every grouped query still pending; aborted
/// queries never reply.
pub struct SubmissionGroup {
    engine: WebEngine,
    state: Arc<GroupState>,
}

impl SubmissionGroup {
    /// Create an empty group submitting through `engine`
    pub fn new(engine: &WebEngine) -> Self {
        Self {
            engine: engine.clone(),
            state: Arc::new(GroupState::new()),
        }
    }

    /// Set the callback fired when the last pending grouped query replies
    ///
    /// Runs on the engine task, after that query's own reply callback.
    pub fn on_ready<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        *lock(&self.state.on_ready) = Some(Box::new(callback));
    }

    /// Submit a query as part of this group
    pub fn submit(&mut self, mut query: Query) -> Result<QueryRef> {
        let inner = query.take_reply_callback();
        let state = Arc::clone(&self.state);
        let query = query.on_reply(move |reply| {
            let id = reply.id;
            if let Some(inner) = inner {
                inner(reply);
            }
            state.finish_one(id);
        });

        // Held across the send so the reply cannot be processed before the
        // query is tracked. Sending never waits on the engine task.
        let mut outstanding = lock(&self.state.outstanding);
        let query_ref = self.engine.submit(query)?;
        outstanding.insert(query_ref.id(), query_ref.clone());
        Ok(query_ref)
    }

    /// Grouped queries that have not replied yet
    pub fn pending(&self) -> usize {
        self.state.pending()
    }

    /// Returns true while any grouped query is awaiting its reply
    pub fn has_pending(&self) -> bool {
        self.pending() != 0
    }

    /// Abort every grouped query; neither reply nor ready callbacks follow
    pub fn cancel(&mut self) {
        let queries = self.state.take_all();
        if !queries.is_empty() {
            tracing::debug!(pending = queries.len(), "cancelling submission group");
        }
        for query in queries {
            query.abort();
        }
    }
}

impl Drop for SubmissionGroup {
    fn drop(&mut self) {
        self.cancel();
    }
}
