//! Pending query collection and the per-heartbeat state machine.
//!
//! This is the synchronous heart of the engine. It never waits on anything:
//! the actor in [`task`](super::task) feeds it heartbeats, completions and
//! caller commands one at a time, so every method here runs with exclusive
//! access to the collection.

use crate::query::Query;
use crate::transport::{Completion, Transport, TransportHandle};
use crate::types::{QueryId, ReplyStatus};

/// A query owned by the engine
struct Entry {
    id: QueryId,
    query: Query,
}

/// What one heartbeat did
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct HeartbeatReport {
    /// Query handed to the transport this tick, if any
    pub(crate) admitted: Option<QueryId>,
    /// Aborted queries removed from the collection
    pub(crate) reaped: Vec<QueryId>,
    /// Active queries that exceeded the tick budget
    pub(crate) timed_out: Vec<QueryId>,
}

/// Outcome of offering a completion to the collection
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// A query claimed the completion and was retired; `status` is what its
    /// callback received (`None` if it had been aborted)
    Retired {
        id: QueryId,
        status: Option<ReplyStatus>,
    },
    /// No pending query owns this handle
    Unclaimed(TransportHandle),
}

/// Ordered collection of pending queries; insertion order is admission order
pub(crate) struct QueryQueue {
    pending: Vec<Entry>,
    timeout_ticks: u32,
}

impl QueryQueue {
    pub(crate) fn new(timeout_ticks: u32) -> Self {
        Self {
            pending: Vec::new(),
            timeout_ticks,
        }
    }

    pub(crate) fn push(&mut self, id: QueryId, query: Query) {
        self.pending.push(Entry { id, query });
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.pending.iter().filter(|e| e.query.is_active()).count()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: QueryId) -> bool {
        self.pending.iter().any(|e| e.id == id)
    }

    /// Submit the first query that is neither active nor aborted
    pub(crate) fn admit_next(&mut self, transport: &mut dyn Transport) -> Option<QueryId> {
        let entry = self
            .pending
            .iter_mut()
            .find(|e| !e.query.is_active() && !e.query.is_aborted())?;

        entry.query.submit(transport).then_some(entry.id)
    }

    /// One scheduling step: admit at most one query, reap aborted queries,
    /// then age active queries and time out those over budget
    pub(crate) fn heartbeat(&mut self, transport: &mut dyn Transport) -> HeartbeatReport {
        let admitted = self.admit_next(transport);

        // Aborted queries were already cancelled at the transport when the
        // caller aborted them. Active ones are removed too: the Transport
        // contract guarantees their completion never arrives.
        let mut reaped = Vec::new();
        self.pending.retain(|e| {
            if e.query.is_aborted() {
                reaped.push(e.id);
                false
            } else {
                true
            }
        });

        // Decide first, then remove, then abort and notify. Callbacks only
        // run once the collection is consistent again.
        let timeout_ticks = self.timeout_ticks;
        let mut expired = Vec::new();
        let mut index = 0;
        while index < self.pending.len() {
            let entry = &mut self.pending[index];
            if entry.query.is_active() && !entry.query.tick(timeout_ticks) {
                expired.push(self.pending.remove(index));
            } else {
                index += 1;
            }
        }

        let mut timed_out = Vec::with_capacity(expired.len());
        for mut entry in expired {
            tracing::warn!(
                query_id = %entry.id,
                url = %entry.query.url(),
                ticks = entry.query.ticks(),
                "query timed out"
            );
            entry
                .query
                .terminate(entry.id, transport, ReplyStatus::TimedOut);
            timed_out.push(entry.id);
        }

        HeartbeatReport {
            admitted,
            reaped,
            timed_out,
        }
    }

    /// Match a transport completion to the query that owns its handle
    pub(crate) fn dispatch(&mut self, completion: Completion) -> Dispatch {
        let mut completion = completion;
        for index in 0..self.pending.len() {
            let entry = &mut self.pending[index];
            match entry.query.receive(entry.id, completion) {
                Ok(status) => {
                    let entry = self.pending.remove(index);
                    return Dispatch::Retired {
                        id: entry.id,
                        status,
                    };
                }
                Err(unclaimed) => completion = unclaimed,
            }
        }
        Dispatch::Unclaimed(completion.handle)
    }

    /// Caller-initiated abort; returns false if the query is no longer
    /// pending or was already aborted
    pub(crate) fn abort(&mut self, id: QueryId, transport: &mut dyn Transport) -> bool {
        match self.pending.iter_mut().find(|e| e.id == id) {
            Some(entry) if !entry.query.is_aborted() => {
                entry.query.abort(transport);
                true
            }
            _ => false,
        }
    }

    /// Drain the collection at teardown
    ///
    /// Every outstanding transport operation is cancelled. Queries the caller
    /// had not aborted receive [`ReplyStatus::Canceled`]; their ids are
    /// returned.
    pub(crate) fn shutdown(&mut self, transport: &mut dyn Transport) -> Vec<QueryId> {
        let mut canceled = Vec::new();
        for mut entry in self.pending.drain(..) {
            let was_aborted = entry.query.is_aborted();
            entry
                .query
                .terminate(entry.id, transport, ReplyStatus::Canceled);
            if !was_aborted {
                canceled.push(entry.id);
            }
        }
        canceled
    }
}
