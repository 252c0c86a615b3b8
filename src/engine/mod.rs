//! Query engine: admission control, timeouts and completion dispatch.
//!
//! The engine is split into focused submodules:
//! - [`queue`] - pending collection and the per-heartbeat state machine
//! - [`task`] - the actor task that owns the queue and the transport
//! - [`group`] - grouping queries with a shared readiness callback
//!
//! [`WebEngine`] is a cheap, cloneable handle to the actor. Every heartbeat
//! (one second by default) the engine admits at most one pending query,
//! reaps queries aborted by their callers, and times out active queries that
//! have gone too many heartbeats without a reply.

mod group;
mod queue;
mod task;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use group::SubmissionGroup;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Event, QueryId, Reply};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use task::{Command, EngineTask};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Handle to a running query engine (cloneable; all clones drive the same
/// engine task)
///
/// The engine task stops when [`shutdown`](Self::shutdown) is called or when
/// the last handle is dropped. Either way, pending queries are cancelled at
/// the transport and queries not aborted by their callers receive
/// [`ReplyStatus::Canceled`](crate::types::ReplyStatus::Canceled).
#[derive(Clone)]
pub struct WebEngine {
    /// Command channel into the engine task (unbounded so callbacks may submit)
    commands: mpsc::UnboundedSender<Command>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Query ID allocator
    next_id: Arc<AtomicU64>,
    /// Configuration the engine task was started with
    config: Arc<EngineConfig>,
}

impl WebEngine {
    /// Start an engine backed by [`HttpTransport`]
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// ```no_run
    /// use usenet_webquery::{EngineConfig, Query, WebEngine};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let engine = WebEngine::new(EngineConfig::default())?;
    /// let reply = engine
    ///     .fetch(Query::parse("https://indexer.example/api?t=caps")?)
    ///     .await?;
    /// println!("{}: {}", reply.status, reply.text());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.user_agent)?;
        Self::with_transport(config, transport)
    }

    /// Start an engine driving a custom transport
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_transport<T: Transport>(config: EngineConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _rx) = broadcast::channel(config.event_channel_capacity);

        let task = EngineTask::new(
            config.clone(),
            Box::new(transport),
            command_rx,
            event_tx.clone(),
        );
        tokio::spawn(task.run());

        Ok(Self {
            commands: command_tx,
            event_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        })
    }

    /// Queue a query for admission
    ///
    /// Returns immediately; the query is sent on a later heartbeat (or right
    /// away if the engine was idle). Safe to call from inside a reply
    /// callback.
    pub fn submit(&self, query: Query) -> Result<QueryRef> {
        let id = QueryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.commands
            .send(Command::Submit { id, query })
            .map_err(|_| Error::ShuttingDown)?;

        Ok(QueryRef {
            id,
            commands: self.commands.downgrade(),
        })
    }

    /// Submit a query and wait for its reply
    ///
    /// Any callback already set on the query is replaced. Returns
    /// [`Error::Aborted`] if the query is aborted before it replies.
    pub async fn fetch(&self, query: Query) -> Result<Reply> {
        let (tx, rx) = oneshot::channel();
        let query = query.on_reply(move |reply| {
            tx.send(reply).ok();
        });
        let query_ref = self.submit(query)?;
        rx.await.map_err(|_| Error::Aborted(query_ref.id()))
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Number of queries the engine currently owns (pending or active)
    pub async fn pending(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Pending(tx))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }

    /// Stop the engine and wait for teardown to finish
    ///
    /// Calling this on an already stopped engine is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down query engine");
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_err() {
            return Ok(());
        }
        rx.await.ok();
        Ok(())
    }

    /// Returns true until the engine task has stopped
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Caller's reference to a submitted query
///
/// Does not keep the engine alive. Aborting through a stale reference (the
/// query already replied, or the engine stopped) does nothing.
#[derive(Clone)]
pub struct QueryRef {
    id: QueryId,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl QueryRef {
    /// ID of the referenced query
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Abort the query; its callback will not be invoked
    pub fn abort(&self) {
        if let Some(commands) = self.commands.upgrade() {
            commands.send(Command::Abort(self.id)).ok();
        }
    }
}

impl std::fmt::Debug for QueryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRef").field("id", &self.id).finish()
    }
}
