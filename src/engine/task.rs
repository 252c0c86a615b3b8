//! The engine actor: a single task owning the queue and the transport.
//!
//! Heartbeats, transport completions and caller commands are multiplexed
//! with `tokio::select!`, so a heartbeat's admission and timeout sweep never
//! interleave with completion dispatch. Aborts issued during the sweep cannot
//! re-enter dispatch either: the transport suppresses completions for
//! aborted handles, and completions are only read between handler runs.

use super::queue::{Dispatch, QueryQueue};
use crate::config::EngineConfig;
use crate::query::Query;
use crate::transport::{Completion, Transport};
use crate::types::{Event, QueryId};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Requests from [`WebEngine`](super::WebEngine) handles
pub(crate) enum Command {
    Submit { id: QueryId, query: Query },
    Abort(QueryId),
    Pending(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct EngineTask {
    config: EngineConfig,
    queue: QueryQueue,
    transport: Box<dyn Transport>,
    commands: mpsc::UnboundedReceiver<Command>,
    event_tx: broadcast::Sender<Event>,
    /// Running iff the queue is non-empty
    heartbeat: Option<Interval>,
}

impl EngineTask {
    pub(crate) fn new(
        config: EngineConfig,
        transport: Box<dyn Transport>,
        commands: mpsc::UnboundedReceiver<Command>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            queue: QueryQueue::new(config.timeout_ticks),
            config,
            transport,
            commands,
            event_tx,
            heartbeat: None,
        }
    }

    /// Process commands, completions and heartbeats until shutdown is
    /// requested or every engine handle is dropped
    pub(crate) async fn run(mut self) {
        info!(
            tick_interval = ?self.config.tick_interval,
            timeout_ticks = self.config.timeout_ticks,
            "query engine started"
        );

        let mut shutdown_ack = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        shutdown_ack = Some(ack);
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all engine handles dropped");
                        break;
                    }
                },
                Some(completion) = self.transport.next_completion() => {
                    self.on_completion(completion);
                }
                _ = next_tick(&mut self.heartbeat) => {
                    self.on_heartbeat();
                }
            }
            self.sync_heartbeat();
        }

        // Refuse new commands, but still account for queries that were
        // already in flight on the channel so they get cancelled too.
        self.commands.close();
        let mut acks: Vec<_> = shutdown_ack.into_iter().collect();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Submit { id, query } => self.queue.push(id, query),
                Command::Abort(id) => {
                    self.queue.abort(id, &mut *self.transport);
                }
                Command::Pending(reply) => {
                    reply.send(self.queue.len()).ok();
                }
                Command::Shutdown(ack) => acks.push(ack),
            }
        }

        self.teardown();
        for ack in acks {
            ack.send(()).ok();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { id, query } => self.on_submit(id, query),
            Command::Abort(id) => {
                if self.queue.abort(id, &mut *self.transport) {
                    debug!(query_id = %id, "query aborted by caller");
                    self.emit(Event::Aborted { id });
                }
            }
            Command::Pending(reply) => {
                reply.send(self.queue.len()).ok();
            }
            // handled in run()
            Command::Shutdown(_) => {}
        }
    }

    fn on_submit(&mut self, id: QueryId, query: Query) {
        let was_idle = self.queue.is_empty();
        debug!(query_id = %id, url = %query.url(), "query queued");
        self.emit(Event::Submitted {
            id,
            url: query.url().to_string(),
        });
        self.queue.push(id, query);

        if was_idle {
            self.start_heartbeat();
            // An idle engine should not make the first query wait a full tick.
            if self.config.admit_on_first_submit
                && let Some(admitted) = self.queue.admit_next(&mut *self.transport)
            {
                self.emit(Event::Admitted { id: admitted });
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match self.queue.dispatch(completion) {
            Dispatch::Retired {
                id,
                status: Some(status),
            } => {
                self.emit(Event::Completed { id, status });
            }
            Dispatch::Retired { id, status: None } => {
                debug!(query_id = %id, "aborted query retired by late completion");
            }
            Dispatch::Unclaimed(handle) => {
                error!(%handle, "completion does not belong to any pending query");
                debug_assert!(false, "unclaimed completion for handle {handle}");
            }
        }
    }

    fn on_heartbeat(&mut self) {
        let report = self.queue.heartbeat(&mut *self.transport);

        if let Some(id) = report.admitted {
            self.emit(Event::Admitted { id });
        }
        if !report.reaped.is_empty() {
            debug!(count = report.reaped.len(), "reaped aborted queries");
        }
        for id in report.timed_out {
            self.emit(Event::TimedOut { id });
        }
    }

    fn start_heartbeat(&mut self) {
        let period = self.config.tick_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(interval);
        debug!("heartbeat started");
    }

    /// Stop the heartbeat once the queue has drained
    fn sync_heartbeat(&mut self) {
        if self.queue.is_empty() && self.heartbeat.take().is_some() {
            debug!("queue drained, heartbeat stopped");
            self.emit(Event::AllFinished);
        }
    }

    fn teardown(&mut self) {
        self.heartbeat = None;
        let pending = self.queue.len();
        let active = self.queue.active_count();
        let canceled = self.queue.shutdown(&mut *self.transport);
        info!(
            pending,
            active,
            canceled = canceled.len(),
            "query engine stopped"
        );
        self.emit(Event::Shutdown);
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
