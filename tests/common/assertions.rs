//! Custom test assertions for engine integration tests

use std::time::Duration;
use tokio::sync::broadcast;
use usenet_webquery::Event;

/// Result of waiting for an engine event
#[derive(Debug)]
pub enum WaitResult {
    /// The event was observed; carries every event received before it
    Seen(Vec<Event>),
    /// Timeout waiting for the event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until an event matching `predicate` is received
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> WaitResult
where
    F: Fn(&Event) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        let mut seen = Vec::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = predicate(&event);
                    seen.push(event);
                    if done {
                        return WaitResult::Seen(seen);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Assert that an event matching `predicate` arrives within `timeout`
pub async fn assert_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    match wait_for_event(events, timeout, predicate).await {
        WaitResult::Seen(seen) => seen,
        other => panic!("expected event did not arrive: {other:?}"),
    }
}
