//! # usenet-webquery
//!
//! Rate-limited, timeout-supervised HTTP query engine for Usenet client
//! applications (indexer API calls, feedback submission, version checks).
//!
//! ## Design Philosophy
//!
//! usenet-webquery is designed to be:
//! - **Gentle on servers** - At most one new request is started per heartbeat
//! - **Always answering** - Every query gets exactly one reply, unless its caller aborts it
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use usenet_webquery::{EngineConfig, Query, WebEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WebEngine::new(EngineConfig::default())?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let query = Query::parse("https://api.nzbgeek.info/api")?
//!         .with_field("t", "caps")
//!         .on_reply(|reply| println!("{} -> {}", reply.url, reply.status));
//!     engine.submit(query)?;
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Clients for the application's web services
pub mod clients;
/// Configuration types
pub mod config;
/// Query engine (admission, timeouts, dispatch)
pub mod engine;
/// Error types
pub mod error;
/// Multipart attachment encoding
pub mod multipart;
/// Query lifecycle
pub mod query;
/// HTTP transport abstraction
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{QueryRef, SubmissionGroup, WebEngine};
pub use error::{Error, Result};
pub use multipart::Attachment;
pub use query::{OnReply, Query};
pub use transport::{Completion, HttpRequest, HttpTransport, Method, Transport, TransportHandle};
pub use types::{Event, NetworkError, NetworkErrorKind, QueryId, Reply, ReplyStatus};

/// Helper function to run the engine until a termination signal arrives.
///
/// Waits for a termination signal and then calls the engine's `shutdown()`
/// method, which cancels every pending query.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use usenet_webquery::{EngineConfig, WebEngine, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = WebEngine::new(EngineConfig::default())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: WebEngine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
