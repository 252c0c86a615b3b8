//! Engine configurations and constructors for tests against local mock servers

use std::time::Duration;
use usenet_webquery::{EngineConfig, WebEngine};

/// Heartbeat interval used by tests so they finish quickly
pub const TEST_TICK: Duration = Duration::from_millis(50);

/// A configuration with a short heartbeat and the given timeout budget
pub fn fast_config(timeout_ticks: u32) -> EngineConfig {
    EngineConfig {
        tick_interval: TEST_TICK,
        timeout_ticks,
        ..Default::default()
    }
}

/// Start an engine backed by the real HTTP transport
pub fn start_engine(timeout_ticks: u32) -> WebEngine {
    WebEngine::new(fast_config(timeout_ticks)).expect("engine should start")
}
