//! Cross-crate integration flows.

pub mod bus_flows;
pub mod lifecycle_flows;

use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `limit` elapses. Returns the final
/// evaluation.
pub fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Default limit for asynchronous delivery in tests.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
