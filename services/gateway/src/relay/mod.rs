//! Backend relay.
//!
//! ## Architecture
//!
//! ```text
//! ResilientRelay -> retry_with_backoff -> RelayEngine::start
//!                                             |
//!                              Connector -> SocketSession
//!                                             |
//!                    LoopCoordinator { relay loop, keep-alive loop }
//! ```
//!
//! Every loop of a session observes the same [`CancellationSignal`].

mod adapter;
mod coordinator;
mod engine;
mod resilient;
mod retry;
mod signal;

pub use adapter::{InboundChannel, InboundEvent, SessionAdapter, UPDATE_METHOD};
pub use coordinator::{LoopCoordinator, LoopReport, LoopTask, DEFAULT_SHUTDOWN_GRACE};
pub use engine::{
    ping_message, RelayEngine, RelaySettings, RelayState, DEFAULT_KEEPALIVE_INTERVAL,
    DEFAULT_RECEIVE_TIMEOUT,
};
pub use resilient::ResilientRelay;
pub use retry::{retry_with_backoff, BackoffPolicy, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use signal::CancellationSignal;
