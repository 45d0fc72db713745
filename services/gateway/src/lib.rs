pub mod config;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod relay;

pub use endpoint::{create_router, GatewayState, WsInbound};
pub use error::{InboundError, RelayError};
pub use registry::{RelayFactory, SessionRegistry};
pub use relay::{
    retry_with_backoff, BackoffPolicy, CancellationSignal, InboundChannel, InboundEvent,
    LoopCoordinator, LoopReport, RelayEngine, RelaySettings, RelayState, ResilientRelay,
    RetryPolicy, SessionAdapter,
};
