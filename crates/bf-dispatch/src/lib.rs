//! Fan-out dispatch, outbound action translation, and gateway transport.

pub mod gateway;
pub mod outbound;
pub mod parallel;

pub use gateway::{GatewayClient, GatewayConfig};
pub use outbound::{text_segments, OutboundParser};
pub use parallel::ParallelDispatcher;
