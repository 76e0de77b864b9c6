//! Per-entity control channel: endpoint addressing, RPC, status subscriber.

mod endpoint;
mod rpc;
mod subscriber;

pub use endpoint::ControlEndpoint;
pub use rpc::RpcChannel;
pub use subscriber::{spawn_subscriber, SubscriberHandle, SubscriberTiming};
