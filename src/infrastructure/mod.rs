//! 基础设施层：传输层与订阅存储实现

pub mod store;
pub mod transport;

pub use store::{
    InMemorySubscriptionStore, PostgresSubscriptionStore, SubscriptionStoreRef,
    build_subscription_store,
};
pub use transport::{
    EndpointSender, FanOutTransport, NoopEndpointSender, TransportRegistry, build_noop_registry,
};
