//! Flare Push Dispatch
//!
//! 把一条通知经由一个推送服务商分发到一组订阅端点，
//! 并根据每个端点的分发结果回写订阅存储。

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod telemetry;

pub use application::{PushApplicationService, PushReport, PushRequest};
pub use config::{DispatchConfig, LoggingConfig, StoreConfig, TransportConfig, load_config};
pub use domain::{
    DeliveryEndpoint, DispatchController, DispatchResult, DispatchStream, Notification, Provider,
    ProviderResolver, ResultReconciler, Service, Subscription, SubscriptionStore, Transport,
};
pub use error::{DispatchError, ErrorKind, PushServiceError, ResolveError, StoreError};
pub use metrics::{DispatchMetrics, gather_metrics};
