//! 领域层（推送分发核心逻辑）

pub mod model;
pub mod repository;
pub mod service;

pub use model::{
    DeliveryEndpoint, DispatchResult, Notification, Provider, SUBSCRIPTION_ID_KEY, Service,
    Subscription, device_key_name,
};
pub use repository::{SubscriptionStore, Transport};
pub use service::{DispatchController, DispatchStream, ProviderResolver, ResultReconciler};
