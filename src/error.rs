//! 推送分发错误类型
//!
//! - `ResolveError`：分发前的服务商解析错误，直接返回给调用方
//! - `DispatchError`：分发过程中按端点上报的错误，随结果流返回
//! - `StoreError`：订阅存储更新失败

use thiserror::Error;

/// 服务商解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// 端点显式指定的服务商不存在
    #[error("push service provider {name:?} of type {provider_type} not found for service {service_id}")]
    ProviderNotFound {
        service_id: i64,
        provider_type: String,
        name: String,
    },

    /// 服务下没有该类型的服务商
    #[error("no {provider_type} push service provider configured for service {service_id}")]
    NoProviderConfigured {
        service_id: i64,
        provider_type: String,
    },

    /// 同类型服务商不止一个，无法推断默认值
    #[error(
        "{count} {provider_type} push service providers configured for service {service_id}, an explicit provider is required"
    )]
    AmbiguousProvider {
        service_id: i64,
        provider_type: String,
        count: usize,
    },
}

/// 订阅存储错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid subscription id: {0:?}")]
    InvalidSubscriptionId(String),

    #[error("no replacement device key for subscription {0}")]
    MissingDeviceKey(i64),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(i64),

    /// 底层存储错误（原样保留错误信息）
    #[error("{0}")]
    Backend(String),
}

/// 分发错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    ProviderConfigStale,
    EndpointKeyStale,
    Unsubscribe,
    StoreFailure,
    UnsupportedProviderType,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::ProviderConfigStale => "provider_config_stale",
            ErrorKind::EndpointKeyStale => "endpoint_key_stale",
            ErrorKind::Unsubscribe => "unsubscribe",
            ErrorKind::StoreFailure => "store_failure",
            ErrorKind::UnsupportedProviderType => "unsupported_provider_type",
            ErrorKind::Other => "other",
        }
    }
}

/// 单个端点的分发错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// 临时失败，是否重试由上层决定
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// 服务商凭证已过期
    #[error("push service provider configuration is stale: {0}")]
    ProviderConfigStale(String),

    /// 设备返回了新的设备标识（如 GCM registration id 轮换）
    #[error("delivery point key is stale: {0}")]
    EndpointKeyStale(String),

    /// 端点永久失效
    #[error("delivery point unsubscribed: {0}")]
    Unsubscribe(String),

    #[error(transparent)]
    StoreFailure(#[from] StoreError),

    #[error("unsupported push service provider type: {0}")]
    UnsupportedProviderType(String),

    #[error("{0}")]
    Other(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Transient(_) => ErrorKind::Transient,
            DispatchError::ProviderConfigStale(_) => ErrorKind::ProviderConfigStale,
            DispatchError::EndpointKeyStale(_) => ErrorKind::EndpointKeyStale,
            DispatchError::Unsubscribe(_) => ErrorKind::Unsubscribe,
            DispatchError::StoreFailure(_) => ErrorKind::StoreFailure,
            DispatchError::UnsupportedProviderType(_) => ErrorKind::UnsupportedProviderType,
            DispatchError::Other(_) => ErrorKind::Other,
        }
    }
}

/// 推送应用服务错误
#[derive(Debug, Error)]
pub enum PushServiceError {
    #[error("no subscriptions for {subscriber} in {service}")]
    NoSubscriptions { subscriber: String, service: String },

    #[error("invalid notification content: {0}")]
    InvalidContent(String),
}
