pub mod fanout;
pub mod noop;
pub mod registry;

use std::sync::Arc;

use crate::config::TransportConfig;

pub use fanout::{EndpointSender, FanOutTransport};
pub use noop::NoopEndpointSender;
pub use registry::TransportRegistry;

/// 为每个配置的服务商类型注册 noop 传输层
///
/// 真实推送网络的实现由部署方通过 `TransportRegistry::register` 替换。
pub fn build_noop_registry(config: &TransportConfig) -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    for provider_type in &config.provider_types {
        registry.register(
            provider_type.as_str(),
            Arc::new(FanOutTransport::new(
                NoopEndpointSender::shared(),
                config.max_in_flight,
            )),
        );
    }
    registry
}
