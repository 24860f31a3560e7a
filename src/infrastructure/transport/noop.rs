use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::model::{DeliveryEndpoint, Notification, Provider};
use crate::error::DispatchError;
use crate::infrastructure::transport::fanout::EndpointSender;

/// 只记录日志、总是成功的发送器
pub struct NoopEndpointSender;

#[async_trait]
impl EndpointSender for NoopEndpointSender {
    async fn send(
        &self,
        provider: &Provider,
        notification: &Notification,
        endpoint: &mut DeliveryEndpoint,
    ) -> Result<Option<String>, DispatchError> {
        info!(
            provider_id = provider.id,
            provider_type = %provider.provider_type,
            subscription_id = ?endpoint.subscription_id(),
            fields = notification.data.len(),
            "noop endpoint sender invoked"
        );
        Ok(None)
    }
}

impl NoopEndpointSender {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}
