//! 服务商类型到传输层实现的注册表

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::model::{DeliveryEndpoint, DispatchResult, Notification, Provider};
use crate::domain::repository::Transport;
use crate::error::DispatchError;

/// 传输层注册表
///
/// 启动时显式构建，再作为 `Arc<dyn Transport>` 交给分发控制器，
/// 按服务商类型把分发转给对应实现。
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册传输层，返回被替换的旧实现
    pub fn register(
        &mut self,
        provider_type: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Option<Arc<dyn Transport>> {
        self.transports.insert(provider_type.into(), transport)
    }

    pub fn with(mut self, provider_type: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.register(provider_type, transport);
        self
    }

    pub fn get(&self, provider_type: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(provider_type).cloned()
    }

    pub fn provider_types(&self) -> impl Iterator<Item = &str> {
        self.transports.keys().map(String::as_str)
    }
}

#[async_trait]
impl Transport for TransportRegistry {
    async fn push(
        &self,
        provider: Arc<Provider>,
        endpoints: mpsc::Receiver<DeliveryEndpoint>,
        results: mpsc::Sender<DispatchResult>,
        notification: Arc<Notification>,
        cancel: CancellationToken,
    ) {
        match self.get(&provider.provider_type) {
            Some(transport) => {
                transport
                    .push(provider, endpoints, results, notification, cancel)
                    .await
            }
            None => {
                warn!(
                    provider_id = provider.id,
                    provider_type = %provider.provider_type,
                    "no transport registered for push service provider type"
                );
                reject_all(provider, endpoints, results, cancel).await
            }
        }
    }
}

/// 没有对应实现时，仍对每个端点上报一条失败结果
async fn reject_all(
    provider: Arc<Provider>,
    mut endpoints: mpsc::Receiver<DeliveryEndpoint>,
    results: mpsc::Sender<DispatchResult>,
    cancel: CancellationToken,
) {
    loop {
        let endpoint = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            endpoint = endpoints.recv() => match endpoint {
                Some(endpoint) => endpoint,
                None => return,
            },
        };

        let error = DispatchError::UnsupportedProviderType(provider.provider_type.clone());
        let result = DispatchResult::failure(Arc::clone(&provider), endpoint, error);
        if results.send(result).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infrastructure::transport::{FanOutTransport, NoopEndpointSender};

    async fn run(
        registry: TransportRegistry,
        provider: Provider,
        count: usize,
    ) -> Vec<DispatchResult> {
        let (feed_tx, feed_rx) = mpsc::channel(1);
        let (raw_tx, mut raw_rx) = mpsc::channel(1);
        let provider = Arc::new(provider);
        let endpoint_type = provider.provider_type.clone();

        tokio::spawn(async move {
            for i in 0..count {
                let endpoint = DeliveryEndpoint::new(1, endpoint_type.as_str(), format!("tok-{i}"));
                if feed_tx.send(endpoint).await.is_err() {
                    break;
                }
            }
        });
        tokio::spawn(async move {
            registry
                .push(
                    provider,
                    feed_rx,
                    raw_tx,
                    Arc::new(Notification::new()),
                    CancellationToken::new(),
                )
                .await
        });

        let mut results = Vec::new();
        while let Some(result) = raw_rx.recv().await {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn routes_by_provider_type() {
        let registry = TransportRegistry::new().with(
            "gcm",
            Arc::new(FanOutTransport::new(NoopEndpointSender::shared(), 4)),
        );

        let results = run(registry, Provider::new(1, 1, "android", "gcm"), 3).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.is_error()));
    }

    #[tokio::test]
    async fn unknown_type_fails_every_endpoint() {
        let registry = TransportRegistry::new();

        let results = run(registry, Provider::new(1, 1, "web", "webpush"), 4).await;

        assert_eq!(results.len(), 4);
        assert!(
            results
                .iter()
                .all(|r| r.error_kind() == Some(ErrorKind::UnsupportedProviderType))
        );
    }

    #[test]
    fn register_replaces_existing_transport() {
        let mut registry = TransportRegistry::new();
        let first: Arc<dyn Transport> =
            Arc::new(FanOutTransport::new(NoopEndpointSender::shared(), 1));
        assert!(registry.register("gcm", first).is_none());

        let second: Arc<dyn Transport> =
            Arc::new(FanOutTransport::new(NoopEndpointSender::shared(), 2));
        assert!(registry.register("gcm", second).is_some());
        assert_eq!(registry.provider_types().collect::<Vec<_>>(), vec!["gcm"]);
    }
}
