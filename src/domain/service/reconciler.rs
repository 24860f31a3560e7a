//! 结果对账：消费传输层的原始结果，处理错误副作用后转发给调用方

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::model::{DeliveryEndpoint, DispatchResult};
use crate::domain::repository::SubscriptionStore;
use crate::error::{DispatchError, ErrorKind, StoreError};
use crate::metrics::DispatchMetrics;

/// 结果对账器（每次分发一个任务，顺序处理）
#[derive(Clone)]
pub struct ResultReconciler {
    store: Arc<dyn SubscriptionStore>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl ResultReconciler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 逐条处理原始结果并转发，输入关闭时输出随之关闭
    pub async fn run(
        self,
        mut results: mpsc::Receiver<DispatchResult>,
        report: mpsc::Sender<DispatchResult>,
        cancel: CancellationToken,
    ) {
        let mut forwarded = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(forwarded, "dispatch cancelled, stop reconciling results");
                    break;
                }
                next = results.recv() => next,
            };
            let Some(result) = next else {
                break;
            };

            let result = self.reconcile(result).await;
            if let Some(metrics) = &self.metrics {
                metrics.observe_result(&result);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = report.send(result) => {
                    if sent.is_err() {
                        debug!(forwarded, "result consumer gone");
                        break;
                    }
                }
            }
            forwarded += 1;
        }

        debug!(forwarded, "result reconciliation finished");
    }

    /// 按错误分类处理单条结果
    pub async fn reconcile(&self, mut result: DispatchResult) -> DispatchResult {
        let Some(kind) = result.error_kind() else {
            return result;
        };

        match kind {
            ErrorKind::EndpointKeyStale => {
                let update = self.update_subscription(&result.destination).await;
                if let Some(metrics) = &self.metrics {
                    metrics.observe_key_update(update.is_ok());
                }
                if let Err(err) = update {
                    warn!(
                        provider_id = result.provider.id,
                        subscription_id = ?result.destination.subscription_id(),
                        error = %err,
                        "failed to update subscription device key"
                    );
                    result.error = Some(DispatchError::StoreFailure(err));
                }
            }
            // 服务商配置、退订等后续处理由上层负责
            ErrorKind::Transient
            | ErrorKind::ProviderConfigStale
            | ErrorKind::Unsubscribe
            | ErrorKind::StoreFailure
            | ErrorKind::UnsupportedProviderType
            | ErrorKind::Other => {
                debug!(
                    provider_id = result.provider.id,
                    kind = kind.as_str(),
                    "forwarding dispatch failure"
                );
            }
        }

        result
    }

    async fn update_subscription(&self, endpoint: &DeliveryEndpoint) -> Result<(), StoreError> {
        let raw_id = endpoint.subscription_id().unwrap_or_default();
        let subscription_id: i64 = raw_id
            .parse()
            .map_err(|_| StoreError::InvalidSubscriptionId(raw_id.to_string()))?;
        let new_key = endpoint
            .replacement_key()
            .ok_or(StoreError::MissingDeviceKey(subscription_id))?;

        self.store.update_key(subscription_id, new_key).await?;
        debug!(subscription_id, "subscription device key updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Provider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<(i64, String)>>,
        failure: Option<String>,
    }

    impl RecordingStore {
        fn failing(message: &str) -> Self {
            Self {
                calls: Mutex::default(),
                failure: Some(message.to_string()),
            }
        }

        fn calls(&self) -> Vec<(i64, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionStore for RecordingStore {
        async fn update_key(&self, subscription_id: i64, new_key: &str) -> Result<(), StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push((subscription_id, new_key.to_string()));
            match &self.failure {
                Some(message) => Err(StoreError::Backend(message.clone())),
                None => Ok(()),
            }
        }
    }

    fn provider() -> Arc<Provider> {
        Arc::new(Provider::new(1, 1, "android", "gcm"))
    }

    fn stale_key_result() -> DispatchResult {
        let mut endpoint = DeliveryEndpoint::new(1, "gcm", "oldtoken").with_subscription_id(42);
        endpoint.set_replacement_key("newtoken123");
        DispatchResult::failure(
            provider(),
            endpoint,
            DispatchError::EndpointKeyStale("canonical id".to_string()),
        )
    }

    #[tokio::test]
    async fn stale_key_is_persisted_and_error_kept() {
        let store = Arc::new(RecordingStore::default());
        let reconciler = ResultReconciler::new(store.clone());

        let result = reconciler.reconcile(stale_key_result()).await;

        assert_eq!(store.calls(), vec![(42, "newtoken123".to_string())]);
        assert_eq!(
            result.error,
            Some(DispatchError::EndpointKeyStale("canonical id".to_string()))
        );
    }

    #[tokio::test]
    async fn store_failure_replaces_stale_key_error() {
        let store = Arc::new(RecordingStore::failing("connection refused"));
        let reconciler = ResultReconciler::new(store.clone());

        let result = reconciler.reconcile(stale_key_result()).await;

        let err = result.error.expect("error expected");
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn success_passes_through_untouched() {
        let store = Arc::new(RecordingStore::default());
        let reconciler = ResultReconciler::new(store.clone());
        let endpoint = DeliveryEndpoint::new(1, "gcm", "tok").with_subscription_id(9);
        let input = DispatchResult::success(provider(), endpoint.clone())
            .with_message_id(Some("m-1".to_string()));

        let result = reconciler.reconcile(input).await;

        assert!(result.error.is_none());
        assert_eq!(result.destination, endpoint);
        assert_eq!(result.message_id.as_deref(), Some("m-1"));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn other_kinds_do_not_touch_the_store() {
        let store = Arc::new(RecordingStore::default());
        let reconciler = ResultReconciler::new(store.clone());
        let errors = vec![
            DispatchError::Transient("timeout".to_string()),
            DispatchError::ProviderConfigStale("bad key".to_string()),
            DispatchError::Unsubscribe("NotRegistered".to_string()),
            DispatchError::Other("?".to_string()),
        ];

        for error in errors {
            let endpoint = DeliveryEndpoint::new(1, "gcm", "tok").with_subscription_id(1);
            let result = reconciler
                .reconcile(DispatchResult::failure(provider(), endpoint, error.clone()))
                .await;
            assert_eq!(result.error, Some(error));
        }
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_subscription_id_becomes_store_failure() {
        let store = Arc::new(RecordingStore::default());
        let reconciler = ResultReconciler::new(store.clone());
        let mut endpoint = DeliveryEndpoint::new(1, "gcm", "tok");
        endpoint.set_replacement_key("new");

        let result = reconciler
            .reconcile(DispatchResult::failure(
                provider(),
                endpoint,
                DispatchError::EndpointKeyStale(String::new()),
            ))
            .await;

        assert_eq!(
            result.error,
            Some(DispatchError::StoreFailure(StoreError::InvalidSubscriptionId(
                String::new()
            )))
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn run_forwards_every_result_and_closes() {
        let store = Arc::new(RecordingStore::default());
        let reconciler = ResultReconciler::new(store);
        let (raw_tx, raw_rx) = mpsc::channel(1);
        let (report_tx, mut report_rx) = mpsc::channel(1);
        let handle = tokio::spawn(reconciler.run(raw_rx, report_tx, CancellationToken::new()));

        tokio::spawn(async move {
            for i in 0..5 {
                let endpoint = DeliveryEndpoint::new(1, "gcm", format!("tok-{i}"));
                raw_tx
                    .send(DispatchResult::success(provider(), endpoint))
                    .await
                    .unwrap();
            }
        });

        let mut received = Vec::new();
        while let Some(result) = report_rx.recv().await {
            received.push(result.destination.device_key);
        }
        handle.await.unwrap();

        assert_eq!(received.len(), 5);
        assert_eq!(received[0], "tok-0");
    }
}
