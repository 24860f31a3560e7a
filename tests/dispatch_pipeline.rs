use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use flare_push_dispatch::infrastructure::{
    EndpointSender, FanOutTransport, InMemorySubscriptionStore, build_noop_registry,
    build_subscription_store,
};
use flare_push_dispatch::{
    DeliveryEndpoint, DispatchConfig, DispatchController, DispatchError, DispatchMetrics,
    DispatchResult, ErrorKind, Notification, Provider, StoreError, SubscriptionStore, Transport,
    gather_metrics,
};

/// 按设备标识脚本化结果，耗时与输入顺序相反
struct ScriptedSender;

#[async_trait]
impl EndpointSender for ScriptedSender {
    async fn send(
        &self,
        _provider: &Provider,
        _notification: &Notification,
        endpoint: &mut DeliveryEndpoint,
    ) -> Result<Option<String>, DispatchError> {
        let index: u64 = endpoint
            .device_key
            .rsplit('-')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis((50 - index) % 7)).await;

        match endpoint.device_key.as_str() {
            key if key.starts_with("stale") => {
                endpoint.set_replacement_key("newtoken123");
                Err(DispatchError::EndpointKeyStale("canonical id".to_string()))
            }
            key if key.starts_with("gone") => {
                Err(DispatchError::Unsubscribe("NotRegistered".to_string()))
            }
            key if key.starts_with("busy") => Err(DispatchError::Transient("timeout".to_string())),
            _ => Ok(Some(format!("msg-{index}"))),
        }
    }
}

struct FailingStore(&'static str);

#[async_trait]
impl SubscriptionStore for FailingStore {
    async fn update_key(&self, _subscription_id: i64, _new_key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend(self.0.to_string()))
    }
}

fn gcm_provider() -> Arc<Provider> {
    Arc::new(
        Provider::new(1, 1, "android", "gcm")
            .with_credential("projectid", "demo")
            .with_credential("apikey", "secret"),
    )
}

fn controller(store: Arc<dyn SubscriptionStore>) -> DispatchController {
    let transport = Arc::new(FanOutTransport::new(Arc::new(ScriptedSender), 8));
    DispatchController::new(transport, store)
}

#[tokio::test]
async fn every_endpoint_produces_exactly_one_result() {
    let store = InMemorySubscriptionStore::shared();
    let endpoints: Vec<_> = (0..50)
        .map(|i| {
            let key = match i % 5 {
                0 => format!("gone-{i}"),
                1 => format!("busy-{i}"),
                _ => format!("device-{i}"),
            };
            DeliveryEndpoint::new(1, "gcm", key).with_subscription_id(i)
        })
        .collect();
    let expected: HashSet<_> = endpoints.iter().map(|e| e.device_key.clone()).collect();

    let results = controller(store)
        .push(gcm_provider(), Notification::new().with("msg", "hello"), endpoints)
        .collect_all()
        .await;

    assert_eq!(results.len(), 50);
    let seen: HashSet<_> = results.iter().map(|r| r.destination.device_key.clone()).collect();
    assert_eq!(seen, expected);
    let unsubscribed = results
        .iter()
        .filter(|r| r.error_kind() == Some(ErrorKind::Unsubscribe))
        .count();
    assert_eq!(unsubscribed, 10);
}

#[tokio::test]
async fn stale_key_is_written_back_and_error_is_kept() {
    let store = InMemorySubscriptionStore::shared();
    store.insert(42, "oldtoken");
    let endpoints = vec![DeliveryEndpoint::new(1, "gcm", "stale-0").with_subscription_id(42)];

    let results = controller(store.clone())
        .push(gcm_provider(), Notification::new(), endpoints)
        .collect_all()
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].error,
        Some(DispatchError::EndpointKeyStale("canonical id".to_string()))
    );
    assert_eq!(store.device_key(42).as_deref(), Some("newtoken123"));
}

#[tokio::test]
async fn store_failure_masks_stale_key_error() {
    let endpoints = vec![
        DeliveryEndpoint::new(1, "gcm", "stale-0").with_subscription_id(42),
        DeliveryEndpoint::new(1, "gcm", "device-1").with_subscription_id(43),
    ];

    let results = controller(Arc::new(FailingStore("connection refused")))
        .push(gcm_provider(), Notification::new(), endpoints)
        .collect_all()
        .await;

    let stale = results
        .iter()
        .find(|r| r.destination.subscription_id() == Some("42"))
        .unwrap();
    let err = stale.error.as_ref().unwrap();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert_eq!(err.to_string(), "connection refused");

    let delivered = results
        .iter()
        .find(|r| r.destination.subscription_id() == Some("43"))
        .unwrap();
    assert!(delivered.error.is_none());
    assert_eq!(delivered.message_id.as_deref(), Some("msg-1"));
}

/// 逐条转发，返回时通知测试
struct SignallingTransport {
    consumed: Arc<AtomicUsize>,
    done: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl Transport for SignallingTransport {
    async fn push(
        &self,
        provider: Arc<Provider>,
        mut endpoints: mpsc::Receiver<DeliveryEndpoint>,
        results: mpsc::Sender<DispatchResult>,
        _notification: Arc<Notification>,
        _cancel: CancellationToken,
    ) {
        while let Some(endpoint) = endpoints.recv().await {
            self.consumed.fetch_add(1, Ordering::SeqCst);
            let result = DispatchResult::success(Arc::clone(&provider), endpoint);
            if results.send(result).await.is_err() {
                break;
            }
        }
        let done = self.done.lock().unwrap().take();
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
}

#[tokio::test]
async fn dropping_the_stream_unwinds_the_pipeline() {
    let consumed = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = oneshot::channel();
    let transport = Arc::new(SignallingTransport {
        consumed: Arc::clone(&consumed),
        done: std::sync::Mutex::new(Some(done_tx)),
    });
    let controller = DispatchController::new(transport, InMemorySubscriptionStore::shared());
    let endpoints: Vec<_> = (0..100)
        .map(|i| DeliveryEndpoint::new(1, "gcm", format!("device-{i}")))
        .collect();

    let mut stream = controller.push(gcm_provider(), Notification::new(), endpoints);
    assert!(stream.next().await.is_some());
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), done_rx)
        .await
        .expect("transport should return after the consumer goes away")
        .unwrap();
    assert!(consumed.load(Ordering::SeqCst) < 100);
}

#[tokio::test]
async fn default_wiring_delivers_through_noop_transport() {
    let config = DispatchConfig::default();
    let registry = build_noop_registry(&config.transport);
    let store = build_subscription_store(&config.store).await.unwrap();
    let metrics = Arc::new(DispatchMetrics::new());
    let controller = DispatchController::new(Arc::new(registry), store).with_metrics(metrics);
    let endpoints: Vec<_> = (0..3)
        .map(|i| DeliveryEndpoint::new(1, "apns", format!("device-{i}")))
        .collect();

    let results = controller
        .push(
            Arc::new(Provider::new(2, 1, "ios", "apns")),
            Notification::new().with("alert", "hi"),
            endpoints,
        )
        .collect_all()
        .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.is_error()));
    assert!(gather_metrics().contains("push_dispatch_results_total"));
}
