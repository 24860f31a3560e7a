//! 推送分发控制器
//!
//! 一次 `push` 调用启动三个任务：端点投喂、传输层、结果对账，
//! 任务之间通过容量为 1 的通道连接，形成逐条的背压。

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, Span, debug, instrument, warn};

use crate::domain::model::{DeliveryEndpoint, DispatchResult, Notification, Provider};
use crate::domain::repository::{SubscriptionStore, Transport};
use crate::domain::service::reconciler::ResultReconciler;
use crate::metrics::DispatchMetrics;

/// tokio 的 mpsc 不支持零容量，用最小容量近似同步交接
const CONDUIT_CAPACITY: usize = 1;

/// 推送分发控制器
pub struct DispatchController {
    transport: Arc<dyn Transport>,
    reconciler: ResultReconciler,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl DispatchController {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            transport,
            reconciler: ResultReconciler::new(store),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.reconciler = self.reconciler.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    /// 向一组端点分发同一条通知
    ///
    /// 返回的结果流对每个端点恰好产出一条结果，顺序不保证与输入一致。
    /// 必须在 Tokio 运行时中调用。提前丢弃结果流会取消本次分发。
    #[instrument(
        skip_all,
        fields(provider_id = provider.id, provider_type = %provider.provider_type)
    )]
    pub fn push<I>(
        &self,
        provider: Arc<Provider>,
        notification: Notification,
        endpoints: I,
    ) -> DispatchStream
    where
        I: IntoIterator<Item = DeliveryEndpoint>,
        I::IntoIter: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (feed_tx, feed_rx) = mpsc::channel(CONDUIT_CAPACITY);
        let (raw_tx, raw_rx) = mpsc::channel(CONDUIT_CAPACITY);
        let (report_tx, report_rx) = mpsc::channel(CONDUIT_CAPACITY);

        tokio::spawn(
            feed_endpoints(endpoints.into_iter(), feed_tx, cancel.clone())
                .instrument(Span::current()),
        );

        let transport = Arc::clone(&self.transport);
        let transport_cancel = cancel.clone();
        let transport_provider = Arc::clone(&provider);
        let notification = Arc::new(notification);
        tokio::spawn(
            async move {
                transport
                    .push(transport_provider, feed_rx, raw_tx, notification, transport_cancel)
                    .await;
            }
            .instrument(Span::current()),
        );

        let reconciler = self.reconciler.clone();
        let reconcile_cancel = cancel.clone();
        let metrics = self.metrics.clone();
        let started = Instant::now();
        tokio::spawn(
            async move {
                reconciler.run(raw_rx, report_tx, reconcile_cancel).await;
                if let Some(metrics) = metrics {
                    metrics
                        .dispatch_duration_seconds
                        .with_label_values(&[provider.provider_type.as_str()])
                        .observe(started.elapsed().as_secs_f64());
                }
            }
            .instrument(Span::current()),
        );

        DispatchStream::new(report_rx, cancel)
    }
}

/// 按调用方顺序投喂端点，结束时释放发送端以关闭通道
async fn feed_endpoints<I>(
    endpoints: I,
    feed: mpsc::Sender<DeliveryEndpoint>,
    cancel: CancellationToken,
) where
    I: Iterator<Item = DeliveryEndpoint>,
{
    let mut fed = 0usize;
    for endpoint in endpoints {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(fed, "dispatch cancelled, stop feeding endpoints");
                return;
            }
            sent = feed.send(endpoint) => {
                if sent.is_err() {
                    warn!(fed, "transport stopped reading the endpoint feed");
                    return;
                }
            }
        }
        fed += 1;
    }
    debug!(fed, "endpoint feed closed");
}

/// 分发结果流（单次遍历）
///
/// 被丢弃时取消整个分发，投喂任务、传输层和对账任务都会退出。
pub struct DispatchStream {
    inner: ReceiverStream<DispatchResult>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl DispatchStream {
    fn new(receiver: mpsc::Receiver<DispatchResult>, cancel: CancellationToken) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// 主动取消本次分发
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 读取全部结果
    pub async fn collect_all(self) -> Vec<DispatchResult> {
        self.collect().await
    }
}

impl Stream for DispatchStream {
    type Item = DispatchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
