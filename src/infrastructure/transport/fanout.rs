//! 并发投递：把逐端点发送器适配为传输层

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::domain::model::{DeliveryEndpoint, DispatchResult, Notification, Provider};
use crate::domain::repository::Transport;
use crate::error::DispatchError;

/// 单个端点的推送发送器
///
/// 成功时可返回推送网络分配的消息 ID；设备标识轮换时应通过
/// `DeliveryEndpoint::set_replacement_key` 写入新标识并返回
/// `DispatchError::EndpointKeyStale`。
#[async_trait]
pub trait EndpointSender: Send + Sync {
    async fn send(
        &self,
        provider: &Provider,
        notification: &Notification,
        endpoint: &mut DeliveryEndpoint,
    ) -> Result<Option<String>, DispatchError>;
}

/// 并发扇出传输层，结果按完成顺序上报
pub struct FanOutTransport<S> {
    sender: Arc<S>,
    max_in_flight: usize,
}

impl<S> FanOutTransport<S>
where
    S: EndpointSender + 'static,
{
    pub fn new(sender: Arc<S>, max_in_flight: usize) -> Self {
        Self {
            sender,
            max_in_flight: max_in_flight.max(1),
        }
    }
}

#[async_trait]
impl<S> Transport for FanOutTransport<S>
where
    S: EndpointSender + 'static,
{
    async fn push(
        &self,
        provider: Arc<Provider>,
        mut endpoints: mpsc::Receiver<DeliveryEndpoint>,
        results: mpsc::Sender<DispatchResult>,
        notification: Arc<Notification>,
        cancel: CancellationToken,
    ) {
        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight = JoinSet::new();
        let mut accepted = 0usize;

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&limiter).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let endpoint = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                endpoint = endpoints.recv() => match endpoint {
                    Some(endpoint) => endpoint,
                    None => break,
                },
            };
            accepted += 1;

            let sender = Arc::clone(&self.sender);
            let provider = Arc::clone(&provider);
            let notification = Arc::clone(&notification);
            let results = results.clone();
            let cancel = cancel.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let original = endpoint.clone();
                let mut endpoint = endpoint;
                let outcome =
                    AssertUnwindSafe(sender.send(&provider, &notification, &mut endpoint))
                        .catch_unwind()
                        .await;
                let result = match outcome {
                    Ok(Ok(message_id)) => {
                        DispatchResult::success(provider, endpoint).with_message_id(message_id)
                    }
                    Ok(Err(err)) => DispatchResult::failure(provider, endpoint, err),
                    // 发送器 panic 时仍为该端点上报一条结果
                    Err(_) => {
                        error!(
                            provider_id = provider.id,
                            subscription_id = ?original.subscription_id(),
                            "endpoint sender panicked"
                        );
                        DispatchResult::failure(
                            provider,
                            original,
                            DispatchError::Other("endpoint sender panicked".to_string()),
                        )
                    }
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = results.send(result) => {}
                }
            });

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "endpoint delivery task failed");
                }
            }
        }

        if cancel.is_cancelled() {
            in_flight.abort_all();
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    error!(error = %e, "endpoint delivery task failed");
                }
            }
        }

        debug!(
            provider_id = provider.id,
            accepted,
            cancelled = cancel.is_cancelled(),
            "fan-out transport finished"
        );
    }
}
