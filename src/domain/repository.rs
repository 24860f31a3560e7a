//! 外部协作者接口（Port）

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::model::{DeliveryEndpoint, DispatchResult, Notification, Provider};
use crate::error::StoreError;

/// 推送网络传输层
///
/// 约定：
/// - 必须把 `endpoints` 读到关闭为止
/// - 每读到一个端点，必须向 `results` 写入且只写入一个结果
/// - 结束时释放 `results`（关闭结果通道），关闭由传输层负责
/// - `cancel` 被取消时应尽快返回，此时允许丢弃未完成的结果
#[async_trait]
pub trait Transport: Send + Sync {
    async fn push(
        &self,
        provider: Arc<Provider>,
        endpoints: mpsc::Receiver<DeliveryEndpoint>,
        results: mpsc::Sender<DispatchResult>,
        notification: Arc<Notification>,
        cancel: CancellationToken,
    );
}

/// 订阅存储（Repository）
///
/// 对同一个 `new_key` 重复调用必须是幂等的。
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn update_key(&self, subscription_id: i64, new_key: &str) -> Result<(), StoreError>;
}
