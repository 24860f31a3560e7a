//! 推送应用服务：把一条推送请求分发到订阅者的全部设备

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::model::{
    DeliveryEndpoint, DispatchResult, Notification, Provider, Service, Subscription,
};
use crate::domain::service::{DispatchController, DispatchStream, ProviderResolver};
use crate::error::{PushServiceError, ResolveError};

/// 推送请求，`content` 按服务商类型分别给出通知内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub service_alias: String,
    pub subscription_alias: String,
    #[serde(default)]
    pub content: Map<String, Value>,
}

impl PushRequest {
    /// 某服务商类型的通知内容
    pub fn content_for_provider(
        &self,
        provider_type: &str,
    ) -> Result<Option<&Map<String, Value>>, PushServiceError> {
        match self.content.get(provider_type) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(content)) => Ok(Some(content)),
            Some(other) => Err(PushServiceError::InvalidContent(format!(
                "content for {provider_type} must be an object, got {other}"
            ))),
        }
    }
}

/// 生成推送通知 ID：十六进制时间戳 + 16 字节随机数
pub fn unique_push_notification_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{:x}-{}", Utc::now().timestamp(), URL_SAFE.encode(bytes))
}

/// 订阅被跳过的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Unresolved(ResolveError),
    EmptyContent { provider_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSubscription {
    pub subscription_id: i64,
    pub reason: SkipReason,
}

/// 推送汇总
#[derive(Debug, Default)]
pub struct PushReport {
    pub notification_id: String,
    pub delivered: Vec<DispatchResult>,
    pub failures: Vec<DispatchResult>,
    pub skipped: Vec<SkippedSubscription>,
}

impl PushReport {
    fn new(notification_id: String) -> Self {
        Self {
            notification_id,
            ..Default::default()
        }
    }

    fn skip(&mut self, subscription_id: i64, reason: SkipReason) {
        self.skipped.push(SkippedSubscription {
            subscription_id,
            reason,
        });
    }

    /// 没有任何端点分发失败（被跳过的订阅不算失败）
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .filter_map(|result| result.error.as_ref().map(ToString::to_string))
            .collect()
    }
}

struct DispatchGroup {
    provider: Arc<Provider>,
    notification: Notification,
    endpoints: Vec<DeliveryEndpoint>,
}

/// 推送应用服务
pub struct PushApplicationService {
    controller: Arc<DispatchController>,
}

impl PushApplicationService {
    pub fn new(controller: Arc<DispatchController>) -> Self {
        Self { controller }
    }

    /// 向订阅者的全部订阅推送通知
    ///
    /// 每个订阅先解析服务商，解析失败或没有对应内容的订阅被跳过；
    /// 同一服务商的端点合并为一次分发，全部结果读完后返回汇总。
    #[instrument(
        skip_all,
        fields(service = %service.alias, subscriber = %request.subscription_alias)
    )]
    pub async fn push_notification(
        &self,
        service: &Service,
        subscriptions: &[Subscription],
        request: &PushRequest,
    ) -> Result<PushReport, PushServiceError> {
        if subscriptions.is_empty() {
            return Err(PushServiceError::NoSubscriptions {
                subscriber: request.subscription_alias.clone(),
                service: service.alias.clone(),
            });
        }

        let mut report = PushReport::new(unique_push_notification_id());
        let mut groups: BTreeMap<i64, DispatchGroup> = BTreeMap::new();

        for subscription in subscriptions {
            if !subscription.enabled {
                report.skip(subscription.id, SkipReason::Disabled);
                continue;
            }

            let endpoint = subscription.to_endpoint();
            let provider = match ProviderResolver::resolve(&endpoint, &service.providers) {
                Ok(provider) => provider,
                Err(err) => {
                    warn!(
                        subscription_id = subscription.id,
                        error = %err,
                        "can't push to subscription"
                    );
                    report.skip(subscription.id, SkipReason::Unresolved(err));
                    continue;
                }
            };

            if let Some(group) = groups.get_mut(&provider.id) {
                group.endpoints.push(endpoint);
                continue;
            }

            let notification = request
                .content_for_provider(&provider.provider_type)?
                .map(Notification::from_content)
                .unwrap_or_default();
            if notification.is_empty() {
                info!(
                    subscription_id = subscription.id,
                    provider_type = %provider.provider_type,
                    "no content for push service provider type, ignoring"
                );
                report.skip(
                    subscription.id,
                    SkipReason::EmptyContent {
                        provider_type: provider.provider_type.clone(),
                    },
                );
                continue;
            }

            groups.insert(
                provider.id,
                DispatchGroup {
                    provider: Arc::new(provider.clone()),
                    notification,
                    endpoints: vec![endpoint],
                },
            );
        }

        let streams: Vec<DispatchStream> = groups
            .into_values()
            .map(|group| {
                debug!(
                    provider_id = group.provider.id,
                    endpoints = group.endpoints.len(),
                    "dispatching to push service provider"
                );
                self.controller
                    .push(group.provider, group.notification, group.endpoints)
            })
            .collect();

        let batches =
            futures::future::join_all(streams.into_iter().map(DispatchStream::collect_all)).await;
        for result in batches.into_iter().flatten() {
            if result.is_error() {
                report.failures.push(result);
            } else {
                report.delivered.push(result);
            }
        }

        info!(
            notification_id = %report.notification_id,
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "push notification dispatched"
        );

        Ok(report)
    }
}
