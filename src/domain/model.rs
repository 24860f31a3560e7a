//! 推送分发领域模型

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DispatchError, ErrorKind};

/// 易变数据中保存订阅 ID 的键
pub const SUBSCRIPTION_ID_KEY: &str = "subscription_id";

/// 未知类型时替换设备标识的默认键
const DEFAULT_DEVICE_KEY_NAME: &str = "regid";

/// 根据服务商类型返回设备标识的字段名
pub fn device_key_name(provider_type: &str) -> &'static str {
    match provider_type {
        "gcm" => "regid",
        "apns" => "devtoken",
        _ => "",
    }
}

/// 推送通知内容（字符串键值对，分发过程中只读）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl Notification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// 从 JSON 内容构建通知：字符串原样保留，整数转为字符串，其余类型忽略
    pub fn from_content(content: &Map<String, Value>) -> Self {
        let data = content
            .iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
                    _ => return None,
                };
                Some((key.clone(), value))
            })
            .collect();
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 推送服务（拥有一组推送服务商）
#[derive(Debug, Clone, Default)]
pub struct Service {
    pub id: i64,
    pub alias: String,
    pub providers: Vec<Provider>,
}

/// 推送服务商：一套推送网络凭证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub service_id: i64,
    /// 服务商名称，端点可通过名称显式指定
    pub name: String,
    /// 服务商类型（gcm / apns ...）
    pub provider_type: String,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl Provider {
    pub fn new(
        id: i64,
        service_id: i64,
        name: impl Into<String>,
        provider_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            service_id,
            name: name.into(),
            provider_type: provider_type.into(),
            credentials: HashMap::new(),
        }
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    /// 该类型服务商实际使用的凭证
    pub fn access_keys(&self) -> HashMap<String, String> {
        let names: &[&str] = match self.provider_type.as_str() {
            "gcm" => &["projectid", "apikey"],
            "apns" => &["cert", "key"],
            _ => return self.credentials.clone(),
        };

        names
            .iter()
            .map(|name| {
                let value = self.credentials.get(*name).cloned().unwrap_or_default();
                (name.to_string(), value)
            })
            .collect()
    }
}

/// 投递端点：一个订阅设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEndpoint {
    pub service_id: i64,
    pub provider_type: String,
    pub device_key: String,
    /// 显式指定的服务商名称
    pub provider_name: Option<String>,
    /// 分发过程中的关联数据（订阅 ID、替换后的设备标识等）
    pub volatile_data: HashMap<String, String>,
}

impl DeliveryEndpoint {
    pub fn new(
        service_id: i64,
        provider_type: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        Self {
            service_id,
            provider_type: provider_type.into(),
            device_key: device_key.into(),
            provider_name: None,
            volatile_data: HashMap::new(),
        }
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn with_subscription_id(mut self, subscription_id: i64) -> Self {
        self.volatile_data
            .insert(SUBSCRIPTION_ID_KEY.to_string(), subscription_id.to_string());
        self
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.volatile_data.get(SUBSCRIPTION_ID_KEY).map(String::as_str)
    }

    fn replacement_key_name(&self) -> &'static str {
        match device_key_name(&self.provider_type) {
            "" => DEFAULT_DEVICE_KEY_NAME,
            name => name,
        }
    }

    /// 推送网络返回的新设备标识
    ///
    /// 优先读取类型对应的字段，缺失或为空时回退到 `regid`。
    pub fn replacement_key(&self) -> Option<&str> {
        [self.replacement_key_name(), DEFAULT_DEVICE_KEY_NAME]
            .into_iter()
            .filter_map(|name| self.volatile_data.get(name))
            .map(String::as_str)
            .find(|key| !key.is_empty())
    }

    pub fn set_replacement_key(&mut self, key: impl Into<String>) {
        let name = self.replacement_key_name();
        self.volatile_data.insert(name.to_string(), key.into());
    }
}

/// 单个端点的分发结果
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub provider: Arc<Provider>,
    pub destination: DeliveryEndpoint,
    pub message_id: Option<String>,
    pub error: Option<DispatchError>,
}

impl DispatchResult {
    pub fn success(provider: Arc<Provider>, destination: DeliveryEndpoint) -> Self {
        Self {
            provider,
            destination,
            message_id: None,
            error: None,
        }
    }

    pub fn failure(
        provider: Arc<Provider>,
        destination: DeliveryEndpoint,
        error: DispatchError,
    ) -> Self {
        Self {
            provider,
            destination,
            message_id: None,
            error: Some(error),
        }
    }

    pub fn with_message_id(mut self, message_id: Option<String>) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(DispatchError::kind)
    }
}

/// 订阅记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub alias: String,
    pub service_id: i64,
    pub provider_type: String,
    pub device_key: String,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Subscription {
    /// 转换为投递端点，订阅 ID 写入易变数据以便回写新设备标识
    pub fn to_endpoint(&self) -> DeliveryEndpoint {
        let endpoint =
            DeliveryEndpoint::new(self.service_id, &self.provider_type, &self.device_key)
                .with_subscription_id(self.id);
        match &self.provider_name {
            Some(name) => endpoint.with_provider_name(name),
            None => endpoint,
        }
    }
}
