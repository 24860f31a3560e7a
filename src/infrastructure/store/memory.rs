use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::repository::SubscriptionStore;
use crate::error::StoreError;

/// 内存订阅存储（订阅 ID -> 设备标识）
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    device_keys: DashMap<i64, String>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, subscription_id: i64, device_key: impl Into<String>) {
        self.device_keys.insert(subscription_id, device_key.into());
    }

    pub fn device_key(&self, subscription_id: i64) -> Option<String> {
        self.device_keys
            .get(&subscription_id)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn update_key(&self, subscription_id: i64, new_key: &str) -> Result<(), StoreError> {
        match self.device_keys.get_mut(&subscription_id) {
            Some(mut entry) => {
                *entry = new_key.to_string();
                Ok(())
            }
            None => Err(StoreError::SubscriptionNotFound(subscription_id)),
        }
    }
}
