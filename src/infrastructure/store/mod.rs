pub mod memory;
pub mod postgres;

use std::sync::Arc;

use tracing::info;

use crate::config::StoreConfig;
use crate::domain::repository::SubscriptionStore;
use crate::error::StoreError;

pub use memory::InMemorySubscriptionStore;
pub use postgres::PostgresSubscriptionStore;

pub type SubscriptionStoreRef = Arc<dyn SubscriptionStore>;

/// 配置了 postgres_url 时使用 PostgreSQL，否则使用内存存储
pub async fn build_subscription_store(
    config: &StoreConfig,
) -> Result<SubscriptionStoreRef, StoreError> {
    match config.postgres_url.as_deref() {
        Some(url) => {
            let store: SubscriptionStoreRef =
                Arc::new(PostgresSubscriptionStore::connect(url, config).await?);
            info!("using postgres subscription store");
            Ok(store)
        }
        None => {
            info!("postgres_url not configured, using in-memory subscription store");
            let store: SubscriptionStoreRef = InMemorySubscriptionStore::shared();
            Ok(store)
        }
    }
}
