use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::debug;

use crate::config::StoreConfig;
use crate::domain::repository::SubscriptionStore;
use crate::error::StoreError;

/// PostgreSQL 订阅存储
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: Arc<PgPool>,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(url: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect to postgres: {e}")))?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn update_key(&self, subscription_id: i64, new_key: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET device_key = $1
            WHERE id = $2
            "#,
        )
        .bind(new_key)
        .bind(subscription_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SubscriptionNotFound(subscription_id));
        }

        debug!(subscription_id, "subscription device key persisted");
        Ok(())
    }
}
