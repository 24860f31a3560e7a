//! 服务商解析：为投递端点选择推送服务商

use tracing::debug;

use crate::domain::model::{DeliveryEndpoint, Provider};
use crate::error::ResolveError;

/// 服务商解析器
///
/// 端点显式指定服务商名称时只按名称查找，不做推断；
/// 未指定时，仅当端点所属服务下同类型服务商唯一才作为默认值。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderResolver;

impl ProviderResolver {
    pub fn resolve<'a>(
        endpoint: &DeliveryEndpoint,
        known_providers: &'a [Provider],
    ) -> Result<&'a Provider, ResolveError> {
        match endpoint.provider_name.as_deref() {
            Some(name) => Self::resolve_named(endpoint, name, known_providers),
            None => Self::resolve_default(endpoint, known_providers),
        }
    }

    fn resolve_named<'a>(
        endpoint: &DeliveryEndpoint,
        name: &str,
        known_providers: &'a [Provider],
    ) -> Result<&'a Provider, ResolveError> {
        known_providers
            .iter()
            .find(|provider| {
                provider.service_id == endpoint.service_id
                    && provider.provider_type == endpoint.provider_type
                    && provider.name == name
            })
            .ok_or_else(|| ResolveError::ProviderNotFound {
                service_id: endpoint.service_id,
                provider_type: endpoint.provider_type.clone(),
                name: name.to_string(),
            })
    }

    fn resolve_default<'a>(
        endpoint: &DeliveryEndpoint,
        known_providers: &'a [Provider],
    ) -> Result<&'a Provider, ResolveError> {
        let mut candidates = known_providers
            .iter()
            .filter(|provider| {
                provider.service_id == endpoint.service_id
                    && provider.provider_type == endpoint.provider_type
            });

        match (candidates.next(), candidates.next()) {
            (Some(provider), None) => {
                debug!(
                    provider_id = provider.id,
                    provider_type = %provider.provider_type,
                    "resolved default push service provider"
                );
                Ok(provider)
            }
            (None, _) => Err(ResolveError::NoProviderConfigured {
                service_id: endpoint.service_id,
                provider_type: endpoint.provider_type.clone(),
            }),
            (Some(_), Some(_)) => Err(ResolveError::AmbiguousProvider {
                service_id: endpoint.service_id,
                provider_type: endpoint.provider_type.clone(),
                count: 2 + candidates.count(),
            }),
        }
    }
}
