//! # Prometheus 指标收集模块
//!
//! 推送分发管线的统一指标。

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use tracing::warn;

use crate::domain::model::DispatchResult;

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 推送分发指标
pub struct DispatchMetrics {
    /// 分发结果总数（按服务商类型、结果分类）
    pub dispatch_results_total: IntCounterVec,
    /// 订阅设备标识回写次数
    pub key_updates_total: IntCounterVec,
    /// 单次分发耗时（秒）
    pub dispatch_duration_seconds: HistogramVec,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        let dispatch_results_total = IntCounterVec::new(
            Opts::new(
                "push_dispatch_results_total",
                "Total number of per-endpoint dispatch results",
            ),
            &["provider_type", "outcome"],
        )
        .expect("Failed to create push_dispatch_results_total metric");

        let key_updates_total = IntCounterVec::new(
            Opts::new(
                "push_dispatch_key_updates_total",
                "Total number of subscription device key updates",
            ),
            &["outcome"],
        )
        .expect("Failed to create push_dispatch_key_updates_total metric");

        let dispatch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "push_dispatch_duration_seconds",
                "Dispatch duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["provider_type"],
        )
        .expect("Failed to create push_dispatch_duration_seconds metric");

        // 注册指标，忽略重复注册错误（测试中会多次创建）
        let _ = REGISTRY.register(Box::new(dispatch_results_total.clone()));
        let _ = REGISTRY.register(Box::new(key_updates_total.clone()));
        let _ = REGISTRY.register(Box::new(dispatch_duration_seconds.clone()));

        Self {
            dispatch_results_total,
            key_updates_total,
            dispatch_duration_seconds,
        }
    }

    pub fn observe_result(&self, result: &DispatchResult) {
        let outcome = result.error_kind().map(|kind| kind.as_str()).unwrap_or("success");
        self.dispatch_results_total
            .with_label_values(&[result.provider.provider_type.as_str(), outcome])
            .inc();
    }

    pub fn observe_key_update(&self, succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "failed" };
        self.key_updates_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Prometheus 指标导出格式
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
