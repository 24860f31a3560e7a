//! 日志初始化

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// 从配置初始化日志系统
///
/// 优先使用环境变量 `RUST_LOG`，否则使用配置中的日志级别。
/// 已经初始化过时直接返回。
///
/// # 示例
/// ```rust,ignore
/// use flare_push_dispatch::{load_config, telemetry::init_tracing_from_config};
///
/// let config = load_config(None);
/// init_tracing_from_config(Some(&config.logging));
/// ```
pub fn init_tracing_from_config(logging_config: Option<&LoggingConfig>) {
    let default_config = LoggingConfig::default();
    let config = logging_config.unwrap_or(&default_config);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(config.level.as_str()),
    };

    let builder = fmt::Subscriber::builder()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_env_filter(env_filter);

    // 测试中会被多次调用
    let _ = builder.try_init();
}
