//! 推送分发配置模块
//!
//! - 从 TOML 文件加载配置，文件缺失或无效时回退到默认值
//! - 环境变量 `FLARE_PUSH_DISPATCH_*` 覆盖文件中的配置

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::warn;

const ENV_PREFIX: &str = "FLARE_PUSH_DISPATCH";

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// 传输层配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 单次分发中同时进行的端点投递数
    pub max_in_flight: usize,
    /// 启用的服务商类型
    pub provider_types: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            provider_types: vec!["gcm".to_string(), "apns".to_string()],
        }
    }
}

/// 订阅存储配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// PostgreSQL 连接 URL，未配置时使用内存存储
    pub postgres_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            max_connections: 5,
        }
    }
}

/// 推送分发配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub logging: LoggingConfig,
    pub transport: TransportConfig,
    pub store: StoreConfig,
}

impl DispatchConfig {
    /// 用 `lookup` 提供的值覆盖配置（键为完整的环境变量名）
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{ENV_PREFIX}_{name}");

        if let Some(level) = lookup(&key("LOG_LEVEL")) {
            self.logging.level = level;
        }
        if let Some(raw) = lookup(&key("MAX_IN_FLIGHT")) {
            match raw.parse::<usize>() {
                Ok(value) if value > 0 => self.transport.max_in_flight = value,
                _ => warn!(value = %raw, "ignoring invalid MAX_IN_FLIGHT override"),
            }
        }
        if let Some(raw) = lookup(&key("PROVIDER_TYPES")) {
            self.transport.provider_types = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = lookup(&key("POSTGRES_URL")) {
            self.store.postgres_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(raw) = lookup(&key("POSTGRES_MAX_CONNECTIONS")) {
            match raw.parse::<u32>() {
                Ok(value) if value > 0 => self.store.max_connections = value,
                _ => warn!(value = %raw, "ignoring invalid POSTGRES_MAX_CONNECTIONS override"),
            }
        }
    }
}

/// 加载配置
///
/// 未指定路径时依次尝试 `config/push-dispatch.toml` 和 `push-dispatch.toml`。
pub fn load_config(path: Option<&str>) -> DispatchConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![
            PathBuf::from("config/push-dispatch.toml"),
            PathBuf::from("push-dispatch.toml"),
        ],
    };

    let mut cfg = load_with_fallback(&candidates);
    cfg.apply_overrides(|name| env::var(name).ok());
    cfg
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> DispatchConfig {
    for path in candidates {
        match load_config_from_file(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err:#}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    DispatchConfig::default()
}

/// 从文件加载配置
pub fn load_config_from_file(path: &Path) -> Result<DispatchConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("invalid config format: {}", path.display()))
}

/// 解析 TOML 配置内容
pub fn parse_config(content: &str) -> Result<DispatchConfig> {
    let cfg: DispatchConfig = toml::from_str(content)?;
    if cfg.transport.max_in_flight == 0 {
        return Err(anyhow!("transport.max_in_flight must be greater than zero"));
    }
    Ok(cfg)
}
