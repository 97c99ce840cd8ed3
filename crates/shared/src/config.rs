//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::error::{Result, StockError};

/// 数据库配置
///
/// 嵌入式 SQLite 数据库，`url` 形如 `sqlite://stock.db`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://stock.db".to_string(),
            max_connections: 5,
            connect_timeout_seconds: 30,
        }
    }
}

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 数据生成配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// 每批生成并落库的记录数
    pub batch_size: usize,
    /// 随机数种子，未设置时使用系统熵源
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            seed: None,
        }
    }
}

/// Webhook 回放配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// 单个出站请求的超时时间
    pub request_timeout_seconds: u64,
    /// 进程退出时等待回放任务完成的最长时间
    pub drain_timeout_seconds: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 10,
            drain_timeout_seconds: 30,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    pub json_logs: bool,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub generator: GeneratorConfig,
    pub webhook: WebhookConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（STOCK_ 前缀，层级用双下划线，如 STOCK_DATABASE__URL -> database.url）
    /// 5. 服务端口环境变量（如 MOCK_STOCK_PORT）
    pub fn load(service_name: &str) -> std::result::Result<Self, ConfigError> {
        // .env 文件可选，不存在时忽略
        let _ = dotenvy::dotenv();

        let env = std::env::var("STOCK_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("STOCK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = Self::get_service_port_from_env(service_name) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 从环境变量获取服务端口
    ///
    /// 将 "mock-stock" 转换为 "MOCK_STOCK_PORT"
    fn get_service_port_from_env(service_name: &str) -> Option<u16> {
        std::env::var(Self::port_env_var_name(service_name))
            .ok()
            .and_then(|v| v.parse().ok())
    }

    fn port_env_var_name(service_name: &str) -> String {
        format!("{}_PORT", service_name.to_uppercase().replace('-', "_"))
    }

    /// 校验配置取值
    ///
    /// 批大小和连接数为 0 时服务无法正常工作，启动阶段直接拒绝
    pub fn validate(&self) -> Result<()> {
        if self.generator.batch_size == 0 {
            return Err(StockError::Config(
                "generator.batch_size 必须大于 0".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(StockError::Config(
                "database.max_connections 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.url, "sqlite://stock.db");
        assert_eq!(config.generator.batch_size, 1000);
        assert!(config.generator.seed.is_none());
        assert_eq!(config.webhook.drain_timeout_seconds, 30);
        assert!(!config.observability.metrics_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_addr() {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.generator.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");

        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_env_var_name() {
        assert_eq!(AppConfig::port_env_var_name("mock-stock"), "MOCK_STOCK_PORT");
        assert_eq!(
            AppConfig::port_env_var_name("my-custom-service"),
            "MY_CUSTOM_SERVICE_PORT"
        );
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        // 指向不存在的目录，所有配置文件均为可选
        // SAFETY: 测试只设置本测试专用的变量
        unsafe {
            std::env::set_var("CONFIG_DIR", "/nonexistent-config-dir");
        }
        let config = AppConfig::load("stock-config-test").unwrap();
        assert_eq!(config.service_name, "stock-config-test");
        assert_eq!(config.generator.batch_size, 1000);
        unsafe {
            std::env::remove_var("CONFIG_DIR");
        }
    }
}
