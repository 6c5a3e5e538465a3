//! Engine configuration

/// Store configuration
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | DB_TRANSACTION_RETRIES | 5 | 写事务最大尝试次数 |
/// | DB_PATH | access-core.redb | redb 数据库文件 |
/// | DB_USE_METRICS | false | 记录查询耗时 |
/// | DB_METRICS_THRESHOLD_MS | 0 | 超过该耗时才记录 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (unset) | 文件日志目录 |
/// | EVENT_CHANNEL_CAPACITY | 1024 | 生命周期事件通道容量 |
///
/// # 示例
///
/// ```ignore
/// DB_TRANSACTION_RETRIES=3 DB_USE_METRICS=true cargo test
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Attempts for insert/update/delete, at least 1
    pub transaction_retries: u32,
    /// redb database file
    pub db_path: String,
    /// Log timing of customized queries and counts
    pub use_metrics: bool,
    /// Only queries slower than this are logged
    pub metrics_threshold_ms: u64,
    /// 日志级别
    pub log_level: String,
    /// 文件日志目录
    pub log_dir: Option<String>,
    /// Capacity of the lifecycle event broadcast channel
    pub event_channel_capacity: usize,
}

pub const DEFAULT_TRANSACTION_RETRIES: u32 = 5;

impl StoreConfig {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transaction_retries: std::env::var("DB_TRANSACTION_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.transaction_retries)
                .max(1),
            db_path: std::env::var("DB_PATH").unwrap_or(defaults.db_path),
            use_metrics: std::env::var("DB_USE_METRICS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.use_metrics),
            metrics_threshold_ms: std::env::var("DB_METRICS_THRESHOLD_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_threshold_ms),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.event_channel_capacity),
        }
    }

    /// 使用自定义值覆盖配置
    pub fn with_overrides(mut self, transaction_retries: u32, use_metrics: bool) -> Self {
        self.transaction_retries = transaction_retries.max(1);
        self.use_metrics = use_metrics;
        self
    }

    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = path.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            transaction_retries: DEFAULT_TRANSACTION_RETRIES,
            db_path: "access-core.redb".into(),
            use_metrics: false,
            metrics_threshold_ms: 0,
            log_level: "info".into(),
            log_dir: None,
            event_channel_capacity: 1024,
        }
    }
}

/// Load `.env` from the working directory if present
pub fn load_dotenv() {
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.transaction_retries, 5);
        assert!(!config.use_metrics);
        assert_eq!(config.event_channel_capacity, 1024);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_overrides_never_go_below_one_attempt() {
        let config = StoreConfig::default().with_overrides(0, true);
        assert_eq!(config.transaction_retries, 1);
        assert!(config.use_metrics);
    }

    #[test]
    fn test_with_db_path() {
        let config = StoreConfig::default().with_db_path("/tmp/roles.redb");
        assert_eq!(config.db_path, "/tmp/roles.redb");
    }
}
