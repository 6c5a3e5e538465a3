//! 日志初始化
//!
//! Console output plus, when a directory is configured, two daily rolling
//! JSON files: `app` for everything else and `security` for permission
//! denials recorded through [`security_log!`](crate::security_log).

use crate::config::StoreConfig;
use std::path::Path;
use tracing::Metadata;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::filter_fn, fmt, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Target used by [`security_log!`](crate::security_log)
pub const SECURITY_TARGET: &str = "security";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console logging at `info`, `RUST_LOG` wins when set
pub fn init_logger() -> anyhow::Result<()> {
    init_logger_with_file("info", false, None)
}

/// Logging from [`StoreConfig::log_level`] and [`StoreConfig::log_dir`]
pub fn init_logger_from_config(config: &StoreConfig) -> anyhow::Result<()> {
    init_logger_with_file(&config.log_level, false, config.log_dir.as_deref())
}

/// `level` applies unless `RUST_LOG` is set. With `log_dir`, files land in
/// `<dir>/app/app.YYYY-MM-DD` and `<dir>/security/security.YYYY-MM-DD`.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let mut layers = vec![console_layer(json_format)];
    if let Some(dir) = log_dir {
        let dir = Path::new(dir);
        layers.push(rolling_layer(dir, "app", |meta| meta.target() != SECURITY_TARGET)?);
        layers.push(rolling_layer(dir, SECURITY_TARGET, |meta| {
            meta.target() == SECURITY_TARGET
        })?);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn console_layer(json: bool) -> BoxedLayer {
    let layer = fmt::layer().with_file(false).with_line_number(false);
    if json {
        layer.json().with_current_span(true).with_thread_ids(true).boxed()
    } else {
        layer.with_target(false).boxed()
    }
}

/// JSON file layer under `<dir>/<name>/`, rotated daily
fn rolling_layer(
    dir: &Path,
    name: &str,
    keep: fn(&Metadata<'_>) -> bool,
) -> std::io::Result<BoxedLayer> {
    let dir = dir.join(name);
    std::fs::create_dir_all(&dir)?;
    let writer = RollingFileAppender::new(Rotation::DAILY, dir, name);
    Ok(fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(filter_fn(keep))
        .boxed())
}

/// Records a permission related event on the `security` target
///
/// ```no_run
/// access_core::security_log!(WARN, "permission_denied", holder = "alice", action = "update");
/// ```
#[macro_export]
macro_rules! security_log {
    ($level:ident, $event:expr, $($arg:tt)*) => {
        tracing::event!(
            target: "security",
            tracing::Level::$level,
            event = $event,
            $($arg)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_gets_both_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        // 其他测试可能已经安装了全局 subscriber
        let _ = init_logger_with_file("debug", true, Some(&path));
        assert!(dir.path().join("app").is_dir());
        assert!(dir.path().join("security").is_dir());
    }

    #[test]
    fn test_security_log_accepts_any_level() {
        crate::security_log!(INFO, "role_deleted", role = "ops");
        crate::security_log!(ERROR, "permission_denied", holder = "bob");
    }
}
