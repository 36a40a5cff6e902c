use chrono::Local;
use log::LevelFilter;
use std::io::Write;

use crate::config::LogConfigFile;

/// 配置中的级别名称，无法识别时使用 info
fn level_filter(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// 初始化日志系统
///
/// 级别取自配置文件，设置了 RUST_LOG 时以环境变量为准。
/// 格式：`[2024-01-01 12:00:00.000] INFO  [dns_registry::cache] 消息`
pub fn init_logger(config: &LogConfigFile) -> Result<(), String> {
    let level = level_filter(&config.level);
    let show_timestamp = config.show_timestamp;
    let show_module = config.show_module;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    builder.format(move |buf, record| {
        if show_timestamp {
            write!(buf, "[{}] ", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))?;
        }
        write!(buf, "{:<5} ", record.level())?;
        if show_module {
            if let Some(module_path) = record.module_path() {
                write!(buf, "[{}] ", module_path)?;
            }
        }
        writeln!(buf, "{}", record.args())
    });

    builder
        .try_init()
        .map_err(|e| format!("设置日志器失败: {}", e))
}
