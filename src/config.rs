use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::catalog::CustomServer;

/// 默认主服务器（第一个内置服务器）
pub const DEFAULT_PRIMARY_SERVER: &str = "0";
/// 默认备用服务器
pub const DEFAULT_SECONDARY_SERVER: &str = "1";
/// DoH 主机名预解析的默认超时
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 5000;

/// DNS 查询方式，由外部的 provider 选择组件决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMethod {
    #[default]
    Udp,
    Tcp,
    Tls,
    /// RFC 8484 DNS-over-HTTPS
    HttpsIetf,
    /// JSON 格式的 DNS-over-HTTPS
    HttpsJson,
}

impl QueryMethod {
    /// 该传输方式是否通过主机名寻址（需要预解析）
    pub fn is_hostname_addressed(&self) -> bool {
        matches!(self, QueryMethod::HttpsIetf | QueryMethod::HttpsJson)
    }
}

/// 用户偏好设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 主 DNS 服务器标识
    pub primary_server: String,
    /// 备用 DNS 服务器标识
    pub secondary_server: String,
    /// 为 true 时跳过 DoH 主机名预解析
    pub dont_build_doh_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary_server: DEFAULT_PRIMARY_SERVER.to_string(),
            secondary_server: DEFAULT_SECONDARY_SERVER.to_string(),
            dont_build_doh_cache: false,
        }
    }
}

/// 外部配置存储
///
/// 自定义服务器列表只由存储自身修改，这里只读。
pub trait ConfigStore: Send + Sync {
    fn settings(&self) -> Settings;

    /// 自定义服务器，按存储中的顺序
    fn custom_servers(&self) -> Vec<CustomServer>;
}

/// 当前生效的查询方式
pub trait QueryMethodSource: Send + Sync {
    fn current_query_method(&self) -> QueryMethod;
}

impl QueryMethodSource for QueryMethod {
    fn current_query_method(&self) -> QueryMethod {
        *self
    }
}

/// 内存中的配置存储
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    settings: RwLock<Settings>,
    custom_servers: RwLock<Vec<CustomServer>>,
    query_method: RwLock<QueryMethod>,
}

impl MemoryConfigStore {
    pub fn new(settings: Settings, custom_servers: Vec<CustomServer>) -> Self {
        warn_duplicate_ids(&custom_servers);
        Self {
            settings: RwLock::new(settings),
            custom_servers: RwLock::new(custom_servers),
            query_method: RwLock::new(QueryMethod::default()),
        }
    }

    /// 设置查询方式
    pub fn with_query_method(self, method: QueryMethod) -> Self {
        self.set_query_method(method);
        self
    }

    pub fn set_settings(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn set_custom_servers(&self, servers: Vec<CustomServer>) {
        warn_duplicate_ids(&servers);
        *self
            .custom_servers
            .write()
            .unwrap_or_else(PoisonError::into_inner) = servers;
    }

    pub fn set_query_method(&self, method: QueryMethod) {
        *self
            .query_method
            .write()
            .unwrap_or_else(PoisonError::into_inner) = method;
    }
}

impl ConfigStore for MemoryConfigStore {
    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn custom_servers(&self) -> Vec<CustomServer> {
        self.custom_servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl QueryMethodSource for MemoryConfigStore {
    fn current_query_method(&self) -> QueryMethod {
        *self
            .query_method
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn warn_duplicate_ids(servers: &[CustomServer]) {
    let mut seen = HashSet::new();
    for server in servers {
        if !seen.insert(server.id.as_str()) {
            warn!("自定义服务器标识重复: {} ({})", server.id, server.name);
        }
    }
}

/// 日志配置段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfigFile {
    /// 日志级别: off, error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 是否显示时间戳
    #[serde(default = "default_true")]
    pub show_timestamp: bool,
    /// 是否显示模块路径
    #[serde(default = "default_true")]
    pub show_module: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_resolve_timeout_ms() -> u64 {
    DEFAULT_RESOLVE_TIMEOUT_MS
}

impl Default for LogConfigFile {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_timestamp: true,
            show_module: true,
        }
    }
}

/// JSON 配置文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub query_method: QueryMethod,
    /// DoH 主机名预解析超时（毫秒）
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    /// VPN 是否处于激活状态
    #[serde(default)]
    pub vpn_active: bool,
    #[serde(default)]
    pub custom_servers: Vec<CustomServer>,
    #[serde(default)]
    pub log: LogConfigFile,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            query_method: QueryMethod::default(),
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            vpn_active: false,
            custom_servers: Vec::new(),
            log: LogConfigFile::default(),
        }
    }
}

impl FileConfig {
    /// 从文件读取配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::parse(&content)
    }

    /// 解析 JSON 配置内容
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("解析配置文件失败")
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// 转换为内存配置存储
    pub fn into_store(self) -> MemoryConfigStore {
        MemoryConfigStore::new(self.settings, self.custom_servers)
            .with_query_method(self.query_method)
    }
}
