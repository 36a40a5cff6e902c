use anyhow::{bail, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ConfigStore;

/// 标准 DNS 端口
pub const DEFAULT_DNS_PORT: u16 = 53;

lazy_static! {
    /// 内置 DNS 服务器列表
    ///
    /// 顺序决定位置索引，只能在末尾追加。标识即位置。
    pub static ref BUILTIN_SERVERS: Vec<BuiltinServer> = vec![
        BuiltinServer::new("0", "1.1.1.1", DEFAULT_DNS_PORT, "server_cloudflare", "Cloudflare"),
        BuiltinServer::new("1", "8.8.8.8", DEFAULT_DNS_PORT, "server_google", "Google Public DNS"),
        BuiltinServer::new("2", "9.9.9.9", DEFAULT_DNS_PORT, "server_quad9", "Quad9"),
        BuiltinServer::new("3", "208.67.222.222", 5353, "server_opendns", "OpenDNS"),
        BuiltinServer::new("4", "cloudflare-dns.com/dns-query", 443, "server_cloudflare_doh", "Cloudflare DoH"),
        BuiltinServer::new("5", "dns.google/dns-query", 443, "server_google_doh", "Google DoH"),
        BuiltinServer::new("6", "dns.quad9.net/dns-query", 443, "server_quad9_doh", "Quad9 DoH"),
    ];
}

/// 内置服务器描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinServer {
    id: String,
    address: String,
    port: u16,
    /// 本地化字符串的键
    description_key: String,
    /// 未本地化的名称
    name: String,
}

impl BuiltinServer {
    pub fn new(id: &str, address: &str, port: u16, description_key: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            address: address.to_string(),
            port,
            description_key: description_key.to_string(),
            name: name.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn description_key(&self) -> &str {
        &self.description_key
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 用户自定义服务器，标识由外部配置存储分配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomServer {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_DNS_PORT
}

impl CustomServer {
    pub fn new(id: &str, name: &str, address: &str, port: u16) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            port,
        }
    }
}

/// 内置服务器的显示名称来源
pub trait Localizer {
    fn describe(&self, server: &BuiltinServer) -> String;
}

impl<F> Localizer for F
where
    F: Fn(&BuiltinServer) -> String,
{
    fn describe(&self, server: &BuiltinServer) -> String {
        self(server)
    }
}

/// 直接使用内置名称，不做翻译
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainLocalizer;

impl Localizer for PlainLocalizer {
    fn describe(&self, server: &BuiltinServer) -> String {
        server.name().to_string()
    }
}

/// DNS 服务器描述（内置或自定义）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerDescriptor {
    Builtin(BuiltinServer),
    Custom(CustomServer),
}

impl ServerDescriptor {
    pub fn id(&self) -> &str {
        match self {
            ServerDescriptor::Builtin(s) => s.id(),
            ServerDescriptor::Custom(s) => &s.id,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            ServerDescriptor::Builtin(s) => s.address(),
            ServerDescriptor::Custom(s) => &s.address,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            ServerDescriptor::Builtin(s) => s.port(),
            ServerDescriptor::Custom(s) => s.port,
        }
    }

    /// 显示名称：内置服务器经过本地化，自定义服务器使用用户填写的名称
    pub fn description(&self, localizer: &dyn Localizer) -> String {
        match self {
            ServerDescriptor::Builtin(s) => localizer.describe(s),
            ServerDescriptor::Custom(s) => s.name.clone(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ServerDescriptor::Custom(_))
    }
}

/// 服务器目录：内置列表在前，自定义列表在后
///
/// 自定义列表每次调用时从配置存储读取，目录本身不缓存也不修改它。
#[derive(Clone)]
pub struct ServerCatalog {
    builtins: Arc<[BuiltinServer]>,
    store: Arc<dyn ConfigStore>,
}

impl ServerCatalog {
    /// 使用给定的内置列表创建目录
    ///
    /// 内置列表不能为空（第一个条目是回退默认值），且每个内置标识必须等于其位置。
    pub fn new(builtins: Vec<BuiltinServer>, store: Arc<dyn ConfigStore>) -> Result<Self> {
        if builtins.is_empty() {
            bail!("内置服务器列表为空，缺少默认服务器");
        }
        for (position, server) in builtins.iter().enumerate() {
            if server.id() != position.to_string() {
                bail!(
                    "内置服务器标识 {} 与位置 {} 不一致 ({})",
                    server.id(),
                    position,
                    server.address()
                );
            }
        }

        Ok(Self {
            builtins: builtins.into(),
            store,
        })
    }

    /// 使用编译期内置的服务器列表
    pub fn with_default_builtins(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            builtins: BUILTIN_SERVERS.iter().cloned().collect(),
            store,
        }
    }

    pub fn builtins(&self) -> &[BuiltinServer] {
        &self.builtins
    }

    pub fn builtin_count(&self) -> usize {
        self.builtins.len()
    }

    pub fn custom_servers(&self) -> Vec<CustomServer> {
        self.store.custom_servers()
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// 回退默认服务器（第一个内置条目）
    pub fn default_server(&self) -> &BuiltinServer {
        &self.builtins[0]
    }

    /// 全部服务器：内置在前，自定义在后
    pub fn all_descriptors(&self) -> Vec<ServerDescriptor> {
        let customs = self.custom_servers();
        let mut servers = Vec::with_capacity(self.builtins.len() + customs.len());
        servers.extend(self.builtins.iter().cloned().map(ServerDescriptor::Builtin));
        servers.extend(customs.into_iter().map(ServerDescriptor::Custom));
        servers
    }

    /// 按标识查找，找不到时返回默认服务器
    pub fn find_by_id(&self, id: &str) -> ServerDescriptor {
        if let Some(server) = self.builtins.iter().find(|s| s.id() == id) {
            return ServerDescriptor::Builtin(server.clone());
        }
        if let Some(server) = self.custom_servers().into_iter().find(|s| s.id == id) {
            return ServerDescriptor::Custom(server);
        }

        log::debug!("未找到服务器 {}，使用默认服务器", id);
        ServerDescriptor::Builtin(self.default_server().clone())
    }
}

impl std::fmt::Debug for ServerCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCatalog")
            .field("builtins", &self.builtins)
            .finish_non_exhaustive()
    }
}
