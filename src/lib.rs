//! DNS 服务器注册表与解析缓存
//!
//! 维护内置和用户自定义的 DNS 服务器，把服务器标识解析为地址和端口，
//! 并为通过主机名寻址的 DoH 服务器预先解析 IP，使转发路径上不需要阻塞解析。

pub mod activation;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod selection;

pub use activation::{ActivationTracker, VpnActivation};
pub use cache::{CacheSnapshot, RebuildRequest, ResolutionCache};
pub use catalog::{
    BuiltinServer, CustomServer, Localizer, PlainLocalizer, ServerCatalog, ServerDescriptor,
    BUILTIN_SERVERS,
};
pub use config::{ConfigStore, FileConfig, MemoryConfigStore, QueryMethod, QueryMethodSource, Settings};
pub use error::ResolveError;
pub use metrics::CacheMetrics;
pub use registry::DnsServerRegistry;
pub use resolver::{HostnameResolver, SystemResolver};
pub use selection::SelectionPolicy;
