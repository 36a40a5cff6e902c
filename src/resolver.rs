use log::debug;
use std::future::Future;
use std::net::IpAddr;
use url::{Host, Url};

use crate::error::ResolveError;

/// 主机名加上该前缀后按 URL 解析
pub const HTTPS_PREFIX: &str = "https://";

/// 主机名解析器
///
/// 返回的地址顺序即缓存中保存的顺序。
pub trait HostnameResolver: Send + Sync {
    fn resolve_all(
        &self,
        hostname: &str,
    ) -> impl Future<Output = Result<Vec<IpAddr>, ResolveError>> + Send;
}

/// 使用系统解析器（tokio::net::lookup_host）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostnameResolver for SystemResolver {
    fn resolve_all(
        &self,
        hostname: &str,
    ) -> impl Future<Output = Result<Vec<IpAddr>, ResolveError>> + Send {
        let host = hostname.to_string();
        async move {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(vec![ip]);
            }

            debug!("DNS 查询: {}", host);
            let mut ips: Vec<IpAddr> = Vec::new();
            let addrs = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|source| ResolveError::Lookup {
                    host: host.clone(),
                    source,
                })?;
            for addr in addrs {
                // 同一地址可能因不同 socket 类型重复出现
                if !ips.contains(&addr.ip()) {
                    ips.push(addr.ip());
                }
            }

            if ips.is_empty() {
                return Err(ResolveError::Empty(host));
            }
            Ok(ips)
        }
    }
}

/// 从服务器地址中提取 DoH 主机名
///
/// `dns.example.com/dns-query` 与 `https://dns.example.com/dns-query`
/// 都得到 `dns.example.com`；IPv6 地址不带方括号。
pub fn doh_hostname(address: &str) -> Result<String, ResolveError> {
    let trimmed = address.trim();
    let with_scheme = if trimmed.starts_with(HTTPS_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{}{}", HTTPS_PREFIX, trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|e| ResolveError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        _ => Err(ResolveError::InvalidAddress {
            address: address.to_string(),
            reason: "缺少主机名".to_string(),
        }),
    }
}
