//! 服务器解析缓存
//!
//! 两张派生表：地址 → 端口，DoH 主机名 → 预解析的 IP 列表。
//! 重建时在旁边构造完整的新快照，再通过一次原子替换发布，
//! 转发路径上的读者只会看到旧快照或新快照。

use arc_swap::ArcSwap;
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::catalog::ServerCatalog;
use crate::config::{QueryMethod, DEFAULT_RESOLVE_TIMEOUT_MS};
use crate::error::ResolveError;
use crate::metrics::CacheMetrics;
use crate::resolver::{doh_hostname, HostnameResolver};

/// 一次完整构建出的缓存内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    ports: HashMap<String, u16>,
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl CacheSnapshot {
    /// 地址对应的端口（地址按规范形式比较）
    pub fn port(&self, address: &str) -> Option<u16> {
        self.ports.get(&canonical_address(address)).copied()
    }

    pub fn addresses(&self, hostname: &str) -> Option<&[IpAddr]> {
        self.hosts.get(hostname).map(Vec::as_slice)
    }

    pub fn ports(&self) -> &HashMap<String, u16> {
        &self.ports
    }

    pub fn hosts(&self) -> &HashMap<String, Vec<IpAddr>> {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.hosts.is_empty()
    }
}

/// 重建参数
#[derive(Debug, Clone, Default)]
pub struct RebuildRequest {
    /// 当前查询方式
    pub query_method: QueryMethod,
    /// 对应配置项 dont_build_doh_cache
    pub skip_doh_cache: bool,
    /// 主/备用服务器地址，按此顺序预解析
    pub active_addresses: Vec<String>,
}

impl RebuildRequest {
    /// 是否需要预解析主机名
    pub fn wants_host_resolution(&self) -> bool {
        self.query_method.is_hostname_addressed() && !self.skip_doh_cache
    }
}

/// 解析缓存
///
/// 由控制面重建和清空，转发路径只读。
pub struct ResolutionCache {
    current: ArcSwap<CacheSnapshot>,
    /// 串行化重建，避免较早开始的重建覆盖较新的结果
    rebuild_lock: Mutex<()>,
    /// 每次清空加一；重建只在期间没有发生清空时发布结果
    generation: AtomicU64,
    resolve_timeout: Duration,
    metrics: CacheMetrics,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CacheSnapshot::default()),
            rebuild_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            metrics: CacheMetrics::new(),
        }
    }

    /// 设置单个主机名的解析超时
    pub fn with_resolve_timeout(mut self, resolve_timeout: Duration) -> Self {
        self.resolve_timeout = resolve_timeout;
        self
    }

    pub fn resolve_timeout(&self) -> Duration {
        self.resolve_timeout
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.load_full()
    }

    /// 丢弃两张表，可重复调用
    ///
    /// 正在进行的重建不会再发布结果。
    pub fn clear(&self) {
        // 先推进代数再替换快照，重建的 rcu 才能看到其中之一
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.current.store(Arc::new(CacheSnapshot::default()));
        self.metrics.inc_clears();
        debug!("解析缓存已清空");
    }

    /// 重建缓存
    ///
    /// 新快照从空表开始构建：
    /// 1. 查询方式为 DoH 且未禁用预解析时，解析主/备用服务器的主机名，
    ///    单个主机名失败或超时只记录日志并跳过；
    /// 2. 写入所有内置和自定义服务器的地址 → 端口，自定义在后，同地址后写覆盖先写。
    ///
    /// 重建期间调用过 [`clear`](Self::clear) 时丢弃新快照，缓存保持清空后的状态。
    pub async fn rebuild<R: HostnameResolver>(
        &self,
        catalog: &ServerCatalog,
        request: &RebuildRequest,
        resolver: &R,
    ) {
        let _guard = self.rebuild_lock.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);
        let mut snapshot = CacheSnapshot::default();

        if request.wants_host_resolution() {
            snapshot.hosts = self
                .resolve_hosts(&request.active_addresses, resolver)
                .await;
        }

        for server in catalog.all_descriptors() {
            snapshot
                .ports
                .insert(canonical_address(server.address()), server.port());
        }

        let (port_count, host_count) = (snapshot.ports.len(), snapshot.hosts.len());
        let snapshot = Arc::new(snapshot);
        let mut published = false;
        self.current.rcu(|current| {
            published = self.generation.load(Ordering::SeqCst) == generation;
            if published {
                Arc::clone(&snapshot)
            } else {
                Arc::clone(current)
            }
        });

        if !published {
            info!("重建期间缓存被清空，丢弃本次重建结果");
            return;
        }
        info!(
            "解析缓存已重建: {} 个端口条目, {} 个预解析主机名",
            port_count, host_count
        );
        self.metrics.inc_rebuilds();
    }

    async fn resolve_hosts<R: HostnameResolver>(
        &self,
        addresses: &[String],
        resolver: &R,
    ) -> HashMap<String, Vec<IpAddr>> {
        let mut hostnames: Vec<String> = Vec::new();
        for address in addresses {
            match doh_hostname(address) {
                Ok(host) => {
                    if !hostnames.contains(&host) {
                        hostnames.push(host);
                    }
                }
                Err(e) => {
                    warn!("跳过 DoH 主机名预解析: {}", e);
                    self.metrics.inc_resolution_failures();
                }
            }
        }

        let lookups = hostnames.iter().map(|host| async move {
            let result = match timeout(self.resolve_timeout, resolver.resolve_all(host)).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Timeout {
                    host: host.clone(),
                    timeout: self.resolve_timeout,
                }),
            };
            (host, result)
        });

        let mut hosts = HashMap::new();
        for (host, result) in join_all(lookups).await {
            match result {
                Ok(ips) => {
                    debug!("预解析 {} -> {:?}", host, ips);
                    self.metrics.inc_resolved_hosts();
                    hosts.insert(host.clone(), ips);
                }
                Err(e) => {
                    warn!("DoH 主机名预解析失败: {}", e);
                    if e.is_timeout() {
                        self.metrics.inc_resolution_timeouts();
                    }
                    self.metrics.inc_resolution_failures();
                }
            }
        }
        hosts
    }

    /// 地址对应的端口，未缓存时返回 `default_port`
    pub fn port_for(&self, address: &str, default_port: u16) -> u16 {
        match self.current.load().port(address) {
            Some(port) => {
                self.metrics.inc_port_hits();
                port
            }
            None => {
                self.metrics.inc_port_misses();
                default_port
            }
        }
    }

    /// 同 [`port_for`](Self::port_for)，直接使用数据包中的 IP
    pub fn port_for_ip(&self, ip: IpAddr, default_port: u16) -> u16 {
        self.port_for(&ip.to_string(), default_port)
    }

    /// 预解析的地址；不存在时调用方应回退到其它方式
    pub fn resolved_addresses(&self, hostname: &str) -> Option<Vec<IpAddr>> {
        self.current
            .load()
            .addresses(hostname)
            .map(|ips| ips.to_vec())
    }
}

impl Drop for ResolutionCache {
    fn drop(&mut self) {
        let stats = self.metrics.snapshot();
        debug!(
            "解析缓存销毁: 重建 {}, 清空 {}, 端口命中率 {:.2}%",
            stats.rebuilds,
            stats.clears,
            self.metrics.port_hit_rate() * 100.0
        );
    }
}

/// IP 地址统一为标准文本形式，其它地址去掉首尾空白
fn canonical_address(address: &str) -> String {
    let trimmed = address.trim();
    match trimmed.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuiltinServer, CustomServer};
    use crate::config::{MemoryConfigStore, Settings};
    use crate::resolver::testing::StaticResolver;

    fn catalog(builtins: Vec<BuiltinServer>, customs: Vec<CustomServer>) -> ServerCatalog {
        let store = Arc::new(MemoryConfigStore::new(Settings::default(), customs));
        ServerCatalog::new(builtins, store).unwrap()
    }

    fn doh_catalog() -> ServerCatalog {
        catalog(
            vec![
                BuiltinServer::new("0", "1.1.1.1", 53, "a", "A"),
                BuiltinServer::new("1", "dns.google/dns-query", 443, "b", "B"),
                BuiltinServer::new("2", "cloudflare-dns.com/dns-query", 443, "c", "C"),
            ],
            vec![CustomServer::new("9", "Broken", "unresolvable.invalid/dns-query", 443)],
        )
    }

    fn doh_request(addresses: &[&str]) -> RebuildRequest {
        RebuildRequest {
            query_method: QueryMethod::HttpsIetf,
            skip_doh_cache: false,
            active_addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn resolver() -> StaticResolver {
        StaticResolver::new()
            .with_answer("dns.google", &["8.8.8.8", "8.8.4.4"])
            .with_answer("cloudflare-dns.com", &["104.16.248.249"])
    }

    #[test]
    fn test_canonical_address() {
        assert_eq!(canonical_address(" 9.9.9.9 "), "9.9.9.9");
        assert_eq!(
            canonical_address("2001:4860:4860:0:0:0:0:8888"),
            "2001:4860:4860::8888"
        );
        assert_eq!(canonical_address("dns.google/dns-query"), "dns.google/dns-query");
    }

    #[test]
    fn test_empty_cache_uses_fallback_port() {
        let cache = ResolutionCache::new();
        assert!(cache.snapshot().is_empty());
        assert_eq!(cache.port_for("1.1.1.1", 53), 53);
        assert_eq!(cache.port_for("not an address", 5353), 5353);
        assert_eq!(cache.resolved_addresses("dns.google"), None);
    }

    #[tokio::test]
    async fn test_rebuild_port_map_covers_every_server() {
        let catalog = catalog(
            vec![
                BuiltinServer::new("0", "1.1.1.1", 53, "a", "A"),
                BuiltinServer::new("1", "208.67.222.222", 5353, "b", "B"),
            ],
            vec![
                CustomServer::new("5", "Quad9", "9.9.9.9", 853),
                CustomServer::new("6", "Local", "2001:db8::53", 5300),
            ],
        );
        let cache = ResolutionCache::new();
        cache
            .rebuild(&catalog, &RebuildRequest::default(), &resolver())
            .await;

        for server in catalog.all_descriptors() {
            assert_eq!(cache.port_for(server.address(), 1), server.port());
        }
        assert_eq!(cache.port_for("2001:0db8:0:0:0:0:0:0053", 1), 5300);
        assert_eq!(cache.port_for_ip("9.9.9.9".parse().unwrap(), 53), 853);
        assert_eq!(cache.port_for("4.4.4.4", 53), 53);
    }

    #[tokio::test]
    async fn test_custom_overrides_builtin_on_same_address() {
        let catalog = catalog(
            vec![BuiltinServer::new("0", "9.9.9.9", 53, "a", "A")],
            vec![
                CustomServer::new("5", "First", "9.9.9.9", 853),
                CustomServer::new("6", "Second", "9.9.9.9", 8853),
            ],
        );
        let cache = ResolutionCache::new();
        cache
            .rebuild(&catalog, &RebuildRequest::default(), &resolver())
            .await;

        assert_eq!(cache.port_for("9.9.9.9", 53), 8853);
    }

    #[tokio::test]
    async fn test_udp_does_not_resolve_hostnames() {
        let catalog = doh_catalog();
        let resolver = resolver();
        let cache = ResolutionCache::new();
        let request = RebuildRequest {
            query_method: QueryMethod::Udp,
            ..doh_request(&["dns.google/dns-query"])
        };
        cache.rebuild(&catalog, &request, &resolver).await;

        assert_eq!(resolver.calls(), 0);
        assert!(cache.snapshot().hosts().is_empty());
        assert_eq!(cache.port_for("1.1.1.1", 0), 53);
    }

    #[tokio::test]
    async fn test_skip_doh_cache_flag() {
        let catalog = doh_catalog();
        let resolver = resolver();
        let cache = ResolutionCache::new();
        let request = RebuildRequest {
            skip_doh_cache: true,
            ..doh_request(&["dns.google/dns-query"])
        };
        cache.rebuild(&catalog, &request, &resolver).await;

        assert_eq!(resolver.calls(), 0);
        assert_eq!(cache.resolved_addresses("dns.google"), None);
        assert_eq!(cache.port_for("dns.google/dns-query", 0), 443);
    }

    #[tokio::test]
    async fn test_doh_resolves_primary_and_secondary() {
        let catalog = doh_catalog();
        let cache = ResolutionCache::new();
        cache
            .rebuild(
                &catalog,
                &doh_request(&["dns.google/dns-query", "cloudflare-dns.com/dns-query"]),
                &resolver(),
            )
            .await;

        let google: Vec<IpAddr> = vec!["8.8.8.8".parse().unwrap(), "8.8.4.4".parse().unwrap()];
        assert_eq!(cache.resolved_addresses("dns.google"), Some(google));
        assert_eq!(cache.snapshot().hosts().len(), 2);
        assert_eq!(cache.metrics().snapshot().resolved_hosts, 2);
    }

    #[tokio::test]
    async fn test_same_host_resolved_once() {
        let catalog = doh_catalog();
        let resolver = resolver();
        let cache = ResolutionCache::new();
        cache
            .rebuild(
                &catalog,
                &doh_request(&["dns.google/dns-query", "https://dns.google/resolve"]),
                &resolver,
            )
            .await;

        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_skipped() {
        let catalog = doh_catalog();
        let cache = ResolutionCache::new();
        cache
            .rebuild(
                &catalog,
                &doh_request(&["unresolvable.invalid/dns-query", "dns.google/dns-query"]),
                &resolver(),
            )
            .await;

        assert_eq!(cache.resolved_addresses("unresolvable.invalid"), None);
        assert!(cache.resolved_addresses("dns.google").is_some());
        // 解析失败不影响端口表
        assert_eq!(cache.port_for("unresolvable.invalid/dns-query", 0), 443);
        assert_eq!(cache.metrics().snapshot().resolution_failures, 1);
    }

    #[tokio::test]
    async fn test_malformed_address_is_skipped() {
        let catalog = doh_catalog();
        let resolver = resolver();
        let cache = ResolutionCache::new();
        cache
            .rebuild(&catalog, &doh_request(&["", "bad host/dns-query"]), &resolver)
            .await;

        assert_eq!(resolver.calls(), 0);
        assert!(cache.snapshot().hosts().is_empty());
        assert_eq!(cache.snapshot().ports().len(), 4);
        assert_eq!(cache.metrics().snapshot().resolution_failures, 2);
    }

    #[tokio::test]
    async fn test_resolution_timeout_is_skipped() {
        let catalog = doh_catalog();
        let resolver = resolver().with_delay(Duration::from_secs(30));
        let cache = ResolutionCache::new().with_resolve_timeout(Duration::from_millis(50));
        cache
            .rebuild(&catalog, &doh_request(&["dns.google/dns-query"]), &resolver)
            .await;

        assert_eq!(cache.resolved_addresses("dns.google"), None);
        assert_eq!(cache.port_for("1.1.1.1", 0), 53);
        let stats = cache.metrics().snapshot();
        assert_eq!(stats.resolution_timeouts, 1);
        assert_eq!(stats.resolution_failures, 1);
    }

    #[tokio::test]
    async fn test_clear_and_rebuild_are_idempotent() {
        let catalog = doh_catalog();
        let request = doh_request(&["dns.google/dns-query", "cloudflare-dns.com/dns-query"]);
        let cache = ResolutionCache::new();

        cache.clear();
        cache.clear();
        assert!(cache.snapshot().is_empty());

        cache.rebuild(&catalog, &request, &resolver()).await;
        let first = cache.snapshot();
        cache.rebuild(&catalog, &request, &resolver()).await;
        let second = cache.snapshot();
        assert_eq!(*first, *second);

        cache.clear();
        cache.rebuild(&catalog, &request, &resolver()).await;
        assert_eq!(*cache.snapshot(), *first);
        assert_eq!(cache.metrics().snapshot().clears, 3);
    }

    #[tokio::test]
    async fn test_rebuild_drops_stale_entries() {
        let store = Arc::new(MemoryConfigStore::new(
            Settings::default(),
            vec![CustomServer::new("5", "Old", "10.0.0.1", 5353)],
        ));
        let catalog = ServerCatalog::new(
            vec![BuiltinServer::new("0", "1.1.1.1", 53, "a", "A")],
            store.clone(),
        )
        .unwrap();
        let cache = ResolutionCache::new();
        cache
            .rebuild(&catalog, &RebuildRequest::default(), &resolver())
            .await;
        assert_eq!(cache.port_for("10.0.0.1", 53), 5353);

        store.set_custom_servers(vec![CustomServer::new("6", "New", "10.0.0.2", 853)]);
        cache
            .rebuild(&catalog, &RebuildRequest::default(), &resolver())
            .await;
        assert_eq!(cache.port_for("10.0.0.1", 53), 53);
        assert_eq!(cache.port_for("10.0.0.2", 53), 853);
    }

    #[tokio::test]
    async fn test_readers_see_old_snapshot_until_swap() {
        let catalog = doh_catalog();
        let cache = Arc::new(ResolutionCache::new());
        cache
            .rebuild(&catalog, &RebuildRequest::default(), &resolver())
            .await;
        let before = cache.snapshot();

        let slow = resolver().with_delay(Duration::from_millis(200));
        let rebuilding = {
            let cache = cache.clone();
            let catalog = catalog.clone();
            tokio::spawn(async move {
                let request = doh_request(&["dns.google/dns-query"]);
                cache.rebuild(&catalog, &request, &slow).await;
            })
        };

        // 重建进行中，读者仍然看到完整的旧快照
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*cache.snapshot(), *before);
        assert_eq!(cache.port_for("1.1.1.1", 0), 53);

        rebuilding.await.unwrap();
        assert!(cache.resolved_addresses("dns.google").is_some());
        assert_eq!(cache.snapshot().ports(), before.ports());
    }

    #[tokio::test]
    async fn test_clear_during_rebuild_wins() {
        let catalog = doh_catalog();
        let cache = Arc::new(ResolutionCache::new());

        let slow = resolver().with_delay(Duration::from_millis(200));
        let rebuilding = {
            let cache = cache.clone();
            let catalog = catalog.clone();
            tokio::spawn(async move {
                let request = doh_request(&["dns.google/dns-query"]);
                cache.rebuild(&catalog, &request, &slow).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.clear();
        rebuilding.await.unwrap();

        assert!(cache.snapshot().is_empty());
        assert_eq!(cache.port_for("1.1.1.1", 0), 0);
        assert_eq!(cache.metrics().snapshot().rebuilds, 0);

        // 清空之后开始的重建照常发布
        cache
            .rebuild(&catalog, &doh_request(&["dns.google/dns-query"]), &resolver())
            .await;
        assert_eq!(cache.port_for("1.1.1.1", 0), 53);
        assert!(cache.resolved_addresses("dns.google").is_some());
    }
}
