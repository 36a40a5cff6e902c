use log::info;
use std::net::IpAddr;
use std::sync::Arc;

use crate::activation::{ActivationTracker, VpnActivation};
use crate::cache::{RebuildRequest, ResolutionCache};
use crate::catalog::{CustomServer, Localizer, ServerCatalog, ServerDescriptor};
use crate::config::QueryMethodSource;
use crate::resolver::HostnameResolver;
use crate::selection::SelectionPolicy;

/// DNS 服务器注册表
///
/// 供 UI 和转发路径使用的统一查询入口。所有按标识查询的接口在找不到时
/// 都返回第一个内置服务器的值，不返回错误。
pub struct DnsServerRegistry {
    catalog: ServerCatalog,
    policy: SelectionPolicy,
    tracker: ActivationTracker,
    cache: Arc<ResolutionCache>,
    query_method: Arc<dyn QueryMethodSource>,
}

impl DnsServerRegistry {
    pub fn new(
        catalog: ServerCatalog,
        query_method: Arc<dyn QueryMethodSource>,
        vpn: Arc<dyn VpnActivation>,
    ) -> Self {
        let policy = SelectionPolicy::new(catalog.clone());
        let tracker = ActivationTracker::new(policy.clone(), vpn);
        Self {
            catalog,
            policy,
            tracker,
            cache: Arc::new(ResolutionCache::new()),
            query_method,
        }
    }

    /// 使用外部创建的缓存（例如自定义了解析超时）
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// 缓存句柄，交给转发路径持有
    pub fn cache(&self) -> Arc<ResolutionCache> {
        self.cache.clone()
    }

    /// 按当前配置重建解析缓存
    ///
    /// 可能进行网络解析，只应在控制面调用。
    pub async fn rebuild_cache<R: HostnameResolver>(&self, resolver: &R) {
        let settings = self.catalog.store().settings();
        let query_method = self.query_method.current_query_method();
        let request = RebuildRequest {
            query_method,
            skip_doh_cache: settings.dont_build_doh_cache,
            active_addresses: vec![
                self.address_of(&self.policy.primary_id()),
                self.address_of(&self.policy.secondary_id()),
            ],
        };

        info!(
            "重建解析缓存: 查询方式 {:?}, 预解析 {}",
            query_method,
            request.wants_host_resolution()
        );
        self.cache.rebuild(&self.catalog, &request, resolver).await;
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// 地址对应的端口，未缓存时返回 `default_port`
    pub fn port_for(&self, address: &str, default_port: u16) -> u16 {
        self.cache.port_for(address, default_port)
    }

    pub fn port_for_ip(&self, ip: IpAddr, default_port: u16) -> u16 {
        self.cache.port_for_ip(ip, default_port)
    }

    pub fn resolved_addresses(&self, hostname: &str) -> Option<Vec<IpAddr>> {
        self.cache.resolved_addresses(hostname)
    }

    pub fn find_by_id(&self, id: &str) -> ServerDescriptor {
        self.catalog.find_by_id(id)
    }

    /// 服务器地址，找不到时为默认服务器的地址
    pub fn address_of(&self, id: &str) -> String {
        self.catalog.find_by_id(id).address().to_string()
    }

    /// 显示名称，找不到时为默认服务器的名称
    pub fn description_of(&self, id: &str, localizer: &dyn Localizer) -> String {
        self.catalog.find_by_id(id).description(localizer)
    }

    /// 全部标识：内置在前，自定义在后
    pub fn all_ids(&self) -> Vec<String> {
        self.catalog
            .all_descriptors()
            .iter()
            .map(|server| server.id().to_string())
            .collect()
    }

    /// 全部显示名称，顺序与 [`all_ids`](Self::all_ids) 一致
    pub fn all_descriptions(&self, localizer: &dyn Localizer) -> Vec<String> {
        self.catalog
            .all_descriptors()
            .iter()
            .map(|server| server.description(localizer))
            .collect()
    }

    pub fn all_descriptors(&self) -> Vec<ServerDescriptor> {
        self.catalog.all_descriptors()
    }

    pub fn position_of(&self, id: &str) -> usize {
        self.policy.position_of(id)
    }

    pub fn primary_id(&self) -> String {
        self.policy.primary_id()
    }

    pub fn secondary_id(&self) -> String {
        self.policy.secondary_id()
    }

    pub fn is_active_custom_server(&self, server: &CustomServer) -> bool {
        self.tracker.is_active_custom_server(server)
    }
}
