// demos/forwarding_lookup.rs
// 控制面重建缓存，转发任务只读缓存

use anyhow::Result;
use dns_registry::{
    DnsServerRegistry, MemoryConfigStore, QueryMethod, ServerCatalog, Settings, SystemResolver,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    // 4 / 5 是内置的 Cloudflare DoH 与 Google DoH
    let settings = Settings {
        primary_server: "4".to_string(),
        secondary_server: "5".to_string(),
        dont_build_doh_cache: false,
    };
    let store = Arc::new(
        MemoryConfigStore::new(settings, Vec::new()).with_query_method(QueryMethod::HttpsIetf),
    );
    let catalog = ServerCatalog::with_default_builtins(store.clone());
    let registry = Arc::new(DnsServerRegistry::new(catalog, store, Arc::new(true)));

    // 转发路径持有缓存句柄
    let cache = registry.cache();
    let forwarding = tokio::spawn(async move {
        let upstream: IpAddr = "208.67.222.222".parse().unwrap();
        for _ in 0..5 {
            println!("转发到 {} 使用端口 {}", upstream, cache.port_for_ip(upstream, 53));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });

    registry.rebuild_cache(&SystemResolver).await;
    for host in ["cloudflare-dns.com", "dns.google"] {
        match registry.resolved_addresses(host) {
            Some(ips) => println!("{} 预解析: {:?}", host, ips),
            None => println!("{} 没有预解析结果，使用回退方式", host),
        }
    }

    forwarding.await?;
    registry.cache().metrics().print_summary();
    Ok(())
}
