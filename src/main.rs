use anyhow::{Context, Result};
use dns_registry::logger::init_logger;
use dns_registry::{
    DnsServerRegistry, FileConfig, PlainLocalizer, ResolutionCache, ServerCatalog,
    ServerDescriptor, SystemResolver,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // 读取配置文件路径（命令行参数或默认值）
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());

    let config = if Path::new(&config_path).exists() {
        FileConfig::load(&config_path)?
    } else {
        eprintln!("配置文件 {} 不存在，使用默认配置", config_path);
        FileConfig::default()
    };

    init_logger(&config.log).map_err(|e| anyhow::anyhow!("初始化日志系统失败: {}", e))?;

    log::info!("=== DNS 服务器注册表 ===");
    log::info!("配置文件: {}", config_path);
    log::info!("查询方式: {:?}", config.query_method);
    log::info!("自定义服务器: {} 个", config.custom_servers.len());

    let cache = Arc::new(ResolutionCache::new().with_resolve_timeout(config.resolve_timeout()));
    let vpn = Arc::new(AtomicBool::new(config.vpn_active));
    let store = Arc::new(config.into_store());
    let catalog = ServerCatalog::with_default_builtins(store.clone());
    let registry = Arc::new(DnsServerRegistry::new(catalog, store, vpn).with_cache(cache.clone()));

    // 解析可能阻塞较长时间，放到单独的任务中执行
    let handle = registry.clone();
    tokio::spawn(async move { handle.rebuild_cache(&SystemResolver).await })
        .await
        .context("重建解析缓存的任务异常退出")?;

    print_servers(&registry);
    print_cache(&cache);
    cache.metrics().print_summary();

    Ok(())
}

fn print_servers(registry: &DnsServerRegistry) {
    let primary = registry.primary_id();
    let secondary = registry.secondary_id();

    println!("主服务器: {} ({})", primary, registry.description_of(&primary, &PlainLocalizer));
    println!(
        "备用服务器: {} ({})",
        secondary,
        registry.description_of(&secondary, &PlainLocalizer)
    );
    println!();
    println!("{:<4} {:<8} {:<32} {:<6} {:<24} 使用中", "位置", "标识", "地址", "端口", "名称");

    for server in registry.all_descriptors() {
        let in_use = match &server {
            ServerDescriptor::Custom(custom) => registry.is_active_custom_server(custom),
            ServerDescriptor::Builtin(_) => false,
        };
        println!(
            "{:<4} {:<8} {:<32} {:<6} {:<24} {}",
            registry.position_of(server.id()),
            server.id(),
            server.address(),
            server.port(),
            server.description(&PlainLocalizer),
            if in_use { "是" } else { "" }
        );
    }
}

fn print_cache(cache: &ResolutionCache) {
    let snapshot = cache.snapshot();

    println!();
    println!("端口缓存: {} 个条目", snapshot.ports().len());
    let mut ports: Vec<_> = snapshot.ports().iter().collect();
    ports.sort();
    for (address, port) in ports {
        println!("  {} -> {}", address, port);
    }

    println!("预解析主机名: {} 个", snapshot.hosts().len());
    let mut hosts: Vec<_> = snapshot.hosts().iter().collect();
    hosts.sort();
    for (host, ips) in hosts {
        let ips = ips
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {} -> {}", host, ips);
    }
}
