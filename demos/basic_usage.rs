// demos/basic_usage.rs
// 基本使用示例：列出服务器并按标识查询

use anyhow::Result;
use dns_registry::{
    CustomServer, DnsServerRegistry, MemoryConfigStore, PlainLocalizer, QueryMethod,
    ServerCatalog, Settings, SystemResolver,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings {
        primary_server: "100".to_string(),
        ..Settings::default()
    };
    let store = Arc::new(
        MemoryConfigStore::new(
            settings,
            vec![CustomServer::new("100", "Home router", "192.168.1.1", 53)],
        )
        .with_query_method(QueryMethod::Udp),
    );
    let catalog = ServerCatalog::with_default_builtins(store.clone());
    let registry = DnsServerRegistry::new(catalog, store.clone(), Arc::new(true));

    registry.rebuild_cache(&SystemResolver).await;

    let names = registry.all_descriptions(&PlainLocalizer);
    for (id, name) in registry.all_ids().iter().zip(names) {
        println!("[{}] {} -> {}", registry.position_of(id), name, registry.address_of(id));
    }

    println!("主服务器: {}", registry.primary_id());
    println!("备用服务器: {}", registry.secondary_id());
    println!("未知标识 42 回退到: {}", registry.address_of("42"));

    Ok(())
}
