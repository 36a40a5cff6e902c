use log::{debug, warn};

use crate::catalog::ServerCatalog;

/// 默认服务器的位置 / 标识
pub const DEFAULT_SERVER_POSITION: usize = 0;

/// 主/备用服务器选择
///
/// 每次调用都从配置重新计算，不保留结果。内置服务器的标识等于其位置，
/// 目录在构造时已经保证这一点。
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    catalog: ServerCatalog,
}

impl SelectionPolicy {
    pub fn new(catalog: ServerCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    /// 当前主服务器标识（配置项 primary_server，默认 "0"）
    pub fn primary_id(&self) -> String {
        let configured = self.catalog.store().settings().primary_server;
        self.check_server_id(&configured)
    }

    /// 当前备用服务器标识（配置项 secondary_server，默认 "1"）
    pub fn secondary_id(&self) -> String {
        let configured = self.catalog.store().settings().secondary_server;
        self.check_server_id(&configured)
    }

    /// 校验服务器标识
    ///
    /// 小于内置数量的数字视为内置位置；否则必须等于某个自定义服务器的标识；
    /// 都不满足时返回默认服务器 "0"。
    pub fn check_server_id(&self, id: &str) -> String {
        let trimmed = id.trim();
        let candidate = match trimmed.parse::<usize>() {
            Ok(position) if position < self.catalog.builtin_count() => {
                return position.to_string();
            }
            Ok(number) => number.to_string(),
            Err(_) => trimmed.to_string(),
        };

        if self
            .catalog
            .custom_servers()
            .iter()
            .any(|server| server.id == candidate)
        {
            return candidate;
        }

        warn!("无效的服务器标识 '{}'，使用默认服务器", id);
        DEFAULT_SERVER_POSITION.to_string()
    }

    /// 标识在「内置 + 自定义」序列中的位置，找不到时返回 0
    ///
    /// 与 [`check_server_id`](Self::check_server_id) 不同，这里不规范化数字：
    /// 自定义标识按原样比较，`"010"` 不会匹配标识为 `"10"` 的自定义服务器。
    pub fn position_of(&self, id: &str) -> usize {
        let builtin_count = self.catalog.builtin_count();
        if let Ok(position) = id.trim().parse::<usize>() {
            if position < builtin_count {
                return position;
            }
        }

        match self
            .catalog
            .custom_servers()
            .iter()
            .position(|server| server.id == id)
        {
            Some(index) => builtin_count + index,
            None => {
                debug!("未找到服务器 {} 的位置，使用默认位置", id);
                DEFAULT_SERVER_POSITION
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuiltinServer, CustomServer};
    use crate::config::{MemoryConfigStore, Settings};
    use std::sync::Arc;

    fn policy(settings: Settings, customs: Vec<CustomServer>) -> (SelectionPolicy, Arc<MemoryConfigStore>) {
        let store = Arc::new(MemoryConfigStore::new(settings, customs));
        let catalog = ServerCatalog::new(
            vec![
                BuiltinServer::new("0", "1.1.1.1", 53, "a", "A"),
                BuiltinServer::new("1", "8.8.8.8", 53, "b", "B"),
                BuiltinServer::new("2", "9.9.9.9", 53, "c", "C"),
            ],
            store.clone(),
        )
        .unwrap();
        (SelectionPolicy::new(catalog), store)
    }

    fn settings(primary: &str, secondary: &str) -> Settings {
        Settings {
            primary_server: primary.to_string(),
            secondary_server: secondary.to_string(),
            dont_build_doh_cache: false,
        }
    }

    #[test]
    fn test_defaults() {
        let (policy, _) = policy(Settings::default(), Vec::new());
        assert_eq!(policy.primary_id(), "0");
        assert_eq!(policy.secondary_id(), "1");
    }

    #[test]
    fn test_builtin_ids_accepted() {
        let (policy, _) = policy(settings("2", "1"), Vec::new());
        assert_eq!(policy.primary_id(), "2");
        assert_eq!(policy.secondary_id(), "1");
        for id in 0..3 {
            assert_eq!(policy.check_server_id(&id.to_string()), id.to_string());
        }
    }

    #[test]
    fn test_custom_ids_accepted() {
        let (policy, _) = policy(
            settings("10", "11"),
            vec![
                CustomServer::new("10", "Home", "192.168.1.1", 53),
                CustomServer::new("11", "Office", "10.0.0.1", 53),
            ],
        );
        assert_eq!(policy.primary_id(), "10");
        assert_eq!(policy.secondary_id(), "11");
    }

    #[test]
    fn test_invalid_ids_fall_back_to_default() {
        let (policy, _) = policy(
            settings("42", "garbage"),
            vec![CustomServer::new("10", "Home", "192.168.1.1", 53)],
        );
        assert_eq!(policy.primary_id(), "0");
        assert_eq!(policy.secondary_id(), "0");
        assert_eq!(policy.check_server_id("-1"), "0");
        assert_eq!(policy.check_server_id(""), "0");
        assert_eq!(policy.check_server_id("3"), "0");
    }

    #[test]
    fn test_check_server_id_canonicalises_numbers() {
        let (policy, _) = policy(
            Settings::default(),
            vec![CustomServer::new("10", "Home", "192.168.1.1", 53)],
        );
        assert_eq!(policy.check_server_id("010"), "10");
        assert_eq!(policy.check_server_id(" 2 "), "2");
    }

    #[test]
    fn test_non_numeric_custom_id() {
        let (policy, _) = policy(
            settings("home", "1"),
            vec![CustomServer::new("home", "Home", "192.168.1.1", 53)],
        );
        assert_eq!(policy.primary_id(), "home");
        assert_eq!(policy.position_of("home"), 3);
    }

    #[test]
    fn test_selection_follows_config_changes() {
        let (policy, store) = policy(settings("10", "1"), Vec::new());
        assert_eq!(policy.primary_id(), "0");

        store.set_custom_servers(vec![CustomServer::new("10", "Home", "192.168.1.1", 53)]);
        assert_eq!(policy.primary_id(), "10");

        store.set_custom_servers(Vec::new());
        assert_eq!(policy.primary_id(), "0");
    }

    #[test]
    fn test_position_of() {
        let (policy, _) = policy(
            Settings::default(),
            vec![
                CustomServer::new("10", "Home", "192.168.1.1", 53),
                CustomServer::new("1", "Shadow", "10.0.0.1", 53),
                CustomServer::new("20", "Office", "10.0.0.2", 53),
            ],
        );

        assert_eq!(policy.position_of("0"), 0);
        assert_eq!(policy.position_of("2"), 2);
        assert_eq!(policy.position_of("10"), 3);
        assert_eq!(policy.position_of("20"), 5);
        // 小于内置数量的标识总是按内置位置处理
        assert_eq!(policy.position_of("1"), 1);
        assert_eq!(policy.position_of("99"), 0);
        assert_eq!(policy.position_of("not-a-number"), 0);
        // 自定义标识按原样比较
        assert_eq!(policy.position_of("010"), 0);
        assert_eq!(policy.check_server_id("010"), "10");
    }
}
