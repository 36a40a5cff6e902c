use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::catalog::CustomServer;
use crate::selection::SelectionPolicy;

/// VPN 是否已激活，由隧道引擎提供
pub trait VpnActivation: Send + Sync {
    fn is_active(&self) -> bool;
}

impl VpnActivation for AtomicBool {
    fn is_active(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl VpnActivation for bool {
    fn is_active(&self) -> bool {
        *self
    }
}

/// 判断自定义服务器当前是否正在使用
#[derive(Clone)]
pub struct ActivationTracker {
    policy: SelectionPolicy,
    vpn: Arc<dyn VpnActivation>,
}

impl ActivationTracker {
    pub fn new(policy: SelectionPolicy, vpn: Arc<dyn VpnActivation>) -> Self {
        Self { policy, vpn }
    }

    /// VPN 已激活且该服务器是当前主服务器或备用服务器
    pub fn is_active_custom_server(&self, server: &CustomServer) -> bool {
        self.vpn.is_active()
            && (server.id == self.policy.primary_id() || server.id == self.policy.secondary_id())
    }
}
