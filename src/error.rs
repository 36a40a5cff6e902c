use std::time::Duration;
use thiserror::Error;

/// 预解析 DoH 主机名时可能出现的错误
///
/// 这些错误只在缓存重建内部出现，记录日志后丢弃，不会传给转发路径。
#[derive(Debug, Error)]
pub enum ResolveError {
    /// 服务器地址无法转换成主机名
    #[error("无效的服务器地址 '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// 系统解析失败（NXDOMAIN、网络不可达等）
    #[error("解析 {host} 失败: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// 解析成功但没有返回任何地址
    #[error("解析 {0} 返回空列表")]
    Empty(String),

    /// 超过重建允许的解析时间
    #[error("解析 {host} 超时 ({timeout:?})")]
    Timeout { host: String, timeout: Duration },
}

impl ResolveError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResolveError::Timeout { .. })
    }
}
