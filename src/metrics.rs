use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 解析缓存监控指标
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    inner: Arc<CacheMetricsInner>,
}

#[derive(Debug)]
struct CacheMetricsInner {
    // 生命周期
    rebuilds: AtomicU64,
    clears: AtomicU64,

    // 主机名预解析
    resolved_hosts: AtomicU64,
    resolution_failures: AtomicU64,
    resolution_timeouts: AtomicU64,

    // 转发路径端口查询
    port_hits: AtomicU64,
    port_misses: AtomicU64,

    start_time: Instant,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheMetricsInner {
                rebuilds: AtomicU64::new(0),
                clears: AtomicU64::new(0),
                resolved_hosts: AtomicU64::new(0),
                resolution_failures: AtomicU64::new(0),
                resolution_timeouts: AtomicU64::new(0),
                port_hits: AtomicU64::new(0),
                port_misses: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn inc_rebuilds(&self) {
        self.inner.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_clears(&self) {
        self.inner.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolved_hosts(&self) {
        self.inner.resolved_hosts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolution_failures(&self) {
        self.inner.resolution_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolution_timeouts(&self) {
        self.inner.resolution_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_port_hits(&self) {
        self.inner.port_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_port_misses(&self) {
        self.inner.port_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            rebuilds: self.inner.rebuilds.load(Ordering::Relaxed),
            clears: self.inner.clears.load(Ordering::Relaxed),
            resolved_hosts: self.inner.resolved_hosts.load(Ordering::Relaxed),
            resolution_failures: self.inner.resolution_failures.load(Ordering::Relaxed),
            resolution_timeouts: self.inner.resolution_timeouts.load(Ordering::Relaxed),
            port_hits: self.inner.port_hits.load(Ordering::Relaxed),
            port_misses: self.inner.port_misses.load(Ordering::Relaxed),
            uptime: self.inner.start_time.elapsed(),
        }
    }

    /// 端口缓存命中率（0.0 - 1.0）
    pub fn port_hit_rate(&self) -> f64 {
        let hits = self.inner.port_hits.load(Ordering::Relaxed);
        let total = hits + self.inner.port_misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// 打印监控指标
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        log::info!("=== 解析缓存指标 ===");
        log::info!("运行时间: {:?}", snapshot.uptime);
        log::info!("重建次数: {}", snapshot.rebuilds);
        log::info!("清空次数: {}", snapshot.clears);
        log::info!("预解析主机名: {}", snapshot.resolved_hosts);
        log::info!(
            "预解析失败: {} (其中超时 {})",
            snapshot.resolution_failures,
            snapshot.resolution_timeouts
        );
        log::info!("端口命中: {}", snapshot.port_hits);
        log::info!("端口未命中: {}", snapshot.port_misses);

        if snapshot.port_hits + snapshot.port_misses > 0 {
            log::info!("端口命中率: {:.2}%", self.port_hit_rate() * 100.0);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone)]
pub struct CacheMetricsSnapshot {
    pub rebuilds: u64,
    pub clears: u64,
    pub resolved_hosts: u64,
    pub resolution_failures: u64,
    pub resolution_timeouts: u64,
    pub port_hits: u64,
    pub port_misses: u64,
    pub uptime: Duration,
}
