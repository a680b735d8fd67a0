//! Health Check Endpoint
//!
//! 提供系统健康状态检查，用于负载均衡器和监控系统
//!
//! ## 健康检查端点
//! - `/health` - 状态 + 存储统计
//! - `/health/ready` - 就绪检查（系统是否可以接受放置请求）
//! - `/health/live` - 存活检查（系统是否仍在运行）
//!
//! ## 状态来源
//! Every `/health` and `/health/ready` request calls `refresh`, which reads
//! the store-timeout counter. Any timeout since the previous refresh makes
//! the engine `Unhealthy` until a refresh sees no new ones.
//!
//! ## 响应格式
//! ```json
//! {
//!   "status": "healthy",
//!   "uptime_seconds": 3600,
//!   "version": "0.1.0",
//!   "timestamp": 1234567890,
//!   "details": { "placed_distributors": 120, "matrix_rows": 124, "audit_entries": 4, "dual_team_nodes": 120 }
//! }
//! ```

use crate::infrastructure::memory::{
    InMemoryChangeAudit, InMemoryDualTeamStore, InMemorySlotStore,
};
use crate::shared::metrics::METRICS;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    Healthy,
    /// 不健康（上次检查以来存储调用超时）
    Unhealthy,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// 运行时间（秒）
    pub uptime_seconds: u64,
    pub version: String,
    /// Unix 时间戳（秒）
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// 存储统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDetails {
    /// 当前占用矩阵位置的分销商数
    pub placed_distributors: usize,
    /// 矩阵表行数（含已腾退的空行）
    pub matrix_rows: usize,
    /// 位置变更审计条数
    pub audit_entries: usize,
    /// 双轨树节点数
    pub dual_team_nodes: usize,
}

/// Reads `HealthDetails` off the live in-memory stores
#[derive(Clone)]
pub struct StoreStats {
    slots: Arc<InMemorySlotStore>,
    audit: Arc<InMemoryChangeAudit>,
    dual_team: Arc<InMemoryDualTeamStore>,
}

impl StoreStats {
    pub fn new(
        slots: Arc<InMemorySlotStore>,
        audit: Arc<InMemoryChangeAudit>,
        dual_team: Arc<InMemoryDualTeamStore>,
    ) -> Self {
        Self {
            slots,
            audit,
            dual_team,
        }
    }

    pub fn details(&self) -> HealthDetails {
        HealthDetails {
            placed_distributors: self.slots.occupied_count(),
            matrix_rows: self.slots.row_count(),
            audit_entries: self.audit.len(),
            dual_team_nodes: self.dual_team.len(),
        }
    }
}

/// Running total of store calls that hit their deadline
pub type TimeoutSource = Box<dyn Fn() -> u64 + Send + Sync>;

struct Observed {
    status: HealthStatus,
    /// Timeout total at the last refresh
    seen_timeouts: u64,
}

/// 健康检查器
pub struct HealthChecker {
    /// 启动时间
    start_time: Instant,
    observed: RwLock<Observed>,
    timeouts: TimeoutSource,
    version: String,
}

impl HealthChecker {
    /// Checker fed by the global `errors_total{error_type="timeout"}` counter
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_timeout_source(version, Box::new(|| METRICS.store_timeouts()))
    }

    /// Timeouts seen before construction do not count against the engine
    pub fn with_timeout_source(version: impl Into<String>, timeouts: TimeoutSource) -> Self {
        let seen_timeouts = timeouts();
        Self {
            start_time: Instant::now(),
            observed: RwLock::new(Observed {
                status: HealthStatus::Healthy,
                seen_timeouts,
            }),
            timeouts,
            version: version.into(),
        }
    }

    /// 获取运行时间（秒）
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Re-reads the timeout counter and updates the status
    pub fn refresh(&self) -> HealthStatus {
        let total = (self.timeouts)();
        let mut observed = self.observed.write();
        observed.status = if total > observed.seen_timeouts {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
        observed.seen_timeouts = total;
        observed.status
    }

    pub fn get_status(&self) -> HealthStatus {
        self.observed.read().status
    }

    /// 生成健康检查响应
    pub fn check_health(&self, details: Option<HealthDetails>) -> HealthResponse {
        HealthResponse {
            status: self.get_status(),
            uptime_seconds: self.uptime_seconds(),
            version: self.version.clone(),
            timestamp: Utc::now().timestamp(),
            details,
        }
    }

    /// 存活检查（liveness probe）
    pub fn check_liveness(&self) -> bool {
        // 只要能返回就说明还活着
        true
    }

    /// 就绪检查（readiness probe）：只有 Healthy 接受放置请求
    pub fn check_readiness(&self) -> bool {
        matches!(self.get_status(), HealthStatus::Healthy)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}
