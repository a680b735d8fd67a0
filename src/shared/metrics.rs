//! Prometheus Metrics Module
//!
//! 放置引擎的核心指标
//!
//! ## 指标类型
//! - **Counter**: 放置次数、腾退次数、移动次数、查询次数、错误次数
//! - **Histogram**: 空位搜索深度
//!
//! ## 使用示例
//! ```rust,ignore
//! use placement_engine::shared::metrics::METRICS;
//!
//! METRICS.placements_total.with_label_values(&["auto"]).inc();
//! METRICS.search_depth.with_label_values(&["found"]).observe(3.0);
//! ```

use crate::domain::error::{ErrorKind, PlacementError};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// 全局Metrics实例
    pub static ref METRICS: Metrics = Metrics::new();
}

pub struct Metrics {
    /// 矩阵放置总数 (mode: auto / explicit / admin)
    pub placements_total: CounterVec,

    /// 抢占失败后的重试次数
    pub occupy_retries_total: CounterVec,

    /// 找到空位时相对保荐人的深度
    pub search_depth: HistogramVec,

    /// 腾退总数
    pub vacates_total: CounterVec,

    /// 管理员移动总数
    pub moves_total: CounterVec,

    /// 查询总数 (kind: subtree / path / top_slot)
    pub queries_total: CounterVec,

    /// 双轨放置总数 (rule: admin / policy / lighter_leg / tie / root)
    pub dual_team_placements_total: CounterVec,

    /// 错误总数 (按类型)
    pub errors_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            placements_total: register_counter_vec!(
                "placement_engine_placements_total",
                "Total number of forced-matrix placements",
                &["mode"]
            )
            .unwrap(),

            occupy_retries_total: register_counter_vec!(
                "placement_engine_occupy_retries_total",
                "Automatic placements retried after losing an occupy race",
                &["plan"]
            )
            .unwrap(),

            search_depth: register_histogram_vec!(
                "placement_engine_search_depth_levels",
                "Depth below the sponsor at which an open slot was found",
                &["outcome"],
                vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0, 24.0]
            )
            .unwrap(),

            vacates_total: register_counter_vec!(
                "placement_engine_vacates_total",
                "Total number of vacated slots",
                &["plan"]
            )
            .unwrap(),

            moves_total: register_counter_vec!(
                "placement_engine_moves_total",
                "Total number of admin position changes",
                &["plan"]
            )
            .unwrap(),

            queries_total: register_counter_vec!(
                "placement_engine_queries_total",
                "Total number of tree queries",
                &["kind"]
            )
            .unwrap(),

            dual_team_placements_total: register_counter_vec!(
                "placement_engine_dual_team_placements_total",
                "Total number of dual-team placements by deciding rule",
                &["rule"]
            )
            .unwrap(),

            errors_total: register_counter_vec!(
                "placement_engine_errors_total",
                "Total number of errors",
                &["error_type"]
            )
            .unwrap(),
        }
    }

    /// 记录一次错误
    pub fn record_error(&self, error: &PlacementError) {
        self.errors_total
            .with_label_values(&[error.kind().as_str()])
            .inc();
    }

    /// Store calls that hit their deadline so far
    pub fn store_timeouts(&self) -> u64 {
        self.errors_total
            .with_label_values(&[ErrorKind::Timeout.as_str()])
            .get() as u64
    }

    /// 导出Prometheus格式的指标
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("metrics encoding failed: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_global() {
        METRICS.placements_total.with_label_values(&["auto"]).inc();

        let output = METRICS.export();
        assert!(output.contains("placement_engine_placements_total"));
    }

    #[test]
    fn test_histogram_global() {
        METRICS.search_depth.with_label_values(&["found"]).observe(3.0);

        let output = METRICS.export();
        assert!(output.contains("placement_engine_search_depth_levels"));
    }

    #[test]
    fn test_record_error_by_kind() {
        let before = METRICS.errors_total.with_label_values(&["access_denied"]).get();
        METRICS.record_error(&PlacementError::AccessDenied("test".into()));
        let after = METRICS.errors_total.with_label_values(&["access_denied"]).get();
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_store_timeouts_counts_timeout_errors() {
        let before = METRICS.store_timeouts();
        METRICS.record_error(&PlacementError::Timeout {
            operation: "occupy",
            timeout_ms: 10,
        });
        assert!(METRICS.store_timeouts() > before);
    }
}
