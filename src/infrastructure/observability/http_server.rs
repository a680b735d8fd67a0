//! HTTP Observability Server
//!
//! 提供Prometheus metrics和健康检查端点
//!
//! ## 端点
//! - `GET /metrics` - Prometheus格式的指标
//! - `GET /health` - 健康检查 + 存储统计
//! - `GET /health/ready` - 就绪检查
//! - `GET /health/live` - 存活检查
//!
//! ## 使用示例
//! ```rust,ignore
//! let server = ObservabilityServer::new(9090, stats);
//! server.run().await?;
//! ```

use super::health::{HealthChecker, HealthStatus, StoreStats};
use crate::shared::metrics::METRICS;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    checker: Arc<HealthChecker>,
    stats: StoreStats,
}

/// 可观测性服务器
pub struct ObservabilityServer {
    addr: SocketAddr,
    state: AppState,
}

impl ObservabilityServer {
    pub fn new(port: u16, stats: StoreStats) -> Self {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self {
            addr,
            state: AppState {
                checker: Arc::new(HealthChecker::new(env!("CARGO_PKG_VERSION"))),
                stats,
            },
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/health/live", get(liveness_handler))
            .with_state(self.state.clone())
    }

    /// 启动HTTP服务器
    pub async fn run(self) -> std::io::Result<()> {
        let app = self.router();

        info!("observability server listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await
    }
}

/// Prometheus metrics端点
async fn metrics_handler() -> Response {
    (StatusCode::OK, METRICS.export()).into_response()
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Response {
    state.checker.refresh();
    let response = state.checker.check_health(Some(state.stats.details()));

    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// 就绪检查端点（用于Kubernetes readiness probe）
async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    state.checker.refresh();
    if state.checker.check_readiness() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// 存活检查端点（用于Kubernetes liveness probe）
async fn liveness_handler(State(state): State<AppState>) -> StatusCode {
    if state.checker.check_liveness() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{
        InMemoryChangeAudit, InMemoryDualTeamStore, InMemorySlotStore,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    fn state_with(checker: HealthChecker) -> AppState {
        AppState {
            checker: Arc::new(checker),
            stats: StoreStats::new(
                Arc::new(InMemorySlotStore::new()),
                Arc::new(InMemoryChangeAudit::new()),
                Arc::new(InMemoryDualTeamStore::new()),
            ),
        }
    }

    fn state() -> AppState {
        state_with(HealthChecker::new("1.0.0"))
    }

    #[test]
    fn test_observability_server_creation() {
        let server = ObservabilityServer::new(9090, state().stats);
        assert_eq!(server.addr.port(), 9090);
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_handler_follows_store_timeouts() {
        let timeouts = Arc::new(AtomicU64::new(0));
        let source = timeouts.clone();
        let state = state_with(HealthChecker::with_timeout_source(
            "1.0.0",
            Box::new(move || source.load(Ordering::SeqCst)),
        ));
        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        timeouts.fetch_add(1, Ordering::SeqCst);
        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(liveness_handler(State(state.clone())).await, StatusCode::OK);

        timeouts.fetch_add(1, Ordering::SeqCst);
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        // Recovers once a check sees no new timeouts
        assert_eq!(readiness_handler(State(state)).await, StatusCode::OK);
    }
}
