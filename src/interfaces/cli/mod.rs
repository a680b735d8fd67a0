/// CLI Interface Module
///
/// Command-line entry point for the placement engine. Builds the in-memory
/// stores, seeds a root distributor in both plans and can replay a random
/// registration workload against them.
///
/// ## Responsibilities
/// - Parse command-line arguments and load `EngineConfig`
/// - Initialize logging
/// - Wire the services to the stores
/// - Optionally serve `/metrics` and `/health` until interrupted

use crate::application::services::{DualTeamPlacer, DualTeamRequest, PlacementFinder};
use crate::domain::distributor::{DistributorProfile, Role};
use crate::domain::dual_team::PlacementPolicy;
use crate::domain::error::PlacementError;
use crate::domain::position::Coordinate;
use crate::domain::DistributorId;
use crate::infrastructure::memory::{
    InMemoryChangeAudit, InMemoryDirectory, InMemoryDualTeamStore, InMemorySlotStore,
};
use crate::infrastructure::observability::{ObservabilityServer, StoreStats};
use crate::shared::config::{ConfigError, EngineConfig};
use chrono::{Days, Utc};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Distributor seeded at the top of both trees
const ROOT_DISTRIBUTOR: DistributorId = 1;

/// 放置引擎命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "placement-engine")]
#[command(version = "0.1.0")]
#[command(about = "MLM forced-matrix and dual-team placement engine", long_about = None)]
pub struct CliConfig {
    /// JSON config file (missing fields take their defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override `max_search_depth`
    #[arg(short = 'd', long)]
    pub max_depth: Option<u32>,

    /// Override `store_timeout_ms`
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// 日志级别
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// Observability port (0 disables the server)
    #[arg(short = 'm', long, default_value_t = 0)]
    pub metrics_port: u16,

    /// Number of random registrations to simulate
    #[arg(short = 'n', long, default_value_t = 0)]
    pub simulate: u64,

    /// RNG seed for the simulation
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// 仅显示配置不运行（用于调试）
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CliConfig {
    /// Config file (or defaults) with the command-line overrides applied
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(depth) = self.max_depth {
            config.max_search_depth = depth;
        }
        if let Some(timeout) = self.timeout_ms {
            config.store_timeout_ms = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("observability server failed: {0}")]
    Server(#[from] std::io::Error),
}

/// Runs the CLI application
pub async fn run() -> Result<(), CliError> {
    let cli = CliConfig::parse();
    init_logging(&cli.log_level);

    let config = cli.engine_config()?;
    tracing::info!(?config, "placement engine starting");

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&config).unwrap_or_default());
        return Ok(());
    }

    let engine = Engine::new(config);
    engine.seed_root().await?;

    if cli.simulate > 0 {
        let started = Instant::now();
        let mut rng = StdRng::seed_from_u64(cli.seed);
        engine.simulate(&mut rng, cli.simulate).await?;
        tracing::info!(
            registrations = cli.simulate,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation finished"
        );
    }

    let stats = engine.stats();
    let details = stats.details();
    tracing::info!(
        placed = details.placed_distributors,
        matrix_rows = details.matrix_rows,
        audit_entries = details.audit_entries,
        dual_team_nodes = details.dual_team_nodes,
        "store summary"
    );
    let root_legs = engine.dual_team.leg_counts(ROOT_DISTRIBUTOR).await?;
    tracing::info!(
        left = root_legs.left_count,
        right = root_legs.right_count,
        "root dual-team legs"
    );

    if cli.metrics_port != 0 {
        ObservabilityServer::new(cli.metrics_port, stats).run().await?;
    }
    Ok(())
}

/// Services wired to one set of in-memory stores
struct Engine {
    slots: Arc<InMemorySlotStore>,
    audit: Arc<InMemoryChangeAudit>,
    directory: Arc<InMemoryDirectory>,
    dual_team_store: Arc<InMemoryDualTeamStore>,
    finder: PlacementFinder<InMemorySlotStore, InMemoryChangeAudit>,
    dual_team: DualTeamPlacer<InMemoryDualTeamStore>,
}

impl Engine {
    fn new(config: EngineConfig) -> Self {
        let slots = Arc::new(InMemorySlotStore::new());
        let audit = Arc::new(InMemoryChangeAudit::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let dual_team_store = Arc::new(InMemoryDualTeamStore::new());
        Self {
            finder: PlacementFinder::new(slots.clone(), audit.clone(), config.clone()),
            dual_team: DualTeamPlacer::new(dual_team_store.clone(), config),
            slots,
            audit,
            directory,
            dual_team_store,
        }
    }

    fn stats(&self) -> StoreStats {
        StoreStats::new(
            self.slots.clone(),
            self.audit.clone(),
            self.dual_team_store.clone(),
        )
    }

    fn register(
        &self,
        id: DistributorId,
        sponsor: Option<DistributorId>,
        renewal_days: u64,
    ) -> Result<(), PlacementError> {
        self.directory.insert(DistributorProfile {
            id,
            login: format!("dist{}", id),
            display_name: format!("Distributor {}", id),
            role: if id == ROOT_DISTRIBUTOR { Role::Admin } else { Role::Distributor },
            renewal_date: Utc::now().date_naive().checked_add_days(Days::new(renewal_days)),
            personal_sponsor_id: sponsor,
        })
    }

    async fn seed_root(&self) -> Result<(), PlacementError> {
        self.register(ROOT_DISTRIBUTOR, None, 365)?;
        self.finder.place_at(ROOT_DISTRIBUTOR, Coordinate::ROOT).await?;
        self.dual_team
            .place(DualTeamRequest::root(ROOT_DISTRIBUTOR))
            .await?;
        Ok(())
    }

    /// Registers `count` distributors, each recruited by a random earlier one
    async fn simulate(&self, rng: &mut StdRng, count: u64) -> Result<(), PlacementError> {
        const POLICIES: [PlacementPolicy; 4] = [
            PlacementPolicy::OutsideLeft,
            PlacementPolicy::InsideLeft,
            PlacementPolicy::OutsideRight,
            PlacementPolicy::InsideRight,
        ];

        for id in ROOT_DISTRIBUTOR + 1..=ROOT_DISTRIBUTOR + count {
            let sponsor = rng.gen_range(ROOT_DISTRIBUTOR..id);
            self.register(id, Some(sponsor), rng.gen_range(0..730))?;

            self.finder.place(id, sponsor, None).await?;
            self.dual_team
                .place(DualTeamRequest::recruit(id, sponsor))
                .await?;

            // Roughly one recruit in ten picks a fixed placement policy
            if rng.gen_bool(0.1) {
                let policy = POLICIES[rng.gen_range(0..POLICIES.len())];
                self.dual_team.set_placement_policy(id, Some(policy)).await?;
            }
        }
        Ok(())
    }
}

/// 初始化日志系统
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
