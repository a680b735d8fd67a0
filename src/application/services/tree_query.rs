/// Tree Query Service - Annotated Forced-Matrix Reads
///
/// Reporting-side reads of the forced matrix. Callers may only look at
/// their own subtree: the requested node must be the caller's slot or one of
/// its descendants, otherwise the answer is `AccessDenied`.
///
/// Results reflect the store at query time; they are not synchronized with
/// placements running concurrently.

use crate::domain::distributor::{DistributorProfile, Role};
use crate::domain::error::{PlacementError, Result};
use crate::domain::ports::{DistributorDirectory, SlotStore};
use crate::domain::position::{
    descendant_range, is_self_or_descendant, path_between, Coordinate, MAX_LEVEL,
};
use crate::domain::slot::Slot;
use crate::domain::DistributorId;
use crate::shared::config::EngineConfig;
use crate::shared::deadline::bounded;
use crate::shared::metrics::METRICS;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Who sits in a slot, as seen by the querying sponsor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupantInfo {
    pub id: DistributorId,
    pub login: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    /// Recruited by the querying sponsor, regardless of where it was placed
    pub personally_sponsored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtreeNode {
    pub coordinate: Coordinate,
    pub occupant_id: Option<DistributorId>,
    /// `None` for an empty row or an occupant missing from the directory
    pub occupant: Option<OccupantInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PathNode {
    pub coordinate: Coordinate,
    pub occupant_id: Option<DistributorId>,
}

pub struct TreeQueryService<S: SlotStore, D: DistributorDirectory> {
    slots: Arc<S>,
    directory: Arc<D>,
    config: EngineConfig,
    timeout: Duration,
    reference_date: Option<NaiveDate>,
}

impl<S: SlotStore, D: DistributorDirectory> TreeQueryService<S, D> {
    pub fn new(slots: Arc<S>, directory: Arc<D>, config: EngineConfig) -> Self {
        let timeout = config.store_timeout();
        Self {
            slots,
            directory,
            config,
            timeout,
            reference_date: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Evaluate active/inactive against a fixed date instead of today
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    async fn placed_slot(&self, distributor_id: DistributorId) -> Result<Coordinate> {
        bounded(self.timeout, "slot_of", self.slots.slot_of(distributor_id))
            .await?
            .ok_or_else(|| PlacementError::not_placed(distributor_id))
    }

    /// Resolves the caller's slot and checks `target` lies in its subtree
    async fn authorize(&self, sponsor_id: DistributorId, target: Coordinate) -> Result<Coordinate> {
        let sponsor_slot = self.placed_slot(sponsor_id).await?;
        if !is_self_or_descendant(sponsor_slot, target) {
            warn!(sponsor_id, sponsor_slot = %sponsor_slot, %target, "query outside own subtree");
            return Err(PlacementError::outside_subtree(sponsor_id, target));
        }
        Ok(sponsor_slot)
    }

    fn annotate(&self, profile: DistributorProfile, sponsor_id: DistributorId, today: NaiveDate) -> OccupantInfo {
        OccupantInfo {
            active: profile.is_active_on(today),
            personally_sponsored: profile.is_recruited_by(sponsor_id),
            id: profile.id,
            login: profile.login,
            display_name: profile.display_name,
            role: profile.role,
        }
    }

    /// Stored rows of `target` and its descendants, `depth` levels deep
    /// (`None` takes `EngineConfig::default_subtree_depth`)
    ///
    /// # Errors
    /// - `NotFound`: the sponsor was never placed
    /// - `AccessDenied`: `target` is outside the sponsor's subtree
    pub async fn subtree(
        &self,
        sponsor_id: DistributorId,
        target: Coordinate,
        depth: Option<u32>,
    ) -> Result<Vec<SubtreeNode>> {
        METRICS.queries_total.with_label_values(&["subtree"]).inc();
        self.subtree_inner(sponsor_id, target, depth)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn subtree_inner(
        &self,
        sponsor_id: DistributorId,
        target: Coordinate,
        depth: Option<u32>,
    ) -> Result<Vec<SubtreeNode>> {
        self.authorize(sponsor_id, target).await?;

        let depth = depth.unwrap_or(self.config.default_subtree_depth);
        let last_level = target.level().saturating_add(depth).min(MAX_LEVEL);
        let today = self.today();

        let mut nodes = Vec::new();
        for level in target.level()..=last_level {
            let Some(range) = descendant_range(target, level) else {
                break;
            };
            let rows = bounded(
                self.timeout,
                "rows_in_range",
                self.slots.rows_in_range(level, *range.start(), *range.end()),
            )
            .await?;
            for Slot {
                coordinate,
                occupant,
            } in rows
            {
                let info = match occupant {
                    Some(id) => bounded(self.timeout, "by_id", self.directory.by_id(id))
                        .await?
                        .map(|profile| self.annotate(profile, sponsor_id, today)),
                    None => None,
                };
                nodes.push(SubtreeNode {
                    coordinate,
                    occupant_id: occupant,
                    occupant: info,
                });
            }
        }

        debug!(sponsor_id, %target, depth, rows = nodes.len(), "subtree query");
        Ok(nodes)
    }

    /// `subtree` rooted at wherever `distributor_id` sits
    pub async fn subtree_by_distributor_id(
        &self,
        sponsor_id: DistributorId,
        distributor_id: DistributorId,
        depth: Option<u32>,
    ) -> Result<Vec<SubtreeNode>> {
        let slot = self
            .placed_slot(distributor_id)
            .await
            .inspect_err(|e| METRICS.record_error(e))?;
        self.subtree(sponsor_id, slot, depth).await
    }

    /// `subtree` rooted at the distributor with this login
    pub async fn subtree_by_login(
        &self,
        sponsor_id: DistributorId,
        login: &str,
        depth: Option<u32>,
    ) -> Result<Vec<SubtreeNode>> {
        let profile = bounded(self.timeout, "by_login", self.directory.by_login(login))
            .await?
            .ok_or_else(|| PlacementError::NotFound(format!("no distributor with login '{}'", login)))
            .inspect_err(|e| METRICS.record_error(e))?;
        self.subtree_by_distributor_id(sponsor_id, profile.id, depth)
            .await
    }

    /// The occupied slot with the smallest `(level, position)`
    pub async fn top_slot(&self) -> Result<Slot> {
        METRICS.queries_total.with_label_values(&["top_slot"]).inc();
        bounded(self.timeout, "top_slot", self.slots.top_slot())
            .await?
            .ok_or_else(|| PlacementError::NotFound("the matrix is empty".to_string()))
    }

    /// Slots from the sponsor down to `target`, both included
    ///
    /// # Errors
    /// `AccessDenied` if `target` is outside the sponsor's subtree.
    pub async fn path_from_sponsor(
        &self,
        sponsor_id: DistributorId,
        target: Coordinate,
    ) -> Result<Vec<PathNode>> {
        METRICS.queries_total.with_label_values(&["path"]).inc();
        self.path_inner(sponsor_id, target)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn path_inner(&self, sponsor_id: DistributorId, target: Coordinate) -> Result<Vec<PathNode>> {
        let sponsor_slot = self.authorize(sponsor_id, target).await?;
        let mut nodes = Vec::new();
        for coordinate in path_between(sponsor_slot, target)? {
            let occupant_id =
                bounded(self.timeout, "occupant", self.slots.occupant(coordinate)).await?;
            nodes.push(PathNode {
                coordinate,
                occupant_id,
            });
        }
        Ok(nodes)
    }
}
