/// Dual Team Placer - Binary Plan Spillover
///
/// Places new recruits into the Left/Right binary tree. Rules, first match
/// wins:
///
/// 1. **Admin**: a requested parent + side that is still free
/// 2. **Policy**: the personal sponsor's placement-policy code. Outside
///    codes descend the sponsor's outer edge of that leg; inside codes enter
///    the leg and descend its inner edge. Either way the recruit goes under
///    the deepest node lacking the child on that edge.
/// 3. **Lighter leg**: compare the sponsor's materialized left/right counts
///    and drop into the lighter leg at its frontier pointer (O(1), no walk)
/// 4. **Tie**: equal counts go to the sponsor's own recorded side
///
/// A recruit with neither sponsor nor admin parent starts a new tree.
///
/// ## Materialized leg data
/// Every node stores its left/right subtree sizes and the bottom of each
/// leg's outer edge. Attaching or detaching a subtree walks the ancestor
/// chain once and patches both.
///
/// ## Placement sequence
/// Ancestors always carry a smaller `placement_seq` than their descendants.
/// New leaves draw a fresh value; an admin move under a younger parent
/// re-sequences the moved subtree breadth-first.
///
/// Multi-row updates are serialized by an internal async mutex.

use crate::domain::dual_team::{DualTeamLink, LegStats, PlacementPolicy, Side};
use crate::domain::error::{PlacementError, Result};
use crate::domain::ports::DualTeamStore;
use crate::domain::DistributorId;
use crate::shared::config::EngineConfig;
use crate::shared::deadline::bounded;
use crate::shared::metrics::METRICS;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Registration request for the binary tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DualTeamRequest {
    pub distributor_id: DistributorId,
    pub personal_sponsor_id: Option<DistributorId>,
    /// Admin override: parent to place under
    pub placement_parent_id: Option<DistributorId>,
    /// Admin override: side of `placement_parent_id`
    pub side: Option<Side>,
}

impl DualTeamRequest {
    pub fn recruit(distributor_id: DistributorId, personal_sponsor_id: DistributorId) -> Self {
        Self {
            distributor_id,
            personal_sponsor_id: Some(personal_sponsor_id),
            ..Default::default()
        }
    }

    pub fn root(distributor_id: DistributorId) -> Self {
        Self {
            distributor_id,
            ..Default::default()
        }
    }

    pub fn under(mut self, parent: DistributorId, side: Side) -> Self {
        self.placement_parent_id = Some(parent);
        self.side = Some(side);
        self
    }
}

/// Which rule decided a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementRule {
    Admin,
    Policy,
    LighterLeg,
    Tie,
    Root,
}

impl PlacementRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementRule::Admin => "admin",
            PlacementRule::Policy => "policy",
            PlacementRule::LighterLeg => "lighter_leg",
            PlacementRule::Tie => "tie",
            PlacementRule::Root => "root",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DualTeamPlacement {
    pub link: DualTeamLink,
    pub rule: PlacementRule,
}

pub struct DualTeamPlacer<T: DualTeamStore> {
    store: Arc<T>,
    config: EngineConfig,
    timeout: Duration,
    write_lock: Mutex<()>,
}

impl<T: DualTeamStore> DualTeamPlacer<T> {
    pub fn new(store: Arc<T>, config: EngineConfig) -> Self {
        let timeout = config.store_timeout();
        Self {
            store,
            config,
            timeout,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ---- store access -------------------------------------------------

    pub async fn link(&self, distributor_id: DistributorId) -> Result<Option<DualTeamLink>> {
        bounded(self.timeout, "link", self.store.link(distributor_id)).await
    }

    async fn require_link(&self, distributor_id: DistributorId) -> Result<DualTeamLink> {
        self.link(distributor_id).await?.ok_or_else(|| {
            PlacementError::NotFound(format!(
                "distributor {} is not placed in the dual team",
                distributor_id
            ))
        })
    }

    async fn child(&self, parent: DistributorId, side: Side) -> Result<Option<DistributorId>> {
        bounded(self.timeout, "child", self.store.child(parent, side)).await
    }

    async fn stats(&self, distributor_id: DistributorId) -> Result<LegStats> {
        bounded(self.timeout, "leg_stats", self.store.leg_stats(distributor_id)).await
    }

    async fn save_stats(&self, distributor_id: DistributorId, stats: LegStats) -> Result<()> {
        bounded(
            self.timeout,
            "save_leg_stats",
            self.store.save_leg_stats(distributor_id, stats),
        )
        .await
    }

    async fn next_seq(&self) -> Result<u64> {
        bounded(self.timeout, "next_placement_seq", self.store.next_placement_seq()).await
    }

    async fn update(&self, link: DualTeamLink) -> Result<()> {
        bounded(self.timeout, "update_link", self.store.update_link(link)).await
    }

    // ---- placement ----------------------------------------------------

    /// Places a new distributor in the binary tree
    ///
    /// # Errors
    /// - `InvalidInput`: already placed, or an admin side of `Unassigned`
    /// - `NotFound`: personal sponsor not in the tree
    /// - `LegOccupied`: lost every retry against concurrent writers
    pub async fn place(&self, request: DualTeamRequest) -> Result<DualTeamPlacement> {
        let _guard = self.write_lock.lock().await;
        self.place_locked(&request)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn place_locked(&self, request: &DualTeamRequest) -> Result<DualTeamPlacement> {
        let id = request.distributor_id;
        if self.link(id).await?.is_some() {
            return Err(PlacementError::InvalidInput(format!(
                "distributor {} is already placed in the dual team",
                id
            )));
        }
        if request.side == Some(Side::Unassigned) {
            return Err(PlacementError::InvalidInput(
                "an admin placement needs a left or right side".to_string(),
            ));
        }

        let mut retries = 0;
        loop {
            let decision = self.decide(request).await?;
            let (parent, side, rule) = match decision {
                Some(target) => target,
                None => return self.insert_root(request).await,
            };

            let link = DualTeamLink {
                distributor_id: id,
                placement_parent_id: Some(parent),
                side,
                personal_sponsor_id: request.personal_sponsor_id,
                placement_policy: None,
                placement_seq: self.next_seq().await?,
            };
            match bounded(self.timeout, "insert_link", self.store.insert_link(link.clone())).await {
                Ok(()) => {
                    self.attach(parent, side, 1, (id, id)).await?;
                    METRICS
                        .dual_team_placements_total
                        .with_label_values(&[rule.as_str()])
                        .inc();
                    info!(
                        distributor_id = id,
                        parent,
                        %side,
                        rule = rule.as_str(),
                        seq = link.placement_seq,
                        "dual-team placement"
                    );
                    return Ok(DualTeamPlacement { link, rule });
                }
                Err(PlacementError::LegOccupied { parent, side, occupant })
                    if rule != PlacementRule::Admin && retries < self.config.max_occupy_retries =>
                {
                    retries += 1;
                    METRICS
                        .occupy_retries_total
                        .with_label_values(&["dual_team"])
                        .inc();
                    debug!(parent, %side, occupant, retries, "leg taken concurrently, deciding again");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn insert_root(&self, request: &DualTeamRequest) -> Result<DualTeamPlacement> {
        let link = DualTeamLink {
            distributor_id: request.distributor_id,
            placement_parent_id: None,
            side: Side::Unassigned,
            personal_sponsor_id: None,
            placement_policy: None,
            placement_seq: self.next_seq().await?,
        };
        bounded(self.timeout, "insert_link", self.store.insert_link(link.clone())).await?;
        METRICS
            .dual_team_placements_total
            .with_label_values(&[PlacementRule::Root.as_str()])
            .inc();
        info!(distributor_id = link.distributor_id, "new dual-team root");
        Ok(DualTeamPlacement {
            link,
            rule: PlacementRule::Root,
        })
    }

    /// Parent, side and deciding rule; `None` means "start a new tree"
    async fn decide(&self, request: &DualTeamRequest) -> Result<Option<(DistributorId, Side, PlacementRule)>> {
        let mut taken = None;
        match (request.placement_parent_id, request.side) {
            (Some(parent), Some(side)) => {
                self.require_link(parent).await?;
                match self.child(parent, side).await? {
                    None => return Ok(Some((parent, side, PlacementRule::Admin))),
                    Some(occupant) => {
                        debug!(parent, %side, occupant, "requested leg taken, using sponsor rules");
                        taken = Some(PlacementError::LegOccupied {
                            parent,
                            side,
                            occupant,
                        });
                    }
                }
            }
            (None, None) => {}
            _ => {
                return Err(PlacementError::InvalidInput(
                    "an admin placement needs both a parent and a side".to_string(),
                ))
            }
        }

        let Some(sponsor_id) = request.personal_sponsor_id else {
            // Without a sponsor there is nothing to fall back on
            return match taken {
                Some(err) => Err(err),
                None => Ok(None),
            };
        };
        let sponsor = self.require_link(sponsor_id).await?;

        if let Some(policy) = sponsor.placement_policy {
            let (parent, side) = self.policy_target(sponsor_id, policy).await?;
            return Ok(Some((parent, side, PlacementRule::Policy)));
        }

        let stats = self.stats(sponsor_id).await?;
        let (side, rule) = match stats.lighter_side() {
            Some(side) => (side, PlacementRule::LighterLeg),
            None => (tie_side(sponsor.side), PlacementRule::Tie),
        };
        let parent = stats.frontier(side).unwrap_or(sponsor_id);
        Ok(Some((parent, side, rule)))
    }

    /// Walks the edge the policy names and returns the open child slot
    async fn policy_target(
        &self,
        sponsor_id: DistributorId,
        policy: PlacementPolicy,
    ) -> Result<(DistributorId, Side)> {
        let leg = policy.leg();
        if policy.is_outside() {
            let bottom = self.edge_bottom(sponsor_id, leg).await?;
            return Ok((bottom, leg));
        }
        match self.child(sponsor_id, leg).await? {
            None => Ok((sponsor_id, leg)),
            Some(top) => {
                let inner = leg.opposite();
                let bottom = self.edge_bottom(top, inner).await?;
                Ok((bottom, inner))
            }
        }
    }

    /// Deepest node reached from `start` by following `side` children
    async fn edge_bottom(&self, start: DistributorId, side: Side) -> Result<DistributorId> {
        let mut current = start;
        while let Some(next) = self.child(current, side).await? {
            current = next;
        }
        Ok(current)
    }

    // ---- materialized leg maintenance ---------------------------------

    /// Credits a subtree of `size` nodes, now hanging on `side` of `parent`,
    /// to every ancestor. `outer` holds the bottoms of the subtree's own left
    /// and right outer edges.
    async fn attach(
        &self,
        parent: DistributorId,
        side: Side,
        size: u64,
        outer: (DistributorId, DistributorId),
    ) -> Result<()> {
        let mut current = Some(parent);
        let mut entry_side = side;
        let mut straight = true;

        while let Some(ancestor) = current {
            let mut stats = self.stats(ancestor).await?;
            if let Some(count) = stats.count_mut(entry_side) {
                *count += size;
            }
            // The subtree is on this ancestor's outer edge only while every
            // step up the chain entered through the same side
            if straight {
                let bottom = match entry_side {
                    Side::Right => outer.1,
                    _ => outer.0,
                };
                stats.set_frontier(entry_side, Some(bottom));
            }
            self.save_stats(ancestor, stats).await?;

            let link = self.require_link(ancestor).await?;
            straight = straight && link.side == entry_side;
            entry_side = link.side;
            current = link.placement_parent_id;
        }
        Ok(())
    }

    /// Reverses `attach` for a subtree about to leave `side` of `parent`
    async fn detach(&self, parent: DistributorId, side: Side, size: u64) -> Result<()> {
        let mut current = Some(parent);
        let mut entry_side = side;
        let mut straight = true;

        while let Some(ancestor) = current {
            let mut stats = self.stats(ancestor).await?;
            if let Some(count) = stats.count_mut(entry_side) {
                *count = count.saturating_sub(size);
            }
            if straight {
                // The outer edge now ends at the old parent, or the leg is empty
                let bottom = (ancestor != parent).then_some(parent);
                stats.set_frontier(entry_side, bottom);
            }
            self.save_stats(ancestor, stats).await?;

            let link = self.require_link(ancestor).await?;
            straight = straight && link.side == entry_side;
            entry_side = link.side;
            current = link.placement_parent_id;
        }
        Ok(())
    }

    // ---- admin operations ---------------------------------------------

    pub async fn set_placement_policy(
        &self,
        distributor_id: DistributorId,
        policy: Option<PlacementPolicy>,
    ) -> Result<DualTeamLink> {
        let _guard = self.write_lock.lock().await;
        let mut link = self
            .require_link(distributor_id)
            .await
            .inspect_err(|e| METRICS.record_error(e))?;
        link.placement_policy = policy;
        self.update(link.clone()).await?;
        info!(
            distributor_id,
            policy = policy.map(|p| p.as_str()).unwrap_or("none"),
            "placement policy changed"
        );
        Ok(link)
    }

    /// Moves a node, together with its whole subtree, under `new_parent`
    ///
    /// # Errors
    /// - `InvalidInput`: `Unassigned` side, or `new_parent` inside the moved subtree
    /// - `LegOccupied`: the target side is taken
    /// - `NotFound`: either distributor is not in the tree
    pub async fn change_placement(
        &self,
        distributor_id: DistributorId,
        new_parent: DistributorId,
        side: Side,
    ) -> Result<DualTeamLink> {
        let _guard = self.write_lock.lock().await;
        self.change_locked(distributor_id, new_parent, side)
            .await
            .inspect_err(|e| METRICS.record_error(e))
    }

    async fn change_locked(
        &self,
        distributor_id: DistributorId,
        new_parent: DistributorId,
        side: Side,
    ) -> Result<DualTeamLink> {
        if side == Side::Unassigned {
            return Err(PlacementError::InvalidInput(
                "a placement change needs a left or right side".to_string(),
            ));
        }
        let mut link = self.require_link(distributor_id).await?;
        let parent_link = self.require_link(new_parent).await?;
        if new_parent == distributor_id || self.is_in_downline(distributor_id, new_parent).await? {
            return Err(PlacementError::InvalidInput(format!(
                "distributor {} cannot move under its own downline member {}",
                distributor_id, new_parent
            )));
        }
        if let Some(occupant) = self.child(new_parent, side).await? {
            return Err(PlacementError::LegOccupied {
                parent: new_parent,
                side,
                occupant,
            });
        }

        let stats = self.stats(distributor_id).await?;
        let size = 1 + stats.left_count + stats.right_count;
        let outer = (
            stats.left_frontier.unwrap_or(distributor_id),
            stats.right_frontier.unwrap_or(distributor_id),
        );

        if let Some(old_parent) = link.placement_parent_id {
            self.detach(old_parent, link.side, size).await?;
        }

        link.placement_parent_id = Some(new_parent);
        link.side = side;
        self.update(link.clone()).await?;
        self.attach(new_parent, side, size, outer)
            .await?;

        if parent_link.placement_seq >= link.placement_seq {
            link = self.resequence(distributor_id).await?;
        }

        METRICS.moves_total.with_label_values(&["dual_team"]).inc();
        info!(distributor_id, new_parent, %side, size, "dual-team placement changed");
        Ok(link)
    }

    /// Gives the subtree under `root` fresh sequence values, parents first
    async fn resequence(&self, root: DistributorId) -> Result<DualTeamLink> {
        let mut queue = VecDeque::from([root]);
        let mut root_link = None;
        while let Some(id) = queue.pop_front() {
            let mut link = self.require_link(id).await?;
            link.placement_seq = self.next_seq().await?;
            self.update(link.clone()).await?;
            if id == root {
                root_link = Some(link);
            }
            for side in [Side::Left, Side::Right] {
                if let Some(child) = self.child(id, side).await? {
                    queue.push_back(child);
                }
            }
        }
        debug!(root, "subtree re-sequenced");
        root_link.ok_or_else(|| PlacementError::not_placed(root))
    }

    // ---- reads ----------------------------------------------------------

    /// Materialized left/right counts and frontiers
    pub async fn leg_counts(&self, distributor_id: DistributorId) -> Result<LegStats> {
        self.require_link(distributor_id).await?;
        self.stats(distributor_id).await
    }

    /// Placement parents from the direct parent up to the root
    pub async fn upline(&self, distributor_id: DistributorId) -> Result<Vec<DualTeamLink>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([distributor_id]);
        let mut current = self.require_link(distributor_id).await?.placement_parent_id;
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(PlacementError::Storage(format!(
                    "placement cycle detected at distributor {}",
                    id
                )));
            }
            let link = self.require_link(id).await?;
            current = link.placement_parent_id;
            chain.push(link);
        }
        Ok(chain)
    }

    /// True iff `descendant` sits strictly below `ancestor`
    pub async fn is_in_downline(
        &self,
        ancestor: DistributorId,
        descendant: DistributorId,
    ) -> Result<bool> {
        Ok(self
            .upline(descendant)
            .await?
            .iter()
            .any(|link| link.distributor_id == ancestor))
    }
}

/// Side used when both legs weigh the same
fn tie_side(sponsor_side: Side) -> Side {
    match sponsor_side {
        Side::Unassigned => Side::Left,
        side => side,
    }
}
