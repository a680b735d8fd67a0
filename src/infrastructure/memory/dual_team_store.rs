/// In-memory dual-team link table
///
/// `children` indexes `(parent, side) -> child` and is the uniqueness
/// constraint that keeps at most one Left and one Right child per node.

use crate::domain::dual_team::{DualTeamLink, LegStats, Side};
use crate::domain::error::{PlacementError, Result};
use crate::domain::ports::DualTeamStore;
use crate::domain::DistributorId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct DualTeamTables {
    links: HashMap<DistributorId, DualTeamLink>,
    children: HashMap<(DistributorId, Side), DistributorId>,
    stats: HashMap<DistributorId, LegStats>,
}

#[derive(Default)]
pub struct InMemoryDualTeamStore {
    tables: RwLock<DualTeamTables>,
    placement_seq: AtomicU64,
}

impl InMemoryDualTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().links.is_empty()
    }
}

fn check_shape(link: &DualTeamLink) -> Result<()> {
    match (link.placement_parent_id, link.side) {
        (Some(_), Side::Unassigned) => Err(PlacementError::InvalidInput(format!(
            "distributor {} has a placement parent but no side",
            link.distributor_id
        ))),
        (None, Side::Left | Side::Right) => Err(PlacementError::InvalidInput(format!(
            "distributor {} has a side but no placement parent",
            link.distributor_id
        ))),
        (Some(parent), _) if parent == link.distributor_id => Err(PlacementError::InvalidInput(
            format!("distributor {} cannot be its own parent", parent),
        )),
        _ => Ok(()),
    }
}

impl DualTeamTables {
    fn check_leg_free(&self, link: &DualTeamLink) -> Result<()> {
        if let Some(parent) = link.placement_parent_id {
            if let Some(&occupant) = self.children.get(&(parent, link.side)) {
                if occupant != link.distributor_id {
                    return Err(PlacementError::LegOccupied {
                        parent,
                        side: link.side,
                        occupant,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DualTeamStore for InMemoryDualTeamStore {
    async fn link(&self, distributor_id: DistributorId) -> Result<Option<DualTeamLink>> {
        Ok(self.tables.read().links.get(&distributor_id).cloned())
    }

    async fn child(&self, parent: DistributorId, side: Side) -> Result<Option<DistributorId>> {
        Ok(self.tables.read().children.get(&(parent, side)).copied())
    }

    async fn insert_link(&self, link: DualTeamLink) -> Result<()> {
        check_shape(&link)?;
        let mut tables = self.tables.write();
        if tables.links.contains_key(&link.distributor_id) {
            return Err(PlacementError::InvalidInput(format!(
                "distributor {} is already placed in the dual team",
                link.distributor_id
            )));
        }
        tables.check_leg_free(&link)?;

        if let Some(parent) = link.placement_parent_id {
            tables
                .children
                .insert((parent, link.side), link.distributor_id);
        }
        tables.links.insert(link.distributor_id, link);
        Ok(())
    }

    async fn update_link(&self, link: DualTeamLink) -> Result<()> {
        check_shape(&link)?;
        let mut tables = self.tables.write();
        let previous = tables
            .links
            .get(&link.distributor_id)
            .cloned()
            .ok_or_else(|| {
                PlacementError::NotFound(format!(
                    "distributor {} has no dual-team link",
                    link.distributor_id
                ))
            })?;
        tables.check_leg_free(&link)?;

        if let Some(old_parent) = previous.placement_parent_id {
            let key = (old_parent, previous.side);
            if tables.children.get(&key) == Some(&link.distributor_id) {
                tables.children.remove(&key);
            }
        }
        if let Some(parent) = link.placement_parent_id {
            tables
                .children
                .insert((parent, link.side), link.distributor_id);
        }
        tables.links.insert(link.distributor_id, link);
        Ok(())
    }

    async fn leg_stats(&self, distributor_id: DistributorId) -> Result<LegStats> {
        Ok(self
            .tables
            .read()
            .stats
            .get(&distributor_id)
            .copied()
            .unwrap_or_default())
    }

    async fn save_leg_stats(&self, distributor_id: DistributorId, stats: LegStats) -> Result<()> {
        self.tables.write().stats.insert(distributor_id, stats);
        Ok(())
    }

    async fn next_placement_seq(&self) -> Result<u64> {
        Ok(self.placement_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: DistributorId, parent: Option<DistributorId>, side: Side) -> DualTeamLink {
        DualTeamLink {
            distributor_id: id,
            placement_parent_id: parent,
            side,
            personal_sponsor_id: parent,
            placement_policy: None,
            placement_seq: id,
        }
    }

    #[tokio::test]
    async fn test_one_child_per_side() {
        let store = InMemoryDualTeamStore::new();
        store.insert_link(link(1, None, Side::Unassigned)).await.unwrap();
        store.insert_link(link(2, Some(1), Side::Left)).await.unwrap();

        let err = store
            .insert_link(link(3, Some(1), Side::Left))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PlacementError::LegOccupied {
                parent: 1,
                side: Side::Left,
                occupant: 2
            }
        );

        store.insert_link(link(3, Some(1), Side::Right)).await.unwrap();
        assert_eq!(store.child(1, Side::Left).await.unwrap(), Some(2));
        assert_eq!(store.child(1, Side::Right).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_rejects_malformed_links() {
        let store = InMemoryDualTeamStore::new();
        assert!(store.insert_link(link(1, Some(9), Side::Unassigned)).await.is_err());
        assert!(store.insert_link(link(1, None, Side::Left)).await.is_err());
        assert!(store.insert_link(link(1, Some(1), Side::Left)).await.is_err());

        store.insert_link(link(1, None, Side::Unassigned)).await.unwrap();
        assert!(store.insert_link(link(1, None, Side::Unassigned)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_moves_child_index() {
        let store = InMemoryDualTeamStore::new();
        store.insert_link(link(1, None, Side::Unassigned)).await.unwrap();
        store.insert_link(link(2, Some(1), Side::Left)).await.unwrap();

        store.update_link(link(2, Some(1), Side::Right)).await.unwrap();
        assert_eq!(store.child(1, Side::Left).await.unwrap(), None);
        assert_eq!(store.child(1, Side::Right).await.unwrap(), Some(2));

        assert!(matches!(
            store.update_link(link(5, Some(1), Side::Left)).await,
            Err(PlacementError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sequence_is_increasing() {
        let store = InMemoryDualTeamStore::new();
        let a = store.next_placement_seq().await.unwrap();
        let b = store.next_placement_seq().await.unwrap();
        assert!(b > a);
        assert_eq!(store.leg_stats(a).await.unwrap(), LegStats::default());
    }
}
