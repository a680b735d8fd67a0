/// In-memory append-only position-change log
///
/// Entries are never updated or removed. Per distributor the timestamps are
/// kept monotonic: an entry stamped earlier than that distributor's latest
/// one (clock skew between writers) is moved forward to it.

use crate::domain::error::Result;
use crate::domain::ports::ChangeAudit;
use crate::domain::slot::PositionChange;
use crate::domain::DistributorId;
use async_trait::async_trait;
use parking_lot::RwLock;

#[derive(Default)]
pub struct InMemoryChangeAudit {
    entries: RwLock<Vec<PositionChange>>,
}

impl InMemoryChangeAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of the whole log, in append order
    pub fn entries(&self) -> Vec<PositionChange> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl ChangeAudit for InMemoryChangeAudit {
    async fn record(&self, mut change: PositionChange) -> Result<()> {
        let mut entries = self.entries.write();
        let latest = entries
            .iter()
            .rev()
            .find(|entry| entry.distributor_id == change.distributor_id)
            .map(|entry| entry.timestamp);
        if let Some(latest) = latest {
            if change.timestamp < latest {
                change.timestamp = latest;
            }
        }
        entries.push(change);
        Ok(())
    }

    async fn history(&self, distributor_id: DistributorId) -> Result<Vec<PositionChange>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.distributor_id == distributor_id)
            .cloned()
            .collect())
    }
}
