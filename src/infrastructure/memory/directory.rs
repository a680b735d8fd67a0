/// In-memory distributor directory

use crate::domain::distributor::DistributorProfile;
use crate::domain::error::{PlacementError, Result};
use crate::domain::ports::DistributorDirectory;
use crate::domain::DistributorId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Profiles {
    by_id: HashMap<DistributorId, DistributorProfile>,
    logins: HashMap<String, DistributorId>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    profiles: RwLock<Profiles>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a profile
    ///
    /// # Errors
    /// `InvalidInput` if the login already belongs to another distributor.
    pub fn insert(&self, profile: DistributorProfile) -> Result<()> {
        let mut profiles = self.profiles.write();
        if let Some(&owner) = profiles.logins.get(&profile.login) {
            if owner != profile.id {
                return Err(PlacementError::InvalidInput(format!(
                    "login '{}' already belongs to distributor {}",
                    profile.login, owner
                )));
            }
        }
        if let Some(old_login) = profiles.by_id.get(&profile.id).map(|old| old.login.clone()) {
            profiles.logins.remove(&old_login);
        }
        profiles.logins.insert(profile.login.clone(), profile.id);
        profiles.by_id.insert(profile.id, profile);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.profiles.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().by_id.is_empty()
    }
}

#[async_trait]
impl DistributorDirectory for InMemoryDirectory {
    async fn by_id(&self, distributor_id: DistributorId) -> Result<Option<DistributorProfile>> {
        Ok(self.profiles.read().by_id.get(&distributor_id).cloned())
    }

    async fn by_login(&self, login: &str) -> Result<Option<DistributorProfile>> {
        let profiles = self.profiles.read();
        Ok(profiles
            .logins
            .get(login)
            .and_then(|id| profiles.by_id.get(id))
            .cloned())
    }
}
