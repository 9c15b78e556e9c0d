use crate::error::SyncError;
use crate::logic::types::SyncType;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::debug;

/// In-process exclusion between runs of the same sync type.
#[derive(Debug, Clone, Default)]
pub struct SyncLeases {
    held: Arc<DashSet<SyncType>>,
}

/// Held for the lifetime of one run; released on drop.
#[derive(Debug)]
pub struct SyncLease {
    sync_type: SyncType,
    held: Arc<DashSet<SyncType>>,
}

impl SyncLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, sync_type: SyncType) -> Result<SyncLease, SyncError> {
        if !self.held.insert(sync_type) {
            return Err(SyncError::RunInProgress(sync_type));
        }
        debug!("Acquired {} sync lease", sync_type);
        Ok(SyncLease {
            sync_type,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, sync_type: SyncType) -> bool {
        self.held.contains(&sync_type)
    }
}

impl SyncLease {
    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }
}

impl Drop for SyncLease {
    fn drop(&mut self) {
        self.held.remove(&self.sync_type);
        debug!("Released {} sync lease", self.sync_type);
    }
}
