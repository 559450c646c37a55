use crate::prelude::*;
use crate::sunspec::ModelSnapshot;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Point-in-time copy of everything cached.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheState {
    pub data: BTreeMap<u16, ModelSnapshot>,
    pub last_read_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Entries {
    snapshots: HashMap<u16, Arc<ModelSnapshot>>,
    last_read_time: Option<DateTime<Utc>>,
}

/// Latest snapshot per model. Snapshots are swapped in whole, so readers see
/// either the previous or the new one. Entries never expire.
#[derive(Default)]
pub struct DataCache {
    entries: RwLock<Entries>,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: ModelSnapshot) {
        let captured_at = snapshot.captured_at;
        let model_id = snapshot.model_id;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.snapshots.insert(model_id, Arc::new(snapshot));
        if entries.last_read_time.map_or(true, |t| t < captured_at) {
            entries.last_read_time = Some(captured_at);
        }

        trace!("cache: model {} updated at {}", model_id, captured_at);
    }

    pub fn get(&self, model_id: u16) -> Option<Arc<ModelSnapshot>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshots
            .get(&model_id)
            .cloned()
    }

    pub fn get_all(&self) -> CacheState {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());

        CacheState {
            data: entries
                .snapshots
                .iter()
                .map(|(id, snapshot)| (*id, ModelSnapshot::clone(snapshot)))
                .collect(),
            last_read_time: entries.last_read_time,
        }
    }

    pub fn last_read_time(&self) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last_read_time
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshots
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
