//! Counter delegation and the warm-restart stats cache.
//!
//! The store keeps no live counter values. Reads and clears go to the
//! `counter_get` / `counters_set` / `all_counters_set` hooks of the
//! object's type. The stats cache holds a snapshot taken before shutdown
//! so adapters can seed hardware counters again after a warm restart.

use crate::error::{StoreError, StoreResult};
use crate::handle::Handle;
use crate::store::SwitchStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counter forwarding through `counter`-flagged attributes stops after
/// this many hops.
const MAX_COUNTER_FORWARD: usize = 8;

/// One counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Counter {
    pub id: u16,
    pub count: u64,
}

impl Counter {
    pub fn new(id: u16, count: u64) -> Self {
        Self { id, count }
    }
}

/// Counter snapshots keyed by handle.
#[derive(Debug, Default)]
pub(crate) struct StatsCache {
    entries: BTreeMap<Handle, Vec<Counter>>,
}

impl StatsCache {
    pub(crate) fn insert(&mut self, handle: Handle, counters: Vec<Counter>) {
        self.entries.insert(handle, counters);
    }

    pub(crate) fn take(&mut self) -> BTreeMap<Handle, Vec<Counter>> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Handle, Vec<Counter>> {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl SwitchStore {
    /// Current counters of an object.
    ///
    /// Concatenates the output of every `counter_get` hook of the type. A
    /// type without hooks forwards to the object named by its
    /// `counter`-flagged handle attribute, if set.
    pub fn object_counters_get(&self, handle: Handle) -> StoreResult<Vec<Counter>> {
        self.counters_get_forwarded(handle, 0)
    }

    fn counters_get_forwarded(&self, handle: Handle, hops: usize) -> StoreResult<Vec<Counter>> {
        if !self.object_exists(handle) {
            return Err(StoreError::not_found(handle.to_string()));
        }
        let object_type = handle.object_type();
        let hooks = self.triggers.counter_get(object_type);
        if !hooks.is_empty() {
            let mut counters = Vec::new();
            for hook in hooks {
                hook(self, handle, &mut counters)?;
            }
            return Ok(counters);
        }

        let desc = self.schema.get(object_type)?;
        let unsupported = || StoreError::not_supported(format!("counters on {}", desc.name));
        let attr = desc.counter_attr().ok_or_else(unsupported)?;
        let target = self
            .attribute_get_as::<Handle>(handle, attr.id)
            .unwrap_or(Handle::NULL);
        if target.is_null() || hops >= MAX_COUNTER_FORWARD {
            return Err(unsupported());
        }
        debug!("counters of {} forwarded to {}", handle, target);
        self.counters_get_forwarded(target, hops + 1)
    }

    /// Zeroes the given counters through the `counters_set` hooks.
    pub fn object_counters_clear(&self, handle: Handle, ids: &[u16]) -> StoreResult<()> {
        if !self.object_exists(handle) {
            return Err(StoreError::not_found(handle.to_string()));
        }
        let desc = self.schema.get(handle.object_type())?;
        if !desc.counters.is_empty() {
            if let Some(id) = ids.iter().find(|id| desc.counter(**id).is_none()) {
                return Err(StoreError::invalid_attribute(format!(
                    "{} has no counter {}",
                    desc.name, id
                )));
            }
        }
        let hooks = self.triggers.counters_set(handle.object_type());
        if hooks.is_empty() {
            return Err(StoreError::not_supported(format!("counter clear on {}", desc.name)));
        }
        let zeroed: Vec<_> = ids.iter().map(|id| Counter::new(*id, 0)).collect();
        for hook in hooks {
            hook(self, handle, &zeroed)?;
        }
        Ok(())
    }

    /// Clears every counter through the `all_counters_set` hooks.
    pub fn object_counters_clear_all(&self, handle: Handle) -> StoreResult<()> {
        if !self.object_exists(handle) {
            return Err(StoreError::not_found(handle.to_string()));
        }
        let hooks = self.triggers.all_counters_set(handle.object_type());
        if hooks.is_empty() {
            return Err(StoreError::not_supported(format!(
                "counter clear on type {}",
                handle.object_type()
            )));
        }
        for hook in hooks {
            hook(self, handle)?;
        }
        Ok(())
    }

    /// Snapshots counters of every live object whose type has a
    /// `counter_get` hook. Returns the number of objects cached.
    pub fn object_backup_stats_cache(&self) -> StoreResult<usize> {
        let mut snapshot = Vec::new();
        for object_type in self.triggers.counter_types() {
            if !self.schema.contains(object_type) {
                continue;
            }
            for handle in self.object_get_all_handles(object_type)? {
                match self.object_counters_get(handle) {
                    Ok(counters) => snapshot.push((handle, counters)),
                    // deleted since the handle list was taken
                    Err(StoreError::ItemNotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let mut cache = self.stats_cache.lock();
        cache.clear();
        for (handle, counters) in snapshot {
            cache.insert(handle, counters);
        }
        info!("Backed up counters of {} objects", cache.len());
        Ok(cache.len())
    }

    /// Pushes cached counters back to hardware after a warm restart and
    /// empties the cache. Returns the number of objects restored. Without
    /// `warm_init` the cache is only dropped.
    pub fn object_restore_stats_cache(&self, warm_init: bool) -> StoreResult<usize> {
        let cached = self.stats_cache.lock().take();
        if !warm_init {
            return Ok(0);
        }

        let mut restored = 0;
        for (handle, counters) in cached {
            if !self.object_exists(handle) {
                warn!("Skipping cached counters of stale handle {}", handle);
                continue;
            }
            let hooks = self.triggers.counters_set(handle.object_type());
            if hooks.is_empty() {
                warn!("No counters_set hook for {}, cached counters dropped", handle);
                continue;
            }
            for hook in hooks {
                hook(self, handle, &counters)?;
            }
            restored += 1;
        }
        info!("Restored counters of {} objects", restored);
        Ok(restored)
    }

    pub(crate) fn load_stats_cache(&self, entries: impl IntoIterator<Item = (Handle, Vec<Counter>)>) {
        let mut cache = self.stats_cache.lock();
        for (handle, counters) in entries {
            cache.insert(handle, counters);
        }
    }

    pub(crate) fn stats_cache_snapshot(&self) -> BTreeMap<Handle, Vec<Counter>> {
        self.stats_cache.lock().entries().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ObjectType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cache_take_empties() {
        let mut cache = StatsCache::default();
        let h = Handle::new(ObjectType(1), 1);
        cache.insert(h, vec![Counter::new(0, 10)]);
        cache.insert(h, vec![Counter::new(0, 12)]);
        assert_eq!(cache.len(), 1);
        let taken = cache.take();
        assert_eq!(taken[&h], vec![Counter::new(0, 12)]);
        assert_eq!(cache.len(), 0);
    }
}
