//! Per-type object storage and id allocation.

use crate::attribute::AttributeSet;
use crate::error::{StoreError, StoreResult};
use crate::handle::{Handle, ObjectType, MAX_OBJECT_ID};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Live instances of one object type, ordered by local id.
///
/// Ids are handed out lowest-free-first. Every id below `next_id` is
/// either occupied or in `free`; ids at or above `next_id` may be occupied
/// by caller-chosen ids (`object_create_by_id`), which allocation skips.
#[derive(Debug)]
pub(crate) struct ObjectTable {
    object_type: ObjectType,
    name: String,
    max_objects: u64,
    objects: BTreeMap<u64, AttributeSet>,
    free: BTreeSet<u64>,
    next_id: u64,
}

impl ObjectTable {
    pub(crate) fn new(object_type: ObjectType, name: &str, max_objects: u64) -> Self {
        Self {
            object_type,
            name: name.to_string(),
            max_objects,
            objects: BTreeMap::new(),
            free: BTreeSet::new(),
            next_id: 1,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.objects.contains_key(&id)
    }

    pub(crate) fn get(&self, id: u64) -> Option<&AttributeSet> {
        self.objects.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut AttributeSet> {
        self.objects.get_mut(&id)
    }

    fn check_capacity(&self) -> StoreResult<()> {
        if self.objects.len() as u64 >= self.max_objects {
            return Err(StoreError::exhausted(format!(
                "{}: {} objects in use",
                self.name, self.max_objects
            )));
        }
        Ok(())
    }

    /// Picks the lowest free id.
    pub(crate) fn allocate_id(&mut self) -> StoreResult<u64> {
        self.check_capacity()?;
        if let Some(id) = self.free.pop_first() {
            return Ok(id);
        }
        while self.next_id <= MAX_OBJECT_ID {
            let id = self.next_id;
            self.next_id += 1;
            if !self.objects.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(StoreError::exhausted(format!("{}: id space", self.name)))
    }

    /// Claims a caller-chosen id.
    pub(crate) fn reserve_id(&mut self, id: u64) -> StoreResult<()> {
        if self.objects.contains_key(&id) {
            return Err(StoreError::already_exists(
                Handle::new(self.object_type, id).to_string(),
            ));
        }
        self.check_capacity()?;
        self.free.remove(&id);
        Ok(())
    }

    /// Stores attributes under an id obtained from `allocate_id` or
    /// `reserve_id`.
    pub(crate) fn insert(&mut self, id: u64, attrs: AttributeSet) {
        self.objects.insert(id, attrs);
    }

    /// Removes an instance and releases its id.
    pub(crate) fn remove(&mut self, id: u64) -> Option<AttributeSet> {
        let attrs = self.objects.remove(&id)?;
        if id < self.next_id {
            self.free.insert(id);
        }
        Some(attrs)
    }

    pub(crate) fn first_id(&self) -> Option<u64> {
        self.objects.keys().next().copied()
    }

    /// Up to `n` live ids strictly greater than `cursor`.
    pub(crate) fn ids_after(&self, cursor: u64, n: usize) -> Vec<u64> {
        self.objects
            .range((Bound::Excluded(cursor), Bound::Unbounded))
            .take(n)
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, &AttributeSet)> {
        self.objects.iter().map(|(id, attrs)| (*id, attrs))
    }

    pub(crate) fn clear(&mut self) {
        self.objects.clear();
        self.free.clear();
        self.next_id = 1;
    }
}
