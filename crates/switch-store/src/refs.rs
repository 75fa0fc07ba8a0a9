//! Reference index: who points at whom.
//!
//! Every non-null handle stored in an attribute produces one edge
//! `(src, attr_id) -> dst`. The index is keyed by `dst` so "who references
//! this object" is a single lookup. It is derived state: the store updates
//! it in the same critical section as the attribute write that caused the
//! change, and nothing outside the store can add or remove edges.

use crate::attribute::{AttrId, AttrValue, AttributeSet};
use crate::error::{StoreError, StoreResult};
use crate::handle::{Handle, ObjectType};
use crate::store::SwitchStore;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// One inbound edge: `src`'s attribute `attr_id` holds the target handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectRef {
    pub src: Handle,
    pub attr_id: AttrId,
}

#[derive(Debug, Default)]
pub(crate) struct ReferenceIndex {
    inbound: HashMap<Handle, Vec<ObjectRef>>,
    edges: usize,
}

impl ReferenceIndex {
    pub(crate) fn add(&mut self, src: Handle, attr_id: AttrId, dst: Handle) {
        self.inbound
            .entry(dst)
            .or_default()
            .push(ObjectRef { src, attr_id });
        self.edges += 1;
    }

    /// Removes one occurrence of the edge. A missing edge means the index
    /// has drifted from attribute storage, which is fatal.
    pub(crate) fn remove(&mut self, src: Handle, attr_id: AttrId, dst: Handle) -> StoreResult<()> {
        let target = ObjectRef { src, attr_id };
        let list = self.inbound.get_mut(&dst).ok_or_else(|| {
            StoreError::fatal(format!("reference index has no entry for {}", dst))
        })?;
        let pos = list.iter().position(|r| *r == target).ok_or_else(|| {
            StoreError::fatal(format!(
                "reference index missing edge {}.{} -> {}",
                src, attr_id, dst
            ))
        })?;
        list.remove(pos);
        if list.is_empty() {
            self.inbound.remove(&dst);
        }
        self.edges -= 1;
        Ok(())
    }

    pub(crate) fn add_value(&mut self, src: Handle, attr_id: AttrId, value: &AttrValue) {
        for dst in value.handles() {
            self.add(src, attr_id, dst);
        }
    }

    pub(crate) fn remove_value(
        &mut self,
        src: Handle,
        attr_id: AttrId,
        value: &AttrValue,
    ) -> StoreResult<()> {
        for dst in value.handles() {
            self.remove(src, attr_id, dst)?;
        }
        Ok(())
    }

    pub(crate) fn add_all(&mut self, src: Handle, attrs: &AttributeSet) {
        for (attr_id, dst) in attrs.handle_edges() {
            self.add(src, attr_id, dst);
        }
    }

    pub(crate) fn remove_all(&mut self, src: Handle, attrs: &AttributeSet) -> StoreResult<()> {
        for (attr_id, dst) in attrs.handle_edges() {
            self.remove(src, attr_id, dst)?;
        }
        Ok(())
    }

    pub(crate) fn refs_to(&self, dst: Handle) -> &[ObjectRef] {
        self.inbound.get(&dst).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges
    }

    pub(crate) fn clear(&mut self) {
        self.inbound.clear();
        self.edges = 0;
    }
}

impl SwitchStore {
    /// Inbound edges of `dst` whose source has type `src_type`, copied out.
    ///
    /// Pass [`ObjectType::NONE`] to get every inbound edge.
    pub fn get_object_references(&self, dst: Handle, src_type: ObjectType) -> Vec<ObjectRef> {
        let state = self.state.read();
        state
            .refs
            .refs_to(dst)
            .iter()
            .filter(|r| src_type == ObjectType::NONE || r.src.object_type() == src_type)
            .copied()
            .collect()
    }

    /// Borrowed view of every inbound edge of `dst`.
    ///
    /// The slice is only valid inside `f`, and `f` must not call back into
    /// the store.
    pub fn with_object_references<R>(&self, dst: Handle, f: impl FnOnce(&[ObjectRef]) -> R) -> R {
        let state = self.state.read();
        f(state.refs.refs_to(dst))
    }

    /// Distinct handles of type `src_type` referencing `dst`.
    pub fn referencing_set_get(&self, dst: Handle, src_type: ObjectType) -> BTreeSet<Handle> {
        self.get_object_references(dst, src_type)
            .into_iter()
            .map(|r| r.src)
            .collect()
    }

    /// True iff nothing references `handle`.
    pub fn object_ready_for_delete(&self, handle: Handle) -> bool {
        self.state.read().refs.refs_to(handle).is_empty()
    }

    /// Total number of edges in the index.
    pub fn reference_count(&self) -> usize {
        self.state.read().refs.edge_count()
    }
}
