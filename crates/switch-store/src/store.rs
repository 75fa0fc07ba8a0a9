//! The object store: CRUD, validation, key lookup and iteration.
//!
//! [`SwitchStore`] owns every object's attribute set. Mutations go through
//! a fixed sequence:
//!
//! 1. take the coarse store lock (re-entrant, see [`crate::lock`])
//! 2. run "before" hooks, which may rewrite the request or veto it
//! 3. validate against the schema and commit under a short internal
//!    write lock, updating the reference index in the same section
//! 4. run "after" hooks with no internal lock held
//!
//! Readers only take the internal read lock, so `attribute_get` and
//! iteration never wait on hooks.

use crate::attribute::{AttrId, AttrValue, Attribute, AttributeSet, FromAttrValue};
use crate::counters::StatsCache;
use crate::error::{StoreError, StoreResult};
use crate::handle::{object_id_in_range, Handle, ObjectType};
use crate::lock::{ObjectLocks, StoreContext, StoreLock};
use crate::refs::ReferenceIndex;
use crate::schema::{AttrDescriptor, SchemaRegistry, TypeDescriptor};
use crate::table::ObjectTable;
use crate::triggers::TriggerRegistry;
use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Tables plus the reference index. Always mutated together.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) tables: HashMap<ObjectType, ObjectTable>,
    pub(crate) refs: ReferenceIndex,
}

impl StoreState {
    fn new(schema: &SchemaRegistry) -> Self {
        let tables = schema
            .types()
            .map(|t| (t.object_type, ObjectTable::new(t.object_type, &t.name, t.max_objects)))
            .collect();
        Self {
            tables,
            refs: ReferenceIndex::default(),
        }
    }

    pub(crate) fn table(&self, object_type: ObjectType) -> StoreResult<&ObjectTable> {
        self.tables.get(&object_type).ok_or_else(|| {
            StoreError::invalid_attribute(format!("unknown object type {}", object_type))
        })
    }

    fn table_mut(&mut self, object_type: ObjectType) -> StoreResult<&mut ObjectTable> {
        self.tables.get_mut(&object_type).ok_or_else(|| {
            StoreError::invalid_attribute(format!("unknown object type {}", object_type))
        })
    }

    pub(crate) fn exists(&self, handle: Handle) -> bool {
        !handle.is_null()
            && self
                .tables
                .get(&handle.object_type())
                .is_some_and(|t| t.contains(handle.id()))
    }

    pub(crate) fn attrs(&self, handle: Handle) -> StoreResult<&AttributeSet> {
        self.tables
            .get(&handle.object_type())
            .and_then(|t| t.get(handle.id()))
            .ok_or_else(|| StoreError::not_found(handle.to_string()))
    }

    fn check_refs_live(&self, type_name: &str, value_edges: &[(AttrId, Handle)]) -> StoreResult<()> {
        for (attr_id, dst) in value_edges {
            if !self.exists(*dst) {
                return Err(StoreError::invalid_attribute(format!(
                    "{} attribute {} references missing object {}",
                    type_name, attr_id, dst
                )));
            }
        }
        Ok(())
    }

    /// First live instance (ascending id) whose attributes equal every
    /// probe entry. A `None` probe value matches an absent attribute.
    fn find_by_key(
        &self,
        desc: &TypeDescriptor,
        probe: &[(AttrId, Option<&AttrValue>)],
        exclude: Option<Handle>,
    ) -> Option<Handle> {
        let table = self.tables.get(&desc.object_type)?;
        table
            .iter()
            .map(|(id, attrs)| (Handle::new(desc.object_type, id), attrs))
            .filter(|(h, _)| Some(*h) != exclude)
            .find(|(_, attrs)| probe.iter().all(|(id, v)| attrs.get(*id) == *v))
            .map(|(h, _)| h)
    }

    /// Writes one attribute value and swaps its reference edges.
    pub(crate) fn replace_value(
        &mut self,
        handle: Handle,
        attr_id: AttrId,
        value: AttrValue,
    ) -> StoreResult<Option<AttrValue>> {
        let attrs = self
            .tables
            .get_mut(&handle.object_type())
            .and_then(|t| t.get_mut(handle.id()))
            .ok_or_else(|| StoreError::not_found(handle.to_string()))?;
        self.refs.add_value(handle, attr_id, &value);
        let old = attrs.set(attr_id, value);
        if let Some(old) = &old {
            self.refs.remove_value(handle, attr_id, old)?;
        }
        Ok(old)
    }

    /// Drops an instance and its outbound edges.
    pub(crate) fn remove_instance(&mut self, handle: Handle) -> StoreResult<AttributeSet> {
        let attrs = self
            .table_mut(handle.object_type())?
            .remove(handle.id())
            .ok_or_else(|| StoreError::not_found(handle.to_string()))?;
        self.refs.remove_all(handle, &attrs)?;
        Ok(attrs)
    }

    pub(crate) fn clear(&mut self) {
        for table in self.tables.values_mut() {
            table.clear();
        }
        self.refs.clear();
    }
}

/// Which parts of the create sequence run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CreateMode {
    before_hooks: bool,
    after_hooks: bool,
    auto_objects: bool,
}

impl CreateMode {
    pub(crate) const FULL: CreateMode = CreateMode {
        before_hooks: true,
        after_hooks: true,
        auto_objects: true,
    };
    pub(crate) const MINIMAL: CreateMode = CreateMode {
        before_hooks: false,
        after_hooks: false,
        auto_objects: false,
    };
    /// Warm-boot replay: state is restored as-is, adapters only observe.
    pub(crate) const REPLAY: CreateMode = CreateMode {
        before_hooks: false,
        after_hooks: true,
        auto_objects: false,
    };
}

/// The switch object store.
///
/// One instance per process, owned by whatever composes the store with its
/// adapters and shared through an `Arc`.
pub struct SwitchStore {
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) state: RwLock<StoreState>,
    pub(crate) triggers: TriggerRegistry,
    pub(crate) store_lock: StoreLock,
    pub(crate) object_locks: ObjectLocks,
    pub(crate) stats_cache: Mutex<StatsCache>,
    pub(crate) context: StoreContext,
}

impl fmt::Debug for SwitchStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchStore")
            .field("schema_version", &self.schema.version())
            .field("objects", &self.object_count_total())
            .field("warm_init", &self.is_warm_init())
            .finish()
    }
}

impl SwitchStore {
    /// Empty store over a loaded schema.
    pub fn new(schema: SchemaRegistry) -> Self {
        Self::with_schema(Arc::new(schema))
    }

    pub fn with_schema(schema: Arc<SchemaRegistry>) -> Self {
        let state = StoreState::new(&schema);
        Self {
            schema,
            state: RwLock::new(state),
            triggers: TriggerRegistry::default(),
            store_lock: StoreLock::default(),
            object_locks: ObjectLocks::default(),
            stats_cache: Mutex::new(StatsCache::default()),
            context: StoreContext::default(),
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    // ---- create ----

    /// Creates an object with a freshly allocated id.
    ///
    /// Runs `create_before` hooks, validates, stores, creates the type's
    /// auto-objects and finally runs `create_after` hooks. If an
    /// auto-object cannot be created the parent is removed again and the
    /// error returned.
    pub fn object_create(
        &self,
        object_type: ObjectType,
        attrs: impl Into<AttributeSet>,
    ) -> StoreResult<Handle> {
        self.create_internal(object_type, None, attrs.into(), CreateMode::FULL)
    }

    /// Like [`object_create`](Self::object_create) with a caller-chosen id.
    pub fn object_create_by_id(
        &self,
        object_type: ObjectType,
        id: u64,
        attrs: impl Into<AttributeSet>,
    ) -> StoreResult<Handle> {
        self.create_internal(object_type, Some(id), attrs.into(), CreateMode::FULL)
    }

    /// Like [`object_create`](Self::object_create) with a caller-chosen
    /// handle.
    pub fn object_create_by_hdl(
        &self,
        handle: Handle,
        attrs: impl Into<AttributeSet>,
    ) -> StoreResult<Handle> {
        self.create_internal(
            handle.object_type(),
            Some(handle.id()),
            attrs.into(),
            CreateMode::FULL,
        )
    }

    /// Validates and stores only: no hooks, no auto-objects.
    pub fn object_create_minimal(
        &self,
        object_type: ObjectType,
        attrs: impl Into<AttributeSet>,
    ) -> StoreResult<Handle> {
        self.create_internal(object_type, None, attrs.into(), CreateMode::MINIMAL)
    }

    pub(crate) fn create_internal(
        &self,
        object_type: ObjectType,
        id: Option<u64>,
        mut attrs: AttributeSet,
        mode: CreateMode,
    ) -> StoreResult<Handle> {
        let _batch = self.store_lock.lock();
        let schema = Arc::clone(&self.schema);
        let desc = schema.get(object_type)?;
        if let Some(id) = id {
            if !object_id_in_range(id) {
                return Err(StoreError::invalid_attribute(format!(
                    "{}: id {} out of range",
                    desc.name, id
                )));
            }
        }

        if mode.before_hooks {
            for hook in self.triggers.create_before(object_type) {
                if let Err(e) = hook(self, object_type, &mut attrs) {
                    debug!("create {} vetoed: {}", desc.name, e);
                    return Err(e);
                }
            }
        }

        let attrs = prepare_attrs(desc, attrs)?;
        let handle = {
            let mut state = self.state.write();
            state.check_refs_live(&desc.name, &attrs.handle_edges())?;
            if let Some(existing) = find_key_conflict(&state, desc, &attrs, None) {
                return Err(StoreError::key_conflict(format!(
                    "{} key already used by {}",
                    desc.name, existing
                )));
            }
            let table = state.table_mut(object_type)?;
            let id = match id {
                Some(id) => {
                    table.reserve_id(id)?;
                    id
                }
                None => table.allocate_id()?,
            };
            let handle = Handle::new(object_type, id);
            table.insert(id, attrs.clone());
            state.refs.add_all(handle, &attrs);
            handle
        };
        debug!("created {} {}", desc.name, handle);

        if mode.auto_objects {
            if let Err(e) = self.create_auto_objects(handle, desc) {
                warn!("auto objects for {} {} failed: {}", desc.name, handle, e);
                self.rollback_create(handle)?;
                return Err(e);
            }
        }

        if mode.after_hooks {
            for hook in self.triggers.create_after(object_type) {
                if let Err(e) = hook(self, handle, &attrs) {
                    warn!("create_after hook for {} {} failed: {}", desc.name, handle, e);
                }
            }
        }
        Ok(handle)
    }

    fn create_auto_objects(&self, parent: Handle, desc: &TypeDescriptor) -> StoreResult<()> {
        for auto_type in &desc.auto_objects {
            if self.skip_auto_object(parent, *auto_type) {
                debug!("skipping auto object type {} for {}", auto_type, parent);
                continue;
            }
            let child = self.schema.get(*auto_type)?;
            let parent_attr = child.parent_attr().ok_or_else(|| {
                StoreError::fatal(format!("{} has no parent attribute", child.name))
            })?;
            let attrs = AttributeSet::new().with(parent_attr.id, parent);
            self.create_internal(*auto_type, None, attrs, CreateMode::FULL)?;
        }
        Ok(())
    }

    /// Undoes a create whose auto-objects failed: removes `handle` with
    /// every auto-object created so far. Delete-before hooks cannot veto
    /// an undo. Auto-objects that completed their own create get their
    /// delete-after hooks; the parent was never announced and gets none.
    fn rollback_create(&self, handle: Handle) -> StoreResult<()> {
        let removed = self.remove_subtree(handle).map_err(|e| {
            error!("rollback of {} failed: {}", handle, e);
            StoreError::fatal(format!("rollback of {} failed: {}", handle, e))
        })?;
        for h in &removed {
            self.object_locks.clear(*h);
        }
        for h in removed.into_iter().filter(|h| *h != handle) {
            self.run_delete_after(h);
        }
        Ok(())
    }

    // ---- delete ----

    /// Deletes an object and its auto-objects.
    ///
    /// Fails with `InUse` while anything other than the object's own
    /// auto-object subtree references it or one of its auto-objects.
    ///
    /// Every `delete_before` hook of the subtree runs first, parent before
    /// children. A veto from any of them leaves the whole subtree in place.
    /// The subtree is then removed in one step, children first, and the
    /// `delete_after` hooks run in removal order.
    pub fn object_delete(&self, handle: Handle) -> StoreResult<()> {
        let _batch = self.store_lock.lock();
        let order = {
            let state = self.state.read();
            if !state.exists(handle) {
                return Err(StoreError::not_found(handle.to_string()));
            }
            let order = self.subtree_order(&state, handle);
            check_unreferenced(&state, &order)?;
            order
        };

        for h in &order {
            for hook in self.triggers.delete_before(h.object_type()) {
                if let Err(e) = hook(self, *h) {
                    debug!("delete {} vetoed at {}: {}", handle, h, e);
                    return Err(e);
                }
            }
        }

        let removed = self.remove_subtree(handle)?;
        for h in &removed {
            self.object_locks.clear(*h);
        }
        for h in removed {
            self.run_delete_after(h);
        }
        Ok(())
    }

    pub fn object_delete_by_id(&self, object_type: ObjectType, id: u64) -> StoreResult<()> {
        self.object_delete(handle_for_id(object_type, id)?)
    }

    /// `handle` plus every auto-object transitively hanging off it, each
    /// parent ahead of its children. Children are visited in descending
    /// id order.
    fn subtree_order(&self, state: &StoreState, handle: Handle) -> Vec<Handle> {
        let mut order = Vec::new();
        let mut pending = vec![handle];
        while let Some(h) = pending.pop() {
            order.push(h);
            pending.extend(self.auto_children(state, h));
        }
        order
    }

    /// Auto-objects whose parent attribute points at `parent`, in id order.
    fn auto_children(&self, state: &StoreState, parent: Handle) -> Vec<Handle> {
        let Ok(desc) = self.schema.get(parent.object_type()) else {
            return Vec::new();
        };
        let mut children: Vec<Handle> = state
            .refs
            .refs_to(parent)
            .iter()
            .filter(|r| desc.auto_objects.contains(&r.src.object_type()))
            .filter(|r| {
                self.schema
                    .get(r.src.object_type())
                    .ok()
                    .and_then(|c| c.parent_attr())
                    .is_some_and(|a| a.id == r.attr_id)
            })
            .map(|r| r.src)
            .collect();
        children.sort();
        children.dedup();
        children
    }

    /// Removes `handle` and its auto-object subtree under one write lock,
    /// children first, and returns the removed handles in that order.
    /// Nothing is removed if any member is referenced from outside the
    /// subtree.
    fn remove_subtree(&self, handle: Handle) -> StoreResult<Vec<Handle>> {
        let mut state = self.state.write();
        if !state.exists(handle) {
            return Err(StoreError::not_found(handle.to_string()));
        }
        let mut order = self.subtree_order(&state, handle);
        check_unreferenced(&state, &order)?;
        order.reverse();
        for h in &order {
            state.remove_instance(*h)?;
            debug!("deleted {}", h);
        }
        Ok(order)
    }

    fn run_delete_after(&self, handle: Handle) {
        for hook in self.triggers.delete_after(handle.object_type()) {
            if let Err(e) = hook(self, handle) {
                warn!("delete_after hook for {} failed: {}", handle, e);
            }
        }
    }

    // ---- attributes ----

    /// Sets one attribute.
    ///
    /// Setting a value equal to the stored one is a no-op and fires no
    /// hooks.
    pub fn attribute_set(&self, handle: Handle, attr: Attribute) -> StoreResult<()> {
        let _batch = self.store_lock.lock();
        let schema = Arc::clone(&self.schema);
        let desc = schema.get(handle.object_type())?;
        check_settable(desc, &attr)?;

        let unchanged = {
            let state = self.state.read();
            state.attrs(handle)?.get(attr.id) == Some(&attr.value)
        };
        if unchanged {
            return Ok(());
        }

        let mut attr = attr;
        for hook in self.triggers.update_before(handle.object_type()) {
            if let Err(e) = hook(self, handle, &mut attr) {
                debug!("update of {} attribute {} vetoed: {}", handle, attr.id, e);
                return Err(e);
            }
        }
        let attr_desc = check_settable(desc, &attr)?;

        self.write_value(desc, attr_desc, handle, attr.value.clone())?;
        debug!("set {} {} = {}", handle, attr_desc.name, attr.value);

        for hook in self.triggers.update_after(handle.object_type()) {
            if let Err(e) = hook(self, handle, &attr) {
                warn!("update_after hook for {} failed: {}", handle, e);
            }
        }
        Ok(())
    }

    /// Typed form of [`attribute_set`](Self::attribute_set).
    pub fn attribute_set_value(
        &self,
        handle: Handle,
        id: AttrId,
        value: impl Into<AttrValue>,
    ) -> StoreResult<()> {
        self.attribute_set(handle, Attribute::new(id, value))
    }

    /// Validates referenced handles and key uniqueness, then commits.
    fn write_value(
        &self,
        desc: &TypeDescriptor,
        attr_desc: &AttrDescriptor,
        handle: Handle,
        value: AttrValue,
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        let current = state.attrs(handle)?;
        let edges: Vec<_> = value.handles().into_iter().map(|h| (attr_desc.id, h)).collect();
        state.check_refs_live(&desc.name, &edges)?;
        if attr_desc.is_key {
            let mut probe = current.clone();
            probe.set(attr_desc.id, value.clone());
            if let Some(existing) = find_key_conflict(&state, desc, &probe, Some(handle)) {
                return Err(StoreError::key_conflict(format!(
                    "{} key already used by {}",
                    desc.name, existing
                )));
            }
        }
        state.replace_value(handle, attr_desc.id, value)?;
        Ok(())
    }

    /// Reads one attribute. Attributes never set resolve to their schema
    /// default.
    pub fn attribute_get(&self, handle: Handle, id: AttrId) -> StoreResult<Attribute> {
        let state = self.state.read();
        let attrs = state.attrs(handle)?;
        if let Some(value) = attrs.get(id) {
            return Ok(Attribute {
                id,
                value: value.clone(),
            });
        }
        let desc = self.schema.get(handle.object_type())?;
        match &desc.require_attr(id)?.default {
            Some(value) => Ok(Attribute {
                id,
                value: value.clone(),
            }),
            None => Err(StoreError::not_found(format!("{} attribute {}", handle, id))),
        }
    }

    pub fn attribute_get_as<T: FromAttrValue>(&self, handle: Handle, id: AttrId) -> StoreResult<T> {
        self.attribute_get(handle, id)?.value.get()
    }

    /// Owned snapshot of every stored attribute.
    pub fn attribute_get_all(&self, handle: Handle) -> StoreResult<AttributeSet> {
        Ok(self.state.read().attrs(handle)?.clone())
    }

    /// Borrowed view of the stored attributes, valid only inside `f`.
    /// `f` must not call back into the store.
    pub fn with_attributes<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&AttributeSet) -> R,
    ) -> StoreResult<R> {
        let state = self.state.read();
        Ok(f(state.attrs(handle)?))
    }

    // ---- list attributes ----

    fn list_modify(
        &self,
        handle: Handle,
        id: AttrId,
        f: impl FnOnce(&mut Vec<AttrValue>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let _batch = self.store_lock.lock();
        let schema = Arc::clone(&self.schema);
        let desc = schema.get(handle.object_type())?;
        let attr_desc = list_attr(desc, id)?;
        if attr_desc.is_create_only {
            return Err(StoreError::read_only(format!("{}.{}", desc.name, attr_desc.name)));
        }
        let mut items = match self.state.read().attrs(handle)?.get(id) {
            Some(AttrValue::List(items)) => items.clone(),
            Some(other) => {
                return Err(StoreError::fatal(format!(
                    "{} attribute {} holds {} instead of a list",
                    handle,
                    id,
                    other.kind_name()
                )))
            }
            None => Vec::new(),
        };
        f(&mut items)?;
        let value = AttrValue::List(items);
        attr_desc.check_value(&desc.name, &value)?;
        self.write_value(desc, attr_desc, handle, value)
    }

    /// Appends an element.
    pub fn list_v_push(&self, handle: Handle, id: AttrId, value: impl Into<AttrValue>) -> StoreResult<()> {
        let value = value.into();
        self.list_modify(handle, id, |items| {
            items.push(value);
            Ok(())
        })
    }

    /// Inserts an element at `index` (at most the current length).
    pub fn list_v_insert(
        &self,
        handle: Handle,
        id: AttrId,
        index: usize,
        value: impl Into<AttrValue>,
    ) -> StoreResult<()> {
        let value = value.into();
        self.list_modify(handle, id, |items| {
            if index > items.len() {
                return Err(StoreError::invalid_attribute(format!(
                    "list index {} beyond length {}",
                    index,
                    items.len()
                )));
            }
            items.insert(index, value);
            Ok(())
        })
    }

    /// Removes the first element equal to `value`.
    pub fn list_v_del(&self, handle: Handle, id: AttrId, value: impl Into<AttrValue>) -> StoreResult<()> {
        let value = value.into();
        self.list_modify(handle, id, |items| {
            let pos = items
                .iter()
                .position(|v| *v == value)
                .ok_or_else(|| StoreError::not_found(format!("list element {}", value)))?;
            items.remove(pos);
            Ok(())
        })
    }

    pub fn list_clear(&self, handle: Handle, id: AttrId) -> StoreResult<()> {
        self.list_modify(handle, id, |items| {
            items.clear();
            Ok(())
        })
    }

    pub fn list_v_get(&self, handle: Handle, id: AttrId, index: usize) -> StoreResult<AttrValue> {
        let desc = self.schema.get(handle.object_type())?;
        list_attr(desc, id)?;
        let state = self.state.read();
        match state.attrs(handle)?.get(id) {
            Some(AttrValue::List(items)) => items.get(index).cloned().ok_or_else(|| {
                StoreError::not_found(format!("{} attribute {} index {}", handle, id, index))
            }),
            _ => Err(StoreError::not_found(format!(
                "{} attribute {} index {}",
                handle, id, index
            ))),
        }
    }

    pub fn list_len(&self, handle: Handle, id: AttrId) -> StoreResult<usize> {
        let desc = self.schema.get(handle.object_type())?;
        list_attr(desc, id)?;
        let state = self.state.read();
        Ok(match state.attrs(handle)?.get(id) {
            Some(AttrValue::List(items)) => items.len(),
            _ => 0,
        })
    }

    // ---- lookup ----

    pub fn object_exists(&self, handle: Handle) -> bool {
        self.state.read().exists(handle)
    }

    pub fn object_get_by_id(&self, object_type: ObjectType, id: u64) -> StoreResult<Handle> {
        let handle = handle_for_id(object_type, id)?;
        if self.state.read().table(object_type)?.contains(id) {
            Ok(handle)
        } else {
            Err(StoreError::not_found(handle.to_string()))
        }
    }

    /// Finds the instance whose key attributes equal the given ones.
    ///
    /// Every supplied attribute must be a key attribute. Supplying a
    /// subset of the key matches the first instance (ascending id) that
    /// agrees on that subset.
    pub fn object_id_get_wkey(
        &self,
        object_type: ObjectType,
        key_attrs: &AttributeSet,
    ) -> StoreResult<Handle> {
        let desc = self.schema.get(object_type)?;
        if key_attrs.is_empty() {
            return Err(StoreError::invalid_attribute(format!(
                "{}: key lookup needs at least one key attribute",
                desc.name
            )));
        }
        for (id, value) in key_attrs.iter() {
            let a = desc.require_attr(id)?;
            if !a.is_key {
                return Err(StoreError::invalid_attribute(format!(
                    "{}.{} is not a key attribute",
                    desc.name, a.name
                )));
            }
            a.check_value(&desc.name, value)?;
        }
        let probe: Vec<_> = key_attrs.iter().map(|(id, v)| (id, Some(v))).collect();
        self.state
            .read()
            .find_by_key(desc, &probe, None)
            .ok_or_else(|| StoreError::not_found(format!("{} with given key", desc.name)))
    }

    /// The live instance the given attributes would collide with on
    /// create, if any. Absent key attributes take their default.
    pub fn check_for_existing(
        &self,
        object_type: ObjectType,
        attrs: &AttributeSet,
    ) -> StoreResult<Option<Handle>> {
        let desc = self.schema.get(object_type)?;
        let mut filled = attrs.clone();
        for a in desc.key_attrs() {
            if filled.contains(a.id) {
                continue;
            }
            if let Some(default) = &a.default {
                filled.set(a.id, default.clone());
            }
        }
        Ok(find_key_conflict(&self.state.read(), desc, &filled, None))
    }

    /// Runs create validation without changing anything.
    pub fn validate_attrs(&self, object_type: ObjectType, attrs: &AttributeSet) -> StoreResult<()> {
        let desc = self.schema.get(object_type)?;
        let attrs = prepare_attrs(desc, attrs.clone())?;
        let state = self.state.read();
        state.check_refs_live(&desc.name, &attrs.handle_edges())?;
        if let Some(existing) = find_key_conflict(&state, desc, &attrs, None) {
            return Err(StoreError::key_conflict(format!(
                "{} key already used by {}",
                desc.name, existing
            )));
        }
        Ok(())
    }

    // ---- iteration ----

    pub fn object_get_first_handle(&self, object_type: ObjectType) -> StoreResult<Option<Handle>> {
        Ok(self
            .state
            .read()
            .table(object_type)?
            .first_id()
            .map(|id| Handle::new(object_type, id)))
    }

    /// Up to `n` live handles of the cursor's type with ids above the
    /// cursor's. The cursor need not be live.
    pub fn object_get_next_handles(&self, cursor: Handle, n: usize) -> StoreResult<Vec<Handle>> {
        let object_type = cursor.object_type();
        Ok(self
            .state
            .read()
            .table(object_type)?
            .ids_after(cursor.id(), n)
            .into_iter()
            .map(|id| Handle::new(object_type, id))
            .collect())
    }

    pub fn object_get_all_handles(&self, object_type: ObjectType) -> StoreResult<Vec<Handle>> {
        Ok(self
            .state
            .read()
            .table(object_type)?
            .iter()
            .map(|(id, _)| Handle::new(object_type, id))
            .collect())
    }

    /// Iterates every live handle of a type, fetching `batch_size` at a
    /// time. No lock is held between batches.
    pub fn scan_handles(&self, object_type: ObjectType, batch_size: usize) -> HandleScan<'_> {
        HandleScan {
            store: self,
            cursor: Handle::new(object_type, 0),
            batch: Vec::new(),
            batch_size: batch_size.max(1),
            done: false,
        }
    }

    /// [`scan_handles`](Self::scan_handles) with the configured batch
    /// size.
    pub fn object_scan(&self, object_type: ObjectType) -> HandleScan<'_> {
        self.scan_handles(object_type, self.context.scan_batch())
    }

    pub fn scan_batch_size(&self) -> usize {
        self.context.scan_batch()
    }

    /// Sets the batch size [`object_scan`](Self::object_scan) uses. Zero is
    /// raised to one.
    pub fn set_scan_batch_size(&self, size: usize) {
        self.context.set_scan_batch(size);
    }

    pub fn object_count(&self, object_type: ObjectType) -> StoreResult<usize> {
        Ok(self.state.read().table(object_type)?.len())
    }

    pub(crate) fn object_count_total(&self) -> usize {
        self.state.read().tables.values().map(ObjectTable::len).sum()
    }
}

/// Batched forward scan returned by [`SwitchStore::scan_handles`].
pub struct HandleScan<'a> {
    store: &'a SwitchStore,
    cursor: Handle,
    batch: Vec<Handle>,
    batch_size: usize,
    done: bool,
}

impl Iterator for HandleScan<'_> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        if self.batch.is_empty() && !self.done {
            match self.store.object_get_next_handles(self.cursor, self.batch_size) {
                Ok(mut batch) if !batch.is_empty() => {
                    batch.reverse();
                    self.batch = batch;
                }
                _ => self.done = true,
            }
        }
        let next = self.batch.pop()?;
        self.cursor = next;
        Some(next)
    }
}

/// Checks every supplied attribute, then applies mandatory and default
/// rules.
fn prepare_attrs(desc: &TypeDescriptor, mut attrs: AttributeSet) -> StoreResult<AttributeSet> {
    for (id, value) in attrs.iter() {
        desc.require_attr(id)?.check_value(&desc.name, value)?;
    }
    if let Some(a) = desc.mandatory_attrs().find(|a| !attrs.contains(a.id)) {
        return Err(StoreError::invalid_attribute(format!(
            "{}: mandatory attribute {} missing",
            desc.name, a.name
        )));
    }
    for a in &desc.attrs {
        if attrs.contains(a.id) {
            continue;
        }
        if let Some(default) = &a.default {
            attrs.set(a.id, default.clone());
        }
    }
    Ok(attrs)
}

/// Fails with `InUse` if a member of `subtree` is referenced from outside
/// it.
fn check_unreferenced(state: &StoreState, subtree: &[Handle]) -> StoreResult<()> {
    let members: BTreeSet<Handle> = subtree.iter().copied().collect();
    for node in subtree {
        if let Some(r) = state
            .refs
            .refs_to(*node)
            .iter()
            .find(|r| !members.contains(&r.src))
        {
            return Err(StoreError::in_use(format!(
                "{} referenced by {} attribute {}",
                node, r.src, r.attr_id
            )));
        }
    }
    Ok(())
}

/// Handle for a caller-supplied id. Ids outside the 48-bit range name no
/// object.
fn handle_for_id(object_type: ObjectType, id: u64) -> StoreResult<Handle> {
    if !object_id_in_range(id) {
        return Err(StoreError::not_found(format!(
            "type {} id {:#x} out of range",
            object_type, id
        )));
    }
    Ok(Handle::new(object_type, id))
}

fn find_key_conflict(
    state: &StoreState,
    desc: &TypeDescriptor,
    attrs: &AttributeSet,
    exclude: Option<Handle>,
) -> Option<Handle> {
    if !desc.has_keys() {
        return None;
    }
    let probe: Vec<_> = desc.key_attrs().map(|a| (a.id, attrs.get(a.id))).collect();
    state.find_by_key(desc, &probe, exclude)
}

fn check_settable<'d>(desc: &'d TypeDescriptor, attr: &Attribute) -> StoreResult<&'d AttrDescriptor> {
    let a = desc.require_attr(attr.id)?;
    if a.is_create_only {
        return Err(StoreError::read_only(format!("{}.{}", desc.name, a.name)));
    }
    a.check_value(&desc.name, &attr.value)?;
    Ok(a)
}

fn list_attr(desc: &TypeDescriptor, id: AttrId) -> StoreResult<&AttrDescriptor> {
    let a = desc.require_attr(id)?;
    if !a.kind.is_list() {
        return Err(StoreError::invalid_attribute(format!(
            "{}.{} is not a list",
            desc.name, a.name
        )));
    }
    Ok(a)
}
