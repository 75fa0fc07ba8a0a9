//! Per-type trigger hooks.
//!
//! Hardware adapters register hooks against an object type. The store
//! fires them around mutations:
//!
//! | event           | may veto | may rewrite          |
//! |-----------------|----------|----------------------|
//! | create before   | yes      | the attribute set    |
//! | create after    | no       |                      |
//! | delete before   | yes      |                      |
//! | delete after    | no       |                      |
//! | update before   | yes      | the new attribute    |
//! | update after    | no       |                      |
//!
//! Errors from "after" hooks are logged and otherwise ignored; the store
//! change stays committed. Hooks run in registration order and are called
//! with the coarse store lock held but no internal state lock, so they may
//! call back into the store.
//!
//! Registering the same `Arc` twice for the same event and type is a
//! no-op.

use crate::attribute::{Attribute, AttributeSet};
use crate::counters::Counter;
use crate::error::StoreResult;
use crate::handle::{Handle, ObjectType};
use crate::store::SwitchStore;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

pub type CreateBeforeHook =
    Arc<dyn Fn(&SwitchStore, ObjectType, &mut AttributeSet) -> StoreResult<()> + Send + Sync>;
pub type CreateAfterHook =
    Arc<dyn Fn(&SwitchStore, Handle, &AttributeSet) -> StoreResult<()> + Send + Sync>;
/// Delete hooks, before and after.
pub type DeleteHook = Arc<dyn Fn(&SwitchStore, Handle) -> StoreResult<()> + Send + Sync>;
pub type UpdateBeforeHook =
    Arc<dyn Fn(&SwitchStore, Handle, &mut Attribute) -> StoreResult<()> + Send + Sync>;
pub type UpdateAfterHook =
    Arc<dyn Fn(&SwitchStore, Handle, &Attribute) -> StoreResult<()> + Send + Sync>;
/// Appends the object's current counter values.
pub type CounterGetHook =
    Arc<dyn Fn(&SwitchStore, Handle, &mut Vec<Counter>) -> StoreResult<()> + Send + Sync>;
/// Writes the given counter values to hardware.
pub type CountersSetHook =
    Arc<dyn Fn(&SwitchStore, Handle, &[Counter]) -> StoreResult<()> + Send + Sync>;
/// Clears every counter of the object.
pub type AllCountersSetHook = Arc<dyn Fn(&SwitchStore, Handle) -> StoreResult<()> + Send + Sync>;
/// Returns true to skip creating the given auto type for a parent.
pub type SkipAutoObjectHook = Arc<dyn Fn(&SwitchStore, Handle, ObjectType) -> bool + Send + Sync>;
pub type DebugCliHook = Arc<dyn Fn(&SwitchStore, &mut dyn io::Write) -> io::Result<()> + Send + Sync>;

#[derive(Default, Clone)]
struct TypeTriggers {
    create_before: Vec<CreateBeforeHook>,
    create_after: Vec<CreateAfterHook>,
    delete_before: Vec<DeleteHook>,
    delete_after: Vec<DeleteHook>,
    update_before: Vec<UpdateBeforeHook>,
    update_after: Vec<UpdateAfterHook>,
    counter_get: Vec<CounterGetHook>,
    counters_set: Vec<CountersSetHook>,
    all_counters_set: Vec<AllCountersSetHook>,
    skip_auto_object: Vec<SkipAutoObjectHook>,
}

fn push_unique<T: ?Sized>(list: &mut Vec<Arc<T>>, hook: Arc<T>) -> bool {
    if list.iter().any(|h| Arc::ptr_eq(h, &hook)) {
        return false;
    }
    list.push(hook);
    true
}

/// Hook storage. Firing clones the hook list out first, so registration
/// from inside a hook does not deadlock.
#[derive(Default)]
pub(crate) struct TriggerRegistry {
    by_type: RwLock<HashMap<ObjectType, TypeTriggers>>,
    debug_cli: RwLock<Vec<(String, DebugCliHook)>>,
}

macro_rules! hook_accessors {
    ($(($field:ident, $ty:ty)),* $(,)?) => {
        impl TriggerRegistry {
            $(
                pub(crate) fn $field(&self, object_type: ObjectType) -> Vec<$ty> {
                    self.by_type
                        .read()
                        .get(&object_type)
                        .map(|t| t.$field.clone())
                        .unwrap_or_default()
                }
            )*
        }
    };
}

hook_accessors!(
    (create_before, CreateBeforeHook),
    (create_after, CreateAfterHook),
    (delete_before, DeleteHook),
    (delete_after, DeleteHook),
    (update_before, UpdateBeforeHook),
    (update_after, UpdateAfterHook),
    (counter_get, CounterGetHook),
    (counters_set, CountersSetHook),
    (all_counters_set, AllCountersSetHook),
    (skip_auto_object, SkipAutoObjectHook),
);

impl TriggerRegistry {
    fn with_type<R>(&self, object_type: ObjectType, f: impl FnOnce(&mut TypeTriggers) -> R) -> R {
        let mut by_type = self.by_type.write();
        f(by_type.entry(object_type).or_default())
    }

    pub(crate) fn has_counter_get(&self, object_type: ObjectType) -> bool {
        self.by_type
            .read()
            .get(&object_type)
            .is_some_and(|t| !t.counter_get.is_empty())
    }

    /// Types that have at least one counter_get hook.
    pub(crate) fn counter_types(&self) -> Vec<ObjectType> {
        let mut types: Vec<_> = self
            .by_type
            .read()
            .iter()
            .filter(|(_, t)| !t.counter_get.is_empty())
            .map(|(ot, _)| *ot)
            .collect();
        types.sort();
        types
    }

    pub(crate) fn debug_cli(&self) -> Vec<(String, DebugCliHook)> {
        self.debug_cli.read().clone()
    }
}

impl SwitchStore {
    /// Registers a hook run before an object of `object_type` is created.
    /// The hook may rewrite the attribute set or veto with an error.
    pub fn reg_create_trigs_before(&self, object_type: ObjectType, hook: CreateBeforeHook) {
        let added = self
            .triggers
            .with_type(object_type, |t| push_unique(&mut t.create_before, hook));
        debug!("create_before trigger for type {} registered={}", object_type, added);
    }

    pub fn reg_create_trigs_after(&self, object_type: ObjectType, hook: CreateAfterHook) {
        let added = self
            .triggers
            .with_type(object_type, |t| push_unique(&mut t.create_after, hook));
        debug!("create_after trigger for type {} registered={}", object_type, added);
    }

    pub fn reg_delete_trigs_before(&self, object_type: ObjectType, hook: DeleteHook) {
        let added = self
            .triggers
            .with_type(object_type, |t| push_unique(&mut t.delete_before, hook));
        debug!("delete_before trigger for type {} registered={}", object_type, added);
    }

    pub fn reg_delete_trigs_after(&self, object_type: ObjectType, hook: DeleteHook) {
        let added = self
            .triggers
            .with_type(object_type, |t| push_unique(&mut t.delete_after, hook));
        debug!("delete_after trigger for type {} registered={}", object_type, added);
    }

    pub fn reg_update_trigs_before(&self, object_type: ObjectType, hook: UpdateBeforeHook) {
        let added = self
            .triggers
            .with_type(object_type, |t| push_unique(&mut t.update_before, hook));
        debug!("update_before trigger for type {} registered={}", object_type, added);
    }

    pub fn reg_update_trigs_after(&self, object_type: ObjectType, hook: UpdateAfterHook) {
        let added = self
            .triggers
            .with_type(object_type, |t| push_unique(&mut t.update_after, hook));
        debug!("update_after trigger for type {} registered={}", object_type, added);
    }

    pub fn reg_counter_get_trigs(&self, object_type: ObjectType, hook: CounterGetHook) {
        self.triggers
            .with_type(object_type, |t| push_unique(&mut t.counter_get, hook));
    }

    pub fn reg_counters_set_trigs(&self, object_type: ObjectType, hook: CountersSetHook) {
        self.triggers
            .with_type(object_type, |t| push_unique(&mut t.counters_set, hook));
    }

    pub fn reg_all_counters_set_trigs(&self, object_type: ObjectType, hook: AllCountersSetHook) {
        self.triggers
            .with_type(object_type, |t| push_unique(&mut t.all_counters_set, hook));
    }

    /// Registers a predicate consulted before each auto-object of a
    /// `parent_type` instance is created.
    pub fn reg_skip_auto_object_trigs(&self, parent_type: ObjectType, hook: SkipAutoObjectHook) {
        self.triggers
            .with_type(parent_type, |t| push_unique(&mut t.skip_auto_object, hook));
    }

    /// Registers a named section for [`debug_cli_dump`](Self::debug_cli_dump).
    /// A second registration under the same name replaces the first.
    pub fn reg_debug_cli_callback(&self, name: &str, hook: DebugCliHook) {
        let mut cli = self.triggers.debug_cli.write();
        match cli.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = hook,
            None => cli.push((name.to_string(), hook)),
        }
    }

    /// Writes every registered debug section to `out`.
    pub fn debug_cli_dump(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for (name, hook) in self.triggers.debug_cli() {
            writeln!(out, "== {} ==", name)?;
            hook(self, out)?;
        }
        Ok(())
    }

    pub(crate) fn skip_auto_object(&self, parent: Handle, auto_type: ObjectType) -> bool {
        self.triggers
            .skip_auto_object(parent.object_type())
            .iter()
            .any(|hook| hook(self, parent, auto_type))
    }
}
