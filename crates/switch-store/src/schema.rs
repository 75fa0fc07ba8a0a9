//! Schema registry: per-type metadata loaded once at init.
//!
//! The schema file is JSON:
//!
//! ```json
//! {
//!   "version": "1.2",
//!   "objects": [
//!     { "id": 1, "name": "vrf",
//!       "attributes": [ { "id": 1, "name": "vrf_id", "type": "u32", "key": true, "mandatory": true } ] },
//!     { "id": 2, "name": "route", "max_objects": 65536,
//!       "attributes": [
//!         { "id": 1, "name": "vrf", "type": "handle", "allowed_types": ["vrf"], "key": true, "mandatory": true },
//!         { "id": 2, "name": "prefix", "type": "prefix", "key": true, "mandatory": true },
//!         { "id": 3, "name": "nexthop", "type": "handle", "allowed_types": ["nexthop", "rif"] } ] }
//!   ]
//! }
//! ```
//!
//! Type and attribute references are by name in the file and resolved to
//! numeric ids at load time. Once built, a [`SchemaRegistry`] is immutable
//! and shared behind an `Arc`.

use crate::attribute::{AttrId, AttrKind, AttrValue, ValueKind};
use crate::error::{StoreError, StoreResult};
use crate::handle::{object_handle_valid, Handle, ObjectType, MAX_OBJECT_ID};
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawSchema {
    version: String,
    objects: Vec<RawType>,
}

#[derive(Debug, Deserialize)]
struct RawType {
    id: u16,
    name: String,
    #[serde(default)]
    max_objects: Option<u64>,
    #[serde(default)]
    attributes: Vec<RawAttr>,
    #[serde(default)]
    auto_objects: Vec<String>,
    #[serde(default)]
    counters: Vec<CounterDescriptor>,
}

#[derive(Debug, Deserialize)]
struct RawAttr {
    id: AttrId,
    name: String,
    #[serde(rename = "type")]
    kind: AttrKind,
    #[serde(default)]
    default: Option<AttrValue>,
    #[serde(default)]
    key: bool,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    create_only: bool,
    #[serde(default)]
    counter: bool,
    #[serde(default)]
    parent: bool,
    #[serde(default)]
    allowed_types: Vec<String>,
    #[serde(default)]
    enum_values: Vec<u64>,
}

/// One counter a type exposes (e.g. `rx_packets`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CounterDescriptor {
    pub id: u16,
    pub name: String,
}

/// Metadata for one attribute of one object type.
#[derive(Debug, Clone)]
pub struct AttrDescriptor {
    pub id: AttrId,
    pub name: String,
    pub kind: AttrKind,
    pub default: Option<AttrValue>,
    pub is_key: bool,
    pub is_mandatory: bool,
    pub is_create_only: bool,
    /// Handle attribute pointing at the object that owns this object's
    /// counters.
    pub is_counter: bool,
    /// Handle attribute an auto-object uses to point at its parent.
    pub is_parent: bool,
    /// Types a handle attribute may reference. Empty means any type.
    pub allowed_types: Vec<ObjectType>,
    /// Permitted values of an enum attribute. Empty means unrestricted.
    pub enum_values: Vec<u64>,
}

impl AttrDescriptor {
    /// Checks kind, enum membership and referenced handle types. Liveness
    /// of referenced objects is the store's concern.
    pub fn check_value(&self, type_name: &str, value: &AttrValue) -> StoreResult<()> {
        if !value.matches(&self.kind) {
            return Err(StoreError::invalid_attribute(format!(
                "{}.{}: expected {}, got {}",
                type_name,
                self.name,
                self.kind,
                value.kind_name()
            )));
        }

        if self.kind.element() == ValueKind::Enum && !self.enum_values.is_empty() {
            let values = match value {
                AttrValue::List(items) => items.clone(),
                other => vec![other.clone()],
            };
            for v in values {
                if let AttrValue::Enum(e) = v {
                    if !self.enum_values.contains(&e) {
                        return Err(StoreError::invalid_attribute(format!(
                            "{}.{}: enum value {} not permitted",
                            type_name, self.name, e
                        )));
                    }
                }
            }
        }

        if self.kind.holds_handles() && !self.allowed_types.is_empty() {
            for h in value.handles() {
                if !self.allowed_types.contains(&h.object_type()) {
                    return Err(StoreError::invalid_attribute(format!(
                        "{}.{}: handle {} has type {} which is not permitted",
                        type_name,
                        self.name,
                        h,
                        h.object_type()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Immutable metadata for one object type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub object_type: ObjectType,
    pub name: String,
    /// Attribute descriptors in declaration order.
    pub attrs: Vec<AttrDescriptor>,
    attr_index: HashMap<AttrId, usize>,
    /// Types auto-created with each instance, in creation order.
    pub auto_objects: Vec<ObjectType>,
    pub max_objects: u64,
    pub counters: Vec<CounterDescriptor>,
}

impl TypeDescriptor {
    pub fn attr(&self, id: AttrId) -> Option<&AttrDescriptor> {
        self.attr_index.get(&id).map(|i| &self.attrs[*i])
    }

    /// Like [`attr`](Self::attr) but fails with `InvalidAttribute`.
    pub fn require_attr(&self, id: AttrId) -> StoreResult<&AttrDescriptor> {
        self.attr(id).ok_or_else(|| {
            StoreError::invalid_attribute(format!("{}: unknown attribute id {}", self.name, id))
        })
    }

    pub fn key_attrs(&self) -> impl Iterator<Item = &AttrDescriptor> {
        self.attrs.iter().filter(|a| a.is_key)
    }

    pub fn has_keys(&self) -> bool {
        self.attrs.iter().any(|a| a.is_key)
    }

    pub fn mandatory_attrs(&self) -> impl Iterator<Item = &AttrDescriptor> {
        self.attrs.iter().filter(|a| a.is_mandatory)
    }

    /// The attribute an auto-object stores its parent handle in.
    pub fn parent_attr(&self) -> Option<&AttrDescriptor> {
        self.attrs.iter().find(|a| a.is_parent)
    }

    pub fn counter_attr(&self) -> Option<&AttrDescriptor> {
        self.attrs.iter().find(|a| a.is_counter)
    }

    pub fn counter(&self, id: u16) -> Option<&CounterDescriptor> {
        self.counters.iter().find(|c| c.id == id)
    }
}

/// The loaded schema.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: String,
    types: BTreeMap<ObjectType, TypeDescriptor>,
    by_name: HashMap<String, ObjectType>,
}

impl SchemaRegistry {
    /// Loads and validates a schema file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read schema {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> StoreResult<Self> {
        let raw: RawSchema = serde_json::from_str(content)?;
        Self::build(raw)
    }

    fn build(raw: RawSchema) -> StoreResult<Self> {
        let mut by_name = HashMap::new();
        for t in &raw.objects {
            if t.id == 0 {
                return Err(StoreError::Config(format!("type '{}' uses reserved id 0", t.name)));
            }
            if by_name.insert(t.name.clone(), ObjectType(t.id)).is_some() {
                return Err(StoreError::Config(format!("duplicate type name '{}'", t.name)));
            }
        }

        let resolve = |name: &str, ctx: &str| -> StoreResult<ObjectType> {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| StoreError::Config(format!("{}: unknown type '{}'", ctx, name)))
        };

        let mut types = BTreeMap::new();
        for t in raw.objects {
            let mut attrs = Vec::with_capacity(t.attributes.len());
            let mut attr_index = HashMap::new();
            for a in t.attributes {
                let ctx = format!("{}.{}", t.name, a.name);
                if attr_index.insert(a.id, attrs.len()).is_some() {
                    return Err(StoreError::Config(format!("{}: duplicate attribute id {}", ctx, a.id)));
                }
                let allowed_types = a
                    .allowed_types
                    .iter()
                    .map(|n| resolve(n, &ctx))
                    .collect::<StoreResult<Vec<_>>>()?;
                if (a.parent || a.counter) && a.kind != AttrKind::Scalar(ValueKind::Handle) {
                    return Err(StoreError::Config(format!(
                        "{}: parent/counter attributes must be handles",
                        ctx
                    )));
                }
                let desc = AttrDescriptor {
                    id: a.id,
                    name: a.name,
                    kind: a.kind,
                    default: a.default,
                    is_key: a.key,
                    is_mandatory: a.mandatory,
                    is_create_only: a.create_only,
                    is_counter: a.counter,
                    is_parent: a.parent,
                    allowed_types,
                    enum_values: a.enum_values,
                };
                if let Some(default) = &desc.default {
                    desc.check_value(&t.name, default)
                        .map_err(|e| StoreError::Config(format!("{}: bad default: {}", ctx, e)))?;
                }
                attrs.push(desc);
            }

            let mut auto_objects = Vec::new();
            for name in &t.auto_objects {
                let ot = resolve(name, &t.name)?;
                if auto_objects.contains(&ot) {
                    return Err(StoreError::Config(format!(
                        "{}: auto object '{}' listed twice",
                        t.name, name
                    )));
                }
                auto_objects.push(ot);
            }

            let max_objects = t.max_objects.unwrap_or(MAX_OBJECT_ID).min(MAX_OBJECT_ID);
            let ot = ObjectType(t.id);
            if types.contains_key(&ot) {
                return Err(StoreError::Config(format!("duplicate type id {}", t.id)));
            }
            types.insert(
                ot,
                TypeDescriptor {
                    object_type: ot,
                    name: t.name,
                    attrs,
                    attr_index,
                    auto_objects,
                    max_objects,
                    counters: t.counters,
                },
            );
        }

        let registry = SchemaRegistry {
            version: raw.version,
            types,
            by_name,
        };
        registry.check_auto_objects()?;
        debug!(
            "Loaded schema version {} with {} object types",
            registry.version,
            registry.types.len()
        );
        Ok(registry)
    }

    /// Every auto type needs a parent attribute accepting its parent, and
    /// the auto relation must be acyclic.
    fn check_auto_objects(&self) -> StoreResult<()> {
        for parent in self.types.values() {
            for auto in &parent.auto_objects {
                let child = self.get(*auto)?;
                let parent_attr = child.parent_attr().ok_or_else(|| {
                    StoreError::Config(format!(
                        "auto object '{}' of '{}' has no parent attribute",
                        child.name, parent.name
                    ))
                })?;
                if !parent_attr.allowed_types.is_empty()
                    && !parent_attr.allowed_types.contains(&parent.object_type)
                {
                    return Err(StoreError::Config(format!(
                        "{}.{} does not accept parent type '{}'",
                        child.name, parent_attr.name, parent.name
                    )));
                }
            }
        }

        for root in self.types.keys() {
            let mut stack = vec![(*root, 0usize)];
            while let Some((ot, depth)) = stack.pop() {
                if depth > self.types.len() {
                    return Err(StoreError::Config(format!(
                        "auto object cycle reachable from type {}",
                        root
                    )));
                }
                for auto in &self.get(ot)?.auto_objects {
                    stack.push((*auto, depth + 1));
                }
            }
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, object_type: ObjectType) -> StoreResult<&TypeDescriptor> {
        self.types
            .get(&object_type)
            .ok_or_else(|| StoreError::invalid_attribute(format!("unknown object type {}", object_type)))
    }

    pub fn contains(&self, object_type: ObjectType) -> bool {
        self.types.contains_key(&object_type)
    }

    pub fn type_by_name(&self, name: &str) -> Option<ObjectType> {
        self.by_name.get(name).copied()
    }

    pub fn type_name(&self, object_type: ObjectType) -> &str {
        self.types
            .get(&object_type)
            .map(|t| t.name.as_str())
            .unwrap_or("unknown")
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Structural validity plus schema membership of the handle's type.
    pub fn handle_valid(&self, handle: Handle) -> bool {
        object_handle_valid(handle) && self.contains(handle.object_type())
    }
}
