//! In-memory object store for a programmable switch control plane.
//!
//! Protocol adapters (routing, FDB, ACL, ...) keep the device's logical
//! state here as typed objects addressed by 64-bit handles. The store
//! validates every object against a schema loaded at init, tracks which
//! objects reference which, lets adapters hook into each other's object
//! lifecycle, and survives a control-plane restart by dumping and replaying
//! its contents with handles preserved.
//!
//! # Architecture
//!
//! - [`handle`]: `{type, id}` handle codec
//! - [`schema`]: per-type metadata loaded from JSON
//! - [`attribute`]: typed attribute values and sets
//! - [`store`]: CRUD, key lookup, list attributes and iteration
//! - [`refs`]: reverse reference index
//! - [`triggers`]: before/after hooks per object type
//! - [`lock`]: coarse batch lock and per-object advisory locks
//! - [`counters`]: counter delegation and the warm-restart stats cache
//! - [`persist`]: warm-boot dump/replay and the diagnostic dump
//! - [`config`]: TOML configuration
//!
//! # Example
//!
//! ```
//! use switch_store::{AttributeSet, ObjectType, SchemaRegistry, SwitchStore};
//!
//! let schema = SchemaRegistry::from_json_str(r#"{
//!     "version": "1.0",
//!     "objects": [
//!         { "id": 1, "name": "vlan",
//!           "attributes": [ { "id": 1, "name": "vlan_id", "type": "u16", "key": true, "mandatory": true } ] }
//!     ]
//! }"#).unwrap();
//! let store = SwitchStore::new(schema);
//!
//! let vlan = store.object_create(ObjectType(1), AttributeSet::new().with(1, 100u16)).unwrap();
//! let found = store
//!     .object_id_get_wkey(ObjectType(1), &AttributeSet::new().with(1, 100u16))
//!     .unwrap();
//! assert_eq!(vlan, found);
//! ```

pub mod attribute;
pub mod config;
pub mod counters;
pub mod error;
pub mod handle;
pub mod lock;
pub mod persist;
pub mod refs;
pub mod schema;
pub mod store;
mod table;
pub mod triggers;

pub use attribute::{AttrId, AttrKind, AttrValue, Attribute, AttributeSet, FromAttrValue, Range, ValueKind};
pub use config::StoreConfig;
pub use counters::Counter;
pub use error::{status_of, StoreError, StoreResult, SwitchStatus};
pub use handle::{
    handle_to_id, id_to_handle, object_handle_valid, object_id_in_range, object_type_query, Handle,
    ObjectType, MAX_OBJECT_ID, OBJECT_ID_WIDTH,
};
pub use lock::{StoreLockGuard, DEFAULT_SCAN_BATCH};
pub use persist::{DumpSummary, DUMP_FORMAT_VERSION};
pub use refs::ObjectRef;
pub use schema::{AttrDescriptor, CounterDescriptor, SchemaRegistry, TypeDescriptor};
pub use store::{HandleScan, SwitchStore};
pub use switch_types::{IpAddress, IpPrefix, MacAddress};
