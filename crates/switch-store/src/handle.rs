//! Object handle codec.
//!
//! A handle packs the object type into the upper 16 bits and the
//! type-local id into the lower 48 bits of a `u64`. Handle `0` is the null
//! handle. Every other store component addresses objects through these
//! functions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits reserved for the type-local id.
pub const OBJECT_ID_WIDTH: u32 = 48;

/// Largest representable type-local id.
pub const MAX_OBJECT_ID: u64 = (1u64 << OBJECT_ID_WIDTH) - 1;

/// Numeric object type id as declared in the schema. `0` is never a valid
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectType(pub u16);

impl ObjectType {
    pub const NONE: ObjectType = ObjectType(0);

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A packed `{type, local_id}` object handle.
///
/// ```
/// use switch_store::{Handle, ObjectType};
///
/// let h = Handle::new(ObjectType(3), 17);
/// assert_eq!(h.object_type(), ObjectType(3));
/// assert_eq!(h.id(), 17);
/// assert_eq!(h.to_string(), "0x0003000000000011");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    /// Encodes a handle. Ids wider than [`OBJECT_ID_WIDTH`] are truncated;
    /// callers validate with [`object_id_in_range`] first.
    pub const fn new(object_type: ObjectType, id: u64) -> Self {
        Handle(((object_type.0 as u64) << OBJECT_ID_WIDTH) | (id & MAX_OBJECT_ID))
    }

    pub const fn object_type(&self) -> ObjectType {
        ObjectType((self.0 >> OBJECT_ID_WIDTH) as u16)
    }

    pub const fn id(&self) -> u64 {
        self.0 & MAX_OBJECT_ID
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(type={}, id={})", self.object_type(), self.id())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// `(type << 48) | id`.
pub const fn id_to_handle(object_type: ObjectType, id: u64) -> Handle {
    Handle::new(object_type, id)
}

pub const fn handle_to_id(handle: Handle) -> u64 {
    handle.id()
}

pub const fn object_type_query(handle: Handle) -> ObjectType {
    handle.object_type()
}

/// Structural validity: non-null, non-zero type and non-zero id. Schema
/// membership of the type is checked by
/// [`SchemaRegistry::handle_valid`](crate::SchemaRegistry::handle_valid).
pub const fn object_handle_valid(handle: Handle) -> bool {
    handle.object_type().0 != 0 && handle.id() != 0
}

pub const fn object_id_in_range(id: u64) -> bool {
    id != 0 && id <= MAX_OBJECT_ID
}
