//! Typed attribute values and attribute sets.
//!
//! An [`AttrValue`] is a runtime-tagged value of one of the fixed kinds the
//! schema can declare. Typed access goes through one generic accessor,
//! [`AttrValue::get`], which fails with
//! [`StoreError::TypeMismatch`](crate::StoreError::TypeMismatch) when the
//! stored kind differs from the requested Rust type.

use crate::error::{StoreError, StoreResult};
use crate::handle::Handle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use switch_types::{IpAddress, IpPrefix, MacAddress};

/// Attribute id, unique within one object type.
pub type AttrId = u16;

/// Inclusive `u32` range, used by range-match attributes (ACL L4 ports,
/// VLAN ranges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: u32) -> bool {
        self.min <= v && v <= self.max
    }
}

/// Scalar value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I64,
    Enum,
    String,
    Range,
    Mac,
    Ip,
    Prefix,
    Handle,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::U8 => "u8",
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::U64 => "u64",
            ValueKind::I64 => "i64",
            ValueKind::Enum => "enum",
            ValueKind::String => "string",
            ValueKind::Range => "range",
            ValueKind::Mac => "mac",
            ValueKind::Ip => "ip",
            ValueKind::Prefix => "prefix",
            ValueKind::Handle => "handle",
        }
    }
}

impl FromStr for ValueKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bool" => ValueKind::Bool,
            "u8" => ValueKind::U8,
            "u16" => ValueKind::U16,
            "u32" => ValueKind::U32,
            "u64" => ValueKind::U64,
            "i64" => ValueKind::I64,
            "enum" => ValueKind::Enum,
            "string" => ValueKind::String,
            "range" => ValueKind::Range,
            "mac" => ValueKind::Mac,
            "ip" => ValueKind::Ip,
            "prefix" => ValueKind::Prefix,
            "handle" => ValueKind::Handle,
            other => {
                return Err(StoreError::Config(format!("unknown value kind '{}'", other)))
            }
        })
    }
}

/// Declared kind of an attribute: a scalar or an ordered list of scalars.
///
/// Schema files spell these as `"u32"` or `"list<handle>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AttrKind {
    Scalar(ValueKind),
    List(ValueKind),
}

impl AttrKind {
    pub fn element(&self) -> ValueKind {
        match self {
            AttrKind::Scalar(k) | AttrKind::List(k) => *k,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, AttrKind::List(_))
    }

    /// Whether values of this attribute can hold object handles.
    pub fn holds_handles(&self) -> bool {
        self.element() == ValueKind::Handle
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrKind::Scalar(k) => write!(f, "{}", k.name()),
            AttrKind::List(k) => write!(f, "list<{}>", k.name()),
        }
    }
}

impl FromStr for AttrKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("list<").and_then(|r| r.strip_suffix('>')) {
            Some(inner) => Ok(AttrKind::List(inner.parse()?)),
            None => Ok(AttrKind::Scalar(s.parse()?)),
        }
    }
}

impl TryFrom<String> for AttrKind {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AttrKind> for String {
    fn from(kind: AttrKind) -> String {
        kind.to_string()
    }
}

/// A runtime-tagged attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    Enum(u64),
    String(String),
    Range(Range),
    Mac(MacAddress),
    Ip(IpAddress),
    Prefix(IpPrefix),
    Handle(Handle),
    List(Vec<AttrValue>),
}

impl AttrValue {
    /// Name of the stored kind, as used in schema files.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::List(_) => "list",
            other => other.scalar_kind().map(|k| k.name()).unwrap_or("list"),
        }
    }

    fn scalar_kind(&self) -> Option<ValueKind> {
        Some(match self {
            AttrValue::Bool(_) => ValueKind::Bool,
            AttrValue::U8(_) => ValueKind::U8,
            AttrValue::U16(_) => ValueKind::U16,
            AttrValue::U32(_) => ValueKind::U32,
            AttrValue::U64(_) => ValueKind::U64,
            AttrValue::I64(_) => ValueKind::I64,
            AttrValue::Enum(_) => ValueKind::Enum,
            AttrValue::String(_) => ValueKind::String,
            AttrValue::Range(_) => ValueKind::Range,
            AttrValue::Mac(_) => ValueKind::Mac,
            AttrValue::Ip(_) => ValueKind::Ip,
            AttrValue::Prefix(_) => ValueKind::Prefix,
            AttrValue::Handle(_) => ValueKind::Handle,
            AttrValue::List(_) => return None,
        })
    }

    /// Returns true if the value conforms to `kind`, list elements included.
    pub fn matches(&self, kind: &AttrKind) -> bool {
        match (kind, self) {
            (AttrKind::List(elem), AttrValue::List(items)) => items
                .iter()
                .all(|v| v.scalar_kind() == Some(*elem)),
            (AttrKind::Scalar(k), v) => v.scalar_kind() == Some(*k),
            _ => false,
        }
    }

    /// The zero value of a kind, used when the schema declares no default.
    pub fn zero(kind: &AttrKind) -> AttrValue {
        match kind {
            AttrKind::List(_) => AttrValue::List(Vec::new()),
            AttrKind::Scalar(k) => match k {
                ValueKind::Bool => AttrValue::Bool(false),
                ValueKind::U8 => AttrValue::U8(0),
                ValueKind::U16 => AttrValue::U16(0),
                ValueKind::U32 => AttrValue::U32(0),
                ValueKind::U64 => AttrValue::U64(0),
                ValueKind::I64 => AttrValue::I64(0),
                ValueKind::Enum => AttrValue::Enum(0),
                ValueKind::String => AttrValue::String(String::new()),
                ValueKind::Range => AttrValue::Range(Range::new(0, 0)),
                ValueKind::Mac => AttrValue::Mac(MacAddress::ZERO),
                ValueKind::Ip => AttrValue::Ip(IpAddress::V4(std::net::Ipv4Addr::UNSPECIFIED)),
                ValueKind::Prefix => AttrValue::Prefix(IpPrefix::host(IpAddress::V4(
                    std::net::Ipv4Addr::UNSPECIFIED,
                ))),
                ValueKind::Handle => AttrValue::Handle(Handle::NULL),
            },
        }
    }

    /// Non-null handles held by this value, one entry per occurrence.
    pub fn handles(&self) -> Vec<Handle> {
        match self {
            AttrValue::Handle(h) if !h.is_null() => vec![*h],
            AttrValue::List(items) => items.iter().flat_map(|v| v.handles()).collect(),
            _ => Vec::new(),
        }
    }

    /// Typed read. Fails with `TypeMismatch` when the stored kind differs.
    pub fn get<T: FromAttrValue>(&self) -> StoreResult<T> {
        T::from_attr_value(self).ok_or(StoreError::TypeMismatch {
            expected: T::KIND,
            found: self.kind_name(),
        })
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{}", v),
            AttrValue::U8(v) => write!(f, "{}", v),
            AttrValue::U16(v) => write!(f, "{}", v),
            AttrValue::U32(v) => write!(f, "{}", v),
            AttrValue::U64(v) => write!(f, "{}", v),
            AttrValue::I64(v) => write!(f, "{}", v),
            AttrValue::Enum(v) => write!(f, "enum({})", v),
            AttrValue::String(v) => write!(f, "\"{}\"", v),
            AttrValue::Range(r) => write!(f, "{}..={}", r.min, r.max),
            AttrValue::Mac(v) => write!(f, "{}", v),
            AttrValue::Ip(v) => write!(f, "{}", v),
            AttrValue::Prefix(v) => write!(f, "{}", v),
            AttrValue::Handle(h) => write!(f, "{}", h),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Conversion out of an [`AttrValue`] for the generic accessor.
pub trait FromAttrValue: Sized {
    const KIND: &'static str;

    fn from_attr_value(value: &AttrValue) -> Option<Self>;
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl FromAttrValue for $ty {
            const KIND: &'static str = $kind;

            fn from_attr_value(value: &AttrValue) -> Option<Self> {
                match value {
                    AttrValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for AttrValue {
            fn from(v: $ty) -> Self {
                AttrValue::$variant(v)
            }
        }
    };
}

scalar_value!(bool, Bool, "bool");
scalar_value!(u8, U8, "u8");
scalar_value!(u16, U16, "u16");
scalar_value!(u32, U32, "u32");
scalar_value!(u64, U64, "u64");
scalar_value!(i64, I64, "i64");
scalar_value!(String, String, "string");
scalar_value!(Range, Range, "range");
scalar_value!(MacAddress, Mac, "mac");
scalar_value!(IpAddress, Ip, "ip");
scalar_value!(IpPrefix, Prefix, "prefix");
scalar_value!(Handle, Handle, "handle");

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl<T: FromAttrValue> FromAttrValue for Vec<T> {
    const KIND: &'static str = "list";

    fn from_attr_value(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::List(items) => items.iter().map(T::from_attr_value).collect(),
            _ => None,
        }
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(items: Vec<T>) -> Self {
        AttrValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// An `(attribute id, value)` pair. Orders by id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttrId,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(id: AttrId, value: impl Into<AttrValue>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    pub fn get<T: FromAttrValue>(&self) -> StoreResult<T> {
        self.value.get()
    }
}

/// An ordered set of attributes keyed by id. Inserting an id that is
/// already present replaces its value.
///
/// Serializes as a list of [`Attribute`] in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct AttributeSet {
    attrs: BTreeMap<AttrId, AttrValue>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, id: AttrId, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(id, value.into());
        self
    }

    /// Inserts or replaces; returns the previous value.
    pub fn insert(&mut self, attr: Attribute) -> Option<AttrValue> {
        self.attrs.insert(attr.id, attr.value)
    }

    pub fn set(&mut self, id: AttrId, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.attrs.insert(id, value.into())
    }

    pub fn get(&self, id: AttrId) -> Option<&AttrValue> {
        self.attrs.get(&id)
    }

    pub fn get_mut(&mut self, id: AttrId) -> Option<&mut AttrValue> {
        self.attrs.get_mut(&id)
    }

    pub fn get_as<T: FromAttrValue>(&self, id: AttrId) -> StoreResult<T> {
        self.attrs
            .get(&id)
            .ok_or_else(|| StoreError::not_found(format!("attribute {}", id)))?
            .get()
    }

    pub fn remove(&mut self, id: AttrId) -> Option<AttrValue> {
        self.attrs.remove(&id)
    }

    pub fn contains(&self, id: AttrId) -> bool {
        self.attrs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttrId, &AttrValue)> {
        self.attrs.iter().map(|(id, v)| (*id, v))
    }

    pub fn ids(&self) -> impl Iterator<Item = AttrId> + '_ {
        self.attrs.keys().copied()
    }

    pub fn to_vec(&self) -> Vec<Attribute> {
        self.iter()
            .map(|(id, value)| Attribute {
                id,
                value: value.clone(),
            })
            .collect()
    }

    /// Every `(attr id, handle)` edge carried by this set.
    pub fn handle_edges(&self) -> Vec<(AttrId, Handle)> {
        self.iter()
            .flat_map(|(id, v)| v.handles().into_iter().map(move |h| (id, h)))
            .collect()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for attr in iter {
            set.insert(attr);
        }
        set
    }
}

impl From<Vec<Attribute>> for AttributeSet {
    fn from(attrs: Vec<Attribute>) -> Self {
        attrs.into_iter().collect()
    }
}

impl From<AttributeSet> for Vec<Attribute> {
    fn from(set: AttributeSet) -> Self {
        set.attrs
            .into_iter()
            .map(|(id, value)| Attribute { id, value })
            .collect()
    }
}
