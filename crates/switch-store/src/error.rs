//! Store status codes and error types.
//!
//! Every store operation returns a [`StoreResult`]. Adapters that need the
//! flat status code (for the switch API boundary) call
//! [`StoreError::status`].

use std::fmt;
use thiserror::Error;

/// Status codes reported across the switch API boundary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    ResourceInUse = -17,
    InvalidAttribute = -24,
    ReadOnlyAttribute = -25,
    TypeMismatch = -26,
}

impl SwitchStatus {
    pub fn is_success(&self) -> bool {
        *self == SwitchStatus::Success
    }
}

impl fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwitchStatus::Success => "SWITCH_STATUS_SUCCESS",
            SwitchStatus::Failure => "SWITCH_STATUS_FAILURE",
            SwitchStatus::NotSupported => "SWITCH_STATUS_NOT_SUPPORTED",
            SwitchStatus::InsufficientResources => "SWITCH_STATUS_INSUFFICIENT_RESOURCES",
            SwitchStatus::InvalidParameter => "SWITCH_STATUS_INVALID_PARAMETER",
            SwitchStatus::ItemAlreadyExists => "SWITCH_STATUS_ITEM_ALREADY_EXISTS",
            SwitchStatus::ItemNotFound => "SWITCH_STATUS_ITEM_NOT_FOUND",
            SwitchStatus::ResourceInUse => "SWITCH_STATUS_RESOURCE_IN_USE",
            SwitchStatus::InvalidAttribute => "SWITCH_STATUS_INVALID_ATTRIBUTE",
            SwitchStatus::ReadOnlyAttribute => "SWITCH_STATUS_READ_ONLY_ATTRIBUTE",
            SwitchStatus::TypeMismatch => "SWITCH_STATUS_TYPE_MISMATCH",
        };
        write!(f, "{}", s)
    }
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown attribute, wrong kind, missing mandatory attribute or a
    /// dangling/forbidden handle reference.
    #[error("Invalid attribute: {message}")]
    InvalidAttribute { message: String },

    /// Another live object already holds the same key attribute values.
    #[error("Key conflict: {message}")]
    KeyConflict { message: String },

    /// The requested id or handle is already occupied.
    #[error("Already exists: {item}")]
    AlreadyExists { item: String },

    #[error("Item not found: {item}")]
    ItemNotFound { item: String },

    /// The object is still referenced by other objects.
    #[error("Object in use: {object}")]
    InUse { object: String },

    /// Attempt to modify a create-only attribute.
    #[error("Read-only attribute: {attribute}")]
    ReadOnly { attribute: String },

    /// Type capacity or id space exhausted.
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    #[error("Not supported: {feature}")]
    NotSupported { feature: String },

    /// Attribute value accessed as the wrong kind.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Internal consistency fault. The store refuses to continue the
    /// operation rather than corrupt state.
    #[error("Fatal: {message}")]
    Fatal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn invalid_attribute(message: impl Into<String>) -> Self {
        StoreError::InvalidAttribute {
            message: message.into(),
        }
    }

    pub fn key_conflict(message: impl Into<String>) -> Self {
        StoreError::KeyConflict {
            message: message.into(),
        }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        StoreError::AlreadyExists { item: item.into() }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        StoreError::ItemNotFound { item: item.into() }
    }

    pub fn in_use(object: impl Into<String>) -> Self {
        StoreError::InUse {
            object: object.into(),
        }
    }

    pub fn read_only(attribute: impl Into<String>) -> Self {
        StoreError::ReadOnly {
            attribute: attribute.into(),
        }
    }

    pub fn exhausted(resource: impl Into<String>) -> Self {
        StoreError::ResourceExhausted {
            resource: resource.into(),
        }
    }

    pub fn not_supported(feature: impl Into<String>) -> Self {
        StoreError::NotSupported {
            feature: feature.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        StoreError::Fatal {
            message: message.into(),
        }
    }

    /// Maps the error onto the flat status code.
    pub fn status(&self) -> SwitchStatus {
        match self {
            StoreError::InvalidAttribute { .. } => SwitchStatus::InvalidAttribute,
            StoreError::KeyConflict { .. } | StoreError::AlreadyExists { .. } => {
                SwitchStatus::ItemAlreadyExists
            }
            StoreError::ItemNotFound { .. } => SwitchStatus::ItemNotFound,
            StoreError::InUse { .. } => SwitchStatus::ResourceInUse,
            StoreError::ReadOnly { .. } => SwitchStatus::ReadOnlyAttribute,
            StoreError::ResourceExhausted { .. } => SwitchStatus::InsufficientResources,
            StoreError::NotSupported { .. } => SwitchStatus::NotSupported,
            StoreError::TypeMismatch { .. } => SwitchStatus::TypeMismatch,
            StoreError::Config(_) => SwitchStatus::InvalidParameter,
            StoreError::Fatal { .. } | StoreError::Io(_) | StoreError::Serde(_) => {
                SwitchStatus::Failure
            }
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Collapses a store result into its status code.
pub fn status_of<T>(result: &StoreResult<T>) -> SwitchStatus {
    match result {
        Ok(_) => SwitchStatus::Success,
        Err(e) => e.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(SwitchStatus::Success.to_string(), "SWITCH_STATUS_SUCCESS");
        assert_eq!(
            SwitchStatus::ResourceInUse.to_string(),
            "SWITCH_STATUS_RESOURCE_IN_USE"
        );
        assert!(SwitchStatus::Success.is_success());
        assert!(!SwitchStatus::Failure.is_success());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            StoreError::key_conflict("route").status(),
            SwitchStatus::ItemAlreadyExists
        );
        assert_eq!(
            StoreError::already_exists("0x1").status(),
            SwitchStatus::ItemAlreadyExists
        );
        assert_eq!(StoreError::in_use("nhop").status(), SwitchStatus::ResourceInUse);
        assert_eq!(
            StoreError::exhausted("port").status(),
            SwitchStatus::InsufficientResources
        );
        assert_eq!(StoreError::fatal("index").status(), SwitchStatus::Failure);
    }

    #[test]
    fn test_status_of_result() {
        let ok: StoreResult<u32> = Ok(1);
        assert_eq!(status_of(&ok), SwitchStatus::Success);
        let err: StoreResult<u32> = Err(StoreError::not_found("x"));
        assert_eq!(status_of(&err), SwitchStatus::ItemNotFound);
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::TypeMismatch {
            expected: "u32",
            found: "bool",
        };
        assert_eq!(err.to_string(), "Type mismatch: expected u32, found bool");
    }
}
