//! # Message Types
//!
//! A [`Message`] is a payload type that can be stored in a collection. It carries a type
//! identity (a human-readable name plus a stable fingerprint of its schema) and knows how to
//! turn itself into opaque bytes and back.
//!
//! The identity is what backends record when a collection is initialized; a collection holds
//! messages of exactly one identity.
//!
//! ## Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use warehouse_core::{json_message, Message};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Temperature {
//!     temperature: f64,
//! }
//!
//! json_message!(Temperature, "sensor_msgs/Temperature", "float64 temperature");
//!
//! assert_eq!(Temperature::DATATYPE, "sensor_msgs/Temperature");
//! assert_eq!(Temperature::md5sum().len(), 64);
//! ```

use sha2::{Digest, Sha256};

use crate::error::Result;

/// A payload type storable in a message collection.
///
/// `Default` provides the empty payload returned by metadata-only queries.
pub trait Message: Default + Send + Sync + Sized + 'static {
    /// Human-readable type name, e.g. `"sensor_msgs/Temperature"`.
    const DATATYPE: &'static str;

    /// Stable fingerprint of the type's schema. Must be identical across processes.
    fn md5sum() -> String;

    fn encode(&self) -> Result<Vec<u8>>;

    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// SHA-256 hex digest of a schema definition.
///
/// Whitespace at line ends and blank lines are ignored so that reformatting a definition
/// does not change its fingerprint.
pub fn schema_fingerprint(definition: &str) -> String {
    let normalized: Vec<&str> = definition
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(normalized.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Implements [`Message`] for a serde type, encoding payloads as JSON.
///
/// Arguments: the type, its datatype name and its schema definition text (fingerprinted with
/// [`schema_fingerprint`]).
#[macro_export]
macro_rules! json_message {
    ($ty:ty, $datatype:expr, $definition:expr) => {
        impl $crate::Message for $ty {
            const DATATYPE: &'static str = $datatype;

            fn md5sum() -> String {
                $crate::schema_fingerprint($definition)
            }

            fn encode(&self) -> $crate::Result<Vec<u8>> {
                $crate::__private::serde_json::to_vec(self)
                    .map_err(|e| $crate::WarehouseError::Serialization(e.to_string()))
            }

            fn decode(bytes: &[u8]) -> $crate::Result<Self> {
                $crate::__private::serde_json::from_slice(bytes)
                    .map_err(|e| $crate::WarehouseError::Serialization(e.to_string()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarehouseError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Pose {
        x: f64,
        y: f64,
        frame: String,
    }

    json_message!(Pose, "geometry_msgs/Pose2D", "float64 x\nfloat64 y\nstring frame");

    #[test]
    fn test_fingerprint_is_stable_and_ignores_formatting() {
        let a = schema_fingerprint("float64 x\nfloat64 y");
        let b = schema_fingerprint("  float64 x  \n\n float64 y\n");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, schema_fingerprint("float64 x\nfloat32 y"));
    }

    #[test]
    fn test_json_message_roundtrip() {
        let pose = Pose {
            x: 1.5,
            y: -2.0,
            frame: "map".to_string(),
        };
        let bytes = pose.encode().unwrap();
        assert_eq!(Pose::decode(&bytes).unwrap(), pose);
        assert_eq!(Pose::DATATYPE, "geometry_msgs/Pose2D");
        assert_eq!(
            Pose::md5sum(),
            schema_fingerprint("float64 x\nfloat64 y\nstring frame")
        );
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = Pose::decode(b"not json").unwrap_err();
        assert!(matches!(err, WarehouseError::Serialization(_)));
    }
}
