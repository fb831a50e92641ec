//! Payload codecs.
//!
//! # Data Flow
//! ```text
//! raw text (query value, template capture)
//!     → deserialize(raw, declared type)  → serde_json::Value
//! decoded body member
//!     → coerce(value, declared type)     → serde_json::Value
//! handler result
//!     → serialize(value, declared type)  → response bytes + content_type()
//! ```
//!
//! # Design Decisions
//! - The dispatcher never assumes a wire format; it only talks to [`ContractCodec`]
//! - Values are carried as `serde_json::Value` between codec and handler
//! - Untyped targets use the self-describing `deserialize_open` mode

pub mod json;

pub use json::JsonCodec;

use serde_json::Value;
use thiserror::Error;

use crate::routing::ValueType;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("'{raw}' is not a valid {expected} value")]
    InvalidValue { expected: &'static str, raw: String },
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{0} values cannot be carried by this codec")]
    Unsupported(&'static str),
}

impl CodecError {
    pub(crate) fn invalid(ty: &ValueType, raw: impl Into<String>) -> Self {
        CodecError::InvalidValue {
            expected: ty.name(),
            raw: raw.into(),
        }
    }
}

/// Encodes and decodes operation values.
pub trait ContractCodec: Send + Sync {
    /// Content type of serialized results.
    fn content_type(&self) -> &str;

    fn serialize(&self, value: &Value, ty: &ValueType) -> Result<Vec<u8>, CodecError>;

    /// Decode one raw text value into the declared type.
    fn deserialize(&self, raw: &str, ty: &ValueType) -> Result<Value, CodecError>;

    /// Decode one raw text value without a declared type.
    fn deserialize_open(&self, raw: &str) -> Result<Value, CodecError>;

    /// Convert an already decoded value into the declared type.
    fn coerce(&self, value: Value, ty: &ValueType) -> Result<Value, CodecError>;
}
