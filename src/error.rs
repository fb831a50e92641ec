//! Per-request dispatch errors.

use http::Method;
use thiserror::Error;

use crate::codec::CodecError;
use crate::http::body::BodyError;
use crate::routing::binder::BindingError;
use crate::routing::call::Fault;

/// Everything that can go wrong between claiming a request and writing its result.
///
/// Every variant is converted into a response for that request alone.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("unsupported parameter type: {0}")]
    UnsupportedType(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(Method),

    #[error("malformed request body: {0}")]
    Body(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("operation panicked: {0}")]
    Panic(String),
}

impl From<BodyError> for DispatchError {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::TooLarge { limit } => DispatchError::PayloadTooLarge { limit },
            BodyError::Read(message) => DispatchError::Body(message),
        }
    }
}
