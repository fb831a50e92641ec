//! Invocation inputs and outputs.
//!
//! # Responsibilities
//! - Carry bound arguments and request metadata into a handler
//! - Describe what a handler produced (nothing, a value, a byte stream)
//! - Describe how a handler failed
//!
//! # Design Decisions
//! - Arguments are kept as `serde_json::Value`; handlers deserialize into
//!   concrete types at the point of use
//! - Raw request bodies travel as `Bytes` or a `ByteStream`, never re-encoded

use std::fmt;
use std::mem;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::http::body::ByteStream;
use crate::http::context::RequestId;

/// A fault raised by an operation.
#[derive(Debug, Error)]
pub enum Fault {
    /// Surfaced verbatim with its status and description.
    #[error("{description}")]
    Status {
        status: StatusCode,
        description: String,
    },
    /// Any other failure. Surfaced as 400.
    #[error("{0}")]
    Internal(String),
}

impl Fault {
    pub fn status(status: StatusCode, description: impl Into<String>) -> Self {
        Fault::Status {
            status,
            description: description.into(),
        }
    }

    pub fn internal(error: impl fmt::Display) -> Self {
        Fault::Internal(error.to_string())
    }
}

/// One bound argument.
pub enum Arg {
    Value(Value),
    Bytes(Bytes),
    Stream(ByteStream),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Arg::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Arg::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Arguments bound for one invocation, in declaration order.
#[derive(Debug, Default)]
pub struct Args {
    items: Vec<Arg>,
}

impl Args {
    pub fn new(items: Vec<Arg>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.items.get(index) {
            Some(Arg::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Deserialize the argument at `index` into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, Fault> {
        match self.items.get(index) {
            Some(Arg::Value(value)) => {
                T::deserialize(value).map_err(|e| Fault::internal(format!("argument {index}: {e}")))
            }
            Some(_) => Err(Fault::internal(format!("argument {index} is a raw body"))),
            None => Err(Fault::internal(format!("argument {index} is missing"))),
        }
    }

    pub fn take_bytes(&mut self, index: usize) -> Result<Bytes, Fault> {
        match self.take(index)? {
            Arg::Bytes(bytes) => Ok(bytes),
            Arg::Value(Value::String(text)) => Ok(Bytes::from(text)),
            _ => Err(Fault::internal(format!("argument {index} is not a byte sequence"))),
        }
    }

    /// Take the argument at `index` as a byte stream. Buffered bodies are wrapped.
    pub fn take_stream(&mut self, index: usize) -> Result<ByteStream, Fault> {
        match self.take(index)? {
            Arg::Stream(stream) => Ok(stream),
            Arg::Bytes(bytes) => Ok(stream::once(async move { Ok(bytes) }).boxed()),
            _ => Err(Fault::internal(format!("argument {index} is not a stream"))),
        }
    }

    fn take(&mut self, index: usize) -> Result<Arg, Fault> {
        self.items
            .get_mut(index)
            .map(|slot| mem::replace(slot, Arg::Value(Value::Null)))
            .ok_or_else(|| Fault::internal(format!("argument {index} is missing")))
    }
}

/// Request metadata visible to handlers.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub id: RequestId,
    pub method: Method,
    /// Path relative to the matched server prefix.
    pub path: String,
    pub headers: HeaderMap,
}

/// Everything a handler receives.
#[derive(Debug)]
pub struct Call {
    pub args: Args,
    pub request: RequestInfo,
}

/// What a handler produced.
pub enum Reply {
    Unit,
    Value(Value),
    Stream(ByteStream),
}

impl Reply {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Fault> {
        serde_json::to_value(value).map(Reply::Value).map_err(Fault::internal)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Reply::Value(Value::String(text.into()))
    }

    pub fn stream(stream: ByteStream) -> Self {
        Reply::Stream(stream)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Unit => f.write_str("Unit"),
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Reply::Stream(_) => f.write_str("Stream"),
        }
    }
}
