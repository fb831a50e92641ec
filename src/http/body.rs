//! Request and response bodies.

use std::io;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use thiserror::Error;

/// Default cap on a buffered request body.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// A stream of body chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Body type of every response the server writes.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Failure to buffer a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Read(String),
}

/// Inbound body, either still on the wire or already buffered.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Buffered(Bytes),
    Incoming(Incoming),
}

impl RequestBody {
    /// Read the whole body, failing once more than `limit` bytes arrive.
    pub async fn collect_limited(self, limit: usize) -> Result<Bytes, BodyError> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Buffered(bytes) if bytes.len() > limit => Err(BodyError::TooLarge { limit }),
            RequestBody::Buffered(bytes) => Ok(bytes),
            RequestBody::Incoming(incoming) => match Limited::new(incoming, limit).collect().await {
                Ok(collected) => Ok(collected.to_bytes()),
                Err(error) if error.is::<LengthLimitError>() => Err(BodyError::TooLarge { limit }),
                Err(error) => Err(BodyError::Read(error.to_string())),
            },
        }
    }

    /// Read the body chunk by chunk.
    pub fn into_stream(self) -> ByteStream {
        match self {
            RequestBody::Empty => stream::empty().boxed(),
            RequestBody::Buffered(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            RequestBody::Incoming(incoming) => incoming.into_data_stream().map_err(io::Error::other).boxed(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Buffered(bytes)
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        RequestBody::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Buffered(Bytes::from(text))
    }
}

impl From<Incoming> for RequestBody {
    fn from(incoming: Incoming) -> Self {
        RequestBody::Incoming(incoming)
    }
}
