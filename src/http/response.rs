//! Outbound response builder.
//!
//! # Responsibilities
//! - Collect status, reason phrase, headers and body while a request is dispatched
//! - Provide `send_*` helpers that write a body and close the response
//! - Convert into a `hyper` response once dispatch is finished
//!
//! # Design Decisions
//! - A closed response ignores further writes instead of failing
//! - Custom reason phrases travel through `hyper::ext::ReasonPhrase`
//! - Buffered bodies use `Full`; streamed bodies are never buffered

use std::io;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{
    HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
    LOCATION,
};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::ext::ReasonPhrase;

use crate::http::body::{ByteStream, ResponseBody};

enum Payload {
    Empty,
    Full(Bytes),
    Stream(ByteStream),
}

/// Response under construction for one request.
pub struct ResponseBuilder {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    payload: Payload,
    closed: bool,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            payload: Payload::Empty,
            closed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.guard_closed("status") {
            self.status = status;
        }
    }

    /// Custom reason phrase, if one was set.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        if self.guard_closed("reason") {
            self.reason = Some(reason.into());
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Replace a header. Returns `false` if the value is not a valid header value.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(value) if self.guard_closed("header") => {
                self.headers.insert(name, value);
                true
            }
            Ok(_) => false,
            Err(_) => {
                tracing::warn!(header = %name, "Dropping invalid header value");
                false
            }
        }
    }

    pub fn append_header(&mut self, name: HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(value) if self.guard_closed("header") => {
                self.headers.append(name, value);
                true
            }
            _ => false,
        }
    }

    pub fn send_text(&mut self, text: impl Into<String>, content_type: &str) {
        self.send_data(Bytes::from(text.into()), Some(&format!("{content_type}; charset=utf-8")));
    }

    pub fn send_html(&mut self, html: impl Into<String>) {
        self.send_text(html, "text/html");
    }

    /// Write a buffered body and close the response.
    pub fn send_data(&mut self, data: impl Into<Bytes>, content_type: Option<&str>) {
        if !self.guard_closed("body") {
            return;
        }
        if let Some(content_type) = content_type {
            self.set_header(CONTENT_TYPE, content_type);
        }
        self.payload = Payload::Full(data.into());
        self.closed = true;
    }

    /// Stream a body and close the response.
    pub fn send_stream(&mut self, stream: ByteStream, content_type: &str) {
        if !self.guard_closed("body") {
            return;
        }
        self.set_header(CONTENT_TYPE, content_type);
        self.payload = Payload::Stream(stream);
        self.closed = true;
    }

    /// 302 to `location`.
    pub fn redirect(&mut self, location: &str) {
        self.set_status(StatusCode::FOUND);
        self.set_header(LOCATION, location);
        self.close();
    }

    /// Set an error status with a description sent as reason phrase and text body.
    pub fn fail(&mut self, status: StatusCode, description: &str) {
        self.set_status(status);
        self.set_reason(description);
        self.send_text(description, "text/plain");
    }

    /// Set an error status with a reason phrase and no body.
    pub fn deny(&mut self, status: StatusCode, reason: &str) {
        self.set_status(status);
        self.set_reason(reason);
        self.close();
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Buffered body, if the response carries one.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.payload, Payload::Stream(_))
    }

    /// Reopen the response and discard status, reason and body.
    ///
    /// Headers describing the discarded body are removed; the rest (CORS,
    /// `Server`, request id) stay attached.
    pub(crate) fn clear_body(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.payload = Payload::Empty;
        self.closed = false;
        for name in [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_ENCODING, CONTENT_DISPOSITION, LOCATION] {
            self.headers.remove(name);
        }
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let body = match self.payload {
            Payload::Empty => Empty::<Bytes>::new()
                .map_err(|never| -> io::Error { match never {} })
                .boxed_unsync(),
            Payload::Full(bytes) => Full::new(bytes)
                .map_err(|never| -> io::Error { match never {} })
                .boxed_unsync(),
            Payload::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;

        if let Some(reason) = self.reason {
            if Some(reason.as_str()) != self.status.canonical_reason() {
                match ReasonPhrase::try_from(reason.into_bytes()) {
                    Ok(phrase) => {
                        response.extensions_mut().insert(phrase);
                    }
                    Err(_) => tracing::debug!("Reason phrase not representable, using canonical"),
                }
            }
        }
        response
    }

    /// Returns `true` while the response accepts writes.
    fn guard_closed(&self, what: &'static str) -> bool {
        if self.closed {
            tracing::debug!(what, "Ignoring write to a closed response");
        }
        !self.closed
    }
}

impl std::fmt::Debug for ResponseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBuilder")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_after_close_are_ignored() {
        let mut response = ResponseBuilder::new();
        response.send_text("first", "text/plain");
        response.send_text("second", "text/plain");
        response.set_status(StatusCode::NOT_FOUND);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().map(|b| b.as_ref()), Some(&b"first"[..]));
    }

    #[test]
    fn fail_sets_reason_and_body() {
        let mut response = ResponseBuilder::new();
        response.fail(StatusCode::CONFLICT, "Already exists");

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.reason(), Some("Already exists"));
        assert!(response.header("content-type").unwrap().starts_with("text/plain"));

        let built = response.into_response();
        assert!(built.extensions().get::<ReasonPhrase>().is_some());
    }

    #[test]
    fn invalid_header_values_are_dropped() {
        let mut response = ResponseBuilder::new();
        assert!(!response.set_header(LOCATION, "bad\nvalue"));
        assert!(response.headers().is_empty());
    }

    #[test]
    fn clear_body_keeps_unrelated_headers() {
        let mut response = ResponseBuilder::new();
        response.set_header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, "http://a.test");
        response.set_header(http::header::SERVER, "contract-host");
        response.send_data(Bytes::from_static(b"{}"), Some("application/json"));

        response.clear_body();
        assert!(!response.is_closed());
        assert!(response.body().is_none());
        assert!(response.header("content-type").is_none());
        assert_eq!(response.header("access-control-allow-origin"), Some("http://a.test"));
        assert_eq!(response.header("server"), Some("contract-host"));

        response.fail(StatusCode::GONE, "Retired");
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.header("access-control-allow-origin"), Some("http://a.test"));
    }

    #[test]
    fn redirect_closes() {
        let mut response = ResponseBuilder::new();
        response.redirect("/docs/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.header("location"), Some("/docs/"));
        assert!(response.is_closed());
    }
}
