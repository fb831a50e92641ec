//! Invocation of a claimed request.
//!
//! # Data Flow
//! ```text
//! GET  → template/query values ─┐
//! POST → raw body | form | open map ─┴→ binder → handler → reply encoder
//!                                                  │
//!                                       fault/panic → error response
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use serde_json::Value;

use crate::codec::ContractCodec;
use crate::error::DispatchError;
use crate::http::context::RequestContext;
use crate::routing::binder::{self, Extracted};
use crate::routing::call::{Arg, Args, Call, Fault, Reply};
use crate::routing::contract::{ContractDescriptor, Param, Returns, ValueType};
use crate::routing::matcher::ExtractedValues;

const OCTET_STREAM: &str = "application/octet-stream";
const BAD_REQUEST: &str = "Bad Request";

/// Invoke `descriptor` for `ctx` and write the result. Never fails: every
/// error becomes a response for this request.
pub(crate) async fn invoke<S: Send + Sync + 'static>(
    descriptor: &ContractDescriptor<S>,
    service: Arc<S>,
    codec: &dyn ContractCodec,
    uri: &str,
    ctx: &mut RequestContext,
) {
    ctx.claim();

    let outcome = match call(descriptor, service, codec, uri, ctx).await {
        Ok(reply) => write_reply(descriptor, codec, reply, ctx),
        Err(error) => Err(error),
    };

    match outcome {
        Ok(()) => tracing::debug!(
            operation = descriptor.name(),
            status = ctx.response().status().as_u16(),
            "Operation completed"
        ),
        Err(error) => write_error(descriptor, &error, ctx),
    }
}

async fn call<S: Send + Sync + 'static>(
    descriptor: &ContractDescriptor<S>,
    service: Arc<S>,
    codec: &dyn ContractCodec,
    uri: &str,
    ctx: &mut RequestContext,
) -> Result<Reply, DispatchError> {
    let args = bind_request(descriptor, codec, uri, ctx).await?;
    let call = Call {
        args: Args::new(args),
        request: ctx.info(),
    };

    match AssertUnwindSafe(async { descriptor.invoke(service, call).await })
        .catch_unwind()
        .await
    {
        Ok(result) => Ok(result?),
        Err(panic) => Err(DispatchError::Panic(panic_message(panic.as_ref()))),
    }
}

async fn bind_request<S>(
    descriptor: &ContractDescriptor<S>,
    codec: &dyn ContractCodec,
    uri: &str,
    ctx: &mut RequestContext,
) -> Result<Vec<Arg>, DispatchError> {
    let params = &descriptor.signature().params;
    let method = ctx.method().clone();
    match method {
        Method::GET => {
            let values = descriptor.pattern().extract(uri);
            binder::bind(params, &Extracted::Text(values), codec)
        }
        Method::POST => bind_body(params, codec, ctx).await,
        other => Err(DispatchError::UnsupportedMethod(other)),
    }
}

async fn bind_body(
    params: &[Param],
    codec: &dyn ContractCodec,
    ctx: &mut RequestContext,
) -> Result<Vec<Arg>, DispatchError> {
    let content_type = ctx
        .header(CONTENT_TYPE)
        .unwrap_or_default()
        .to_ascii_lowercase();

    if ["stream", "octet", "image"]
        .iter()
        .any(|kind| content_type.contains(kind))
    {
        return bind_raw_body(params, ctx).await;
    }
    if content_type.contains("multipart/form-data") {
        return Err(DispatchError::UnsupportedType(
            "multipart/form-data bodies are not supported".to_owned(),
        ));
    }

    let limit = ctx.body_limit();
    let body = ctx.take_body().collect_limited(limit).await?;
    let text = std::str::from_utf8(&body).map_err(|e| DispatchError::Body(e.to_string()))?;

    if content_type.contains("application/x-www-form-urlencoded") {
        return binder::bind(params, &Extracted::Text(ExtractedValues::from_query(text)), codec);
    }

    if text.trim().is_empty() {
        return binder::bind(params, &Extracted::Structured(Default::default()), codec);
    }
    match codec.deserialize_open(text)? {
        Value::Object(members) => binder::bind(params, &Extracted::Structured(members), codec),
        _ => Err(DispatchError::Body(
            "request body must be an object".to_owned(),
        )),
    }
}

async fn bind_raw_body(params: &[Param], ctx: &mut RequestContext) -> Result<Vec<Arg>, DispatchError> {
    match params {
        [] => Ok(Vec::new()),
        [param] if param.ty == ValueType::Stream => Ok(vec![Arg::Stream(ctx.take_body().into_stream())]),
        [param] if param.ty == ValueType::Bytes => {
            let limit = ctx.body_limit();
            let body = ctx.take_body().collect_limited(limit).await?;
            Ok(vec![Arg::Bytes(body)])
        }
        _ => Err(DispatchError::UnsupportedType(
            "a raw body binds only to a single bytes or stream parameter".to_owned(),
        )),
    }
}

fn write_reply<S>(
    descriptor: &ContractDescriptor<S>,
    codec: &dyn ContractCodec,
    reply: Reply,
    ctx: &mut RequestContext,
) -> Result<(), DispatchError> {
    let declared = &descriptor.signature().returns;
    let response = ctx.response_mut();

    match (declared, reply) {
        (Returns::Unit, _) | (_, Reply::Unit) => response.close(),
        (_, Reply::Stream(stream)) => {
            let content_type = descriptor.return_content_type().unwrap_or(OCTET_STREAM);
            response.send_stream(stream, content_type);
        }
        (declared, Reply::Value(value)) => {
            let ty = match declared {
                Returns::Value(ty) => ty,
                _ => &ValueType::Object,
            };
            let encoded = codec.serialize(&value, ty)?;
            response.send_data(encoded, Some(codec.content_type()));
        }
    }
    Ok(())
}

fn write_error<S>(descriptor: &ContractDescriptor<S>, error: &DispatchError, ctx: &mut RequestContext) {
    let expose = ctx.expose_error_details();
    // A failed encoder may have left a body behind.
    ctx.response_mut().clear_body();
    ctx.claim();
    let response = ctx.response_mut();

    match error {
        DispatchError::Fault(Fault::Status { status, description }) => {
            tracing::debug!(
                operation = descriptor.name(),
                status = status.as_u16(),
                description = %description,
                "Operation raised a fault"
            );
            response.fail(*status, description);
        }
        DispatchError::PayloadTooLarge { limit } => {
            tracing::debug!(operation = descriptor.name(), limit, "Request body over limit");
            response.fail(StatusCode::PAYLOAD_TOO_LARGE, &error.to_string());
        }
        other => {
            tracing::warn!(operation = descriptor.name(), error = %other, "Operation failed");
            let body = if expose { other.to_string() } else { BAD_REQUEST.to_owned() };
            response.set_status(StatusCode::BAD_REQUEST);
            response.send_text(body, "text/plain");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::http::body::RequestBody;
    use crate::net::prefix::ServerPrefix;
    use crate::routing::contract::Operation;
    use crate::routing::shape::ShapeRegistry;
    use http::Request;
    use serde_json::json;

    struct Service;

    fn context(method: Method, uri: &str, content_type: Option<&str>, body: &'static str) -> RequestContext {
        let prefixes: Vec<ServerPrefix> = vec!["http://a.test/".parse().unwrap()];
        let mut builder = Request::builder().method(method).uri(uri).header("host", "a.test");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        RequestContext::new(builder.body(RequestBody::from(body)).unwrap(), &prefixes).with_error_details(true)
    }

    fn descriptor<F, Fut>(operation: Operation, handler: F) -> ContractDescriptor<Service>
    where
        F: Fn(Arc<Service>, Call) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Reply, Fault>> + Send + 'static,
    {
        ContractDescriptor::new(operation, &mut ShapeRegistry::new(), handler).unwrap()
    }

    fn body_text(ctx: &RequestContext) -> String {
        String::from_utf8(ctx.response().body().map(|b| b.to_vec()).unwrap_or_default()).unwrap()
    }

    async fn run(descriptor: &ContractDescriptor<Service>, uri: &str, ctx: &mut RequestContext) {
        invoke(descriptor, Arc::new(Service), &JsonCodec::new(), uri, ctx).await;
    }

    fn echo_first(_: Arc<Service>, call: Call) -> std::future::Ready<Result<Reply, Fault>> {
        std::future::ready(call.args.value(0).cloned().map(Reply::Value).ok_or_else(|| Fault::internal("no args")))
    }

    #[tokio::test]
    async fn post_json_binds_by_name() {
        let op = Operation::post("readJson")
            .param("s", ValueType::String)
            .param("i", ValueType::Long)
            .returns(ValueType::String);
        let d = descriptor(op, |_: Arc<Service>, call: Call| async move {
            let s: String = call.args.get(0)?;
            let i: i64 = call.args.get(1)?;
            Ok(Reply::text(format!("{s}:{i}")))
        });
        let mut ctx = context(Method::POST, "/readJson", Some("application/json"), r#"{"i": 7, "s": "x"}"#);

        run(&d, "readJson", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(body_text(&ctx), r#""x:7""#);
        assert_eq!(ctx.response().header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn post_form_binds_like_a_query() {
        let op = Operation::post("sum").param("a", ValueType::Int).returns(ValueType::Int);
        let d = descriptor(op, echo_first);
        let mut ctx = context(
            Method::POST,
            "/sum",
            Some("application/x-www-form-urlencoded"),
            "a=41",
        );

        run(&d, "sum", &mut ctx).await;
        assert_eq!(body_text(&ctx), "41");
    }

    #[tokio::test]
    async fn post_non_object_body_is_rejected() {
        let op = Operation::post("sum").param("a", ValueType::Int);
        let d = descriptor(op, echo_first);
        let mut ctx = context(Method::POST, "/sum", Some("application/json"), "[1, 2]");

        run(&d, "sum", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn multipart_is_unsupported() {
        let op = Operation::post("upload").param("a", ValueType::String);
        let d = descriptor(op, echo_first);
        let mut ctx = context(Method::POST, "/upload", Some("multipart/form-data; boundary=x"), "");

        run(&d, "upload", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::BAD_REQUEST);
        assert!(body_text(&ctx).contains("multipart"));
    }

    #[tokio::test]
    async fn octet_body_binds_to_bytes() {
        let op = Operation::post("upload").param("data", ValueType::Bytes).returns(ValueType::Int);
        let d = descriptor(op, |_: Arc<Service>, mut call: Call| async move {
            let data = call.args.take_bytes(0)?;
            Ok(Reply::from(json!(data.len())))
        });
        let mut ctx = context(Method::POST, "/upload", Some("application/octet-stream"), "abcd");

        run(&d, "upload", &mut ctx).await;
        assert_eq!(body_text(&ctx), "4");
    }

    #[tokio::test]
    async fn octet_body_needs_raw_parameter() {
        let op = Operation::post("upload").param("data", ValueType::String);
        let d = descriptor(op, echo_first);
        let mut ctx = context(Method::POST, "/upload", Some("image/png"), "abcd");

        run(&d, "upload", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_verbs_are_unsupported() {
        let d = descriptor(Operation::new(Method::PUT, "put"), echo_first);
        let mut ctx = context(Method::PUT, "/put", None, "");

        run(&d, "put", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::BAD_REQUEST);
        assert!(body_text(&ctx).contains("PUT"));
    }

    #[tokio::test]
    async fn status_fault_is_surfaced_verbatim() {
        let d = descriptor(Operation::get("gone"), |_: Arc<Service>, _: Call| async {
            Err(Fault::status(StatusCode::GONE, "Resource retired"))
        });
        let mut ctx = context(Method::GET, "/gone", None, "");

        run(&d, "gone", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::GONE);
        assert_eq!(ctx.response().reason(), Some("Resource retired"));
        assert_eq!(body_text(&ctx), "Resource retired");
        assert!(ctx.response().header("x-request-id").is_some());
        assert!(ctx.response().header("server").is_some());
    }

    #[tokio::test]
    async fn errors_keep_negotiated_cors_headers() {
        let op = Operation::get("div").param("a", ValueType::Int).returns(ValueType::Int);
        let d = descriptor(op, |_: Arc<Service>, _: Call| async {
            Err(Fault::internal("division by zero"))
        });
        let mut ctx = context(Method::GET, "/div?a=1", None, "");
        ctx.response_mut()
            .set_header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, "http://b.test");
        ctx.response_mut().append_header(http::header::VARY, "Origin");

        run(&d, "div?a=1", &mut ctx).await;
        let response = ctx.response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.header("access-control-allow-origin"), Some("http://b.test"));
        assert_eq!(response.header("vary"), Some("Origin"));
        assert!(response.header("server").is_some());
        assert!(response.header("content-type").unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() {
        let op = Operation::post("upload").param("data", ValueType::Bytes);
        let d = descriptor(op, echo_first);
        let mut ctx = context(Method::POST, "/upload", Some("application/octet-stream"), "abcdefgh")
            .with_body_limit(4);

        run(&d, "upload", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::PAYLOAD_TOO_LARGE);

        let op = Operation::post("readJson").param("s", ValueType::String);
        let d = descriptor(op, echo_first);
        let mut ctx = context(Method::POST, "/readJson", Some("application/json"), r#"{"s": "long"}"#)
            .with_body_limit(4);

        run(&d, "readJson", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(ctx.response().header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn panics_become_bad_request() {
        let d = descriptor(Operation::get("boom"), |_: Arc<Service>, _: Call| async {
            if true {
                panic!("exploded");
            }
            Ok(Reply::Unit)
        });
        let mut ctx = context(Method::GET, "/boom", None, "");

        run(&d, "boom", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::BAD_REQUEST);
        assert!(body_text(&ctx).contains("exploded"));
    }

    #[tokio::test]
    async fn details_hidden_unless_exposed() {
        let d = descriptor(Operation::get("fail"), |_: Arc<Service>, _: Call| async {
            Err(Fault::internal("secret"))
        });
        let mut ctx = context(Method::GET, "/fail", None, "").with_error_details(false);

        run(&d, "fail", &mut ctx).await;
        assert_eq!(body_text(&ctx), BAD_REQUEST);
    }

    #[tokio::test]
    async fn unit_return_sends_empty_body() {
        let d = descriptor(Operation::get("nothing"), |_: Arc<Service>, _: Call| async {
            Ok(Reply::text("ignored"))
        });
        let mut ctx = context(Method::GET, "/nothing", None, "");

        run(&d, "nothing", &mut ctx).await;
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert!(ctx.response().body().is_none());
        assert!(ctx.response().is_closed());
    }
}
