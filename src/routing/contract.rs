//! Contract descriptors.
//!
//! A descriptor pairs an operation's signature with its routing metadata:
//! HTTP verb, URI pattern and response content type. Descriptors are built
//! from an [`Operation`] when a service binding is assembled and never change
//! afterwards.

use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::Method;

use crate::routing::call::{Call, Fault, Reply};
use crate::routing::matcher::{PatternError, UriPattern};
use crate::routing::shape::{Record, RecordShape, ShapeRegistry};

/// Declared type of a parameter, record member or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Float,
    Double,
    Decimal,
    DateTime,
    String,
    /// Open string-keyed map of self-describing values.
    Object,
    Record(Arc<RecordShape>),
    /// Buffered raw request body.
    Bytes,
    /// Streaming raw request body.
    Stream,
}

impl ValueType {
    /// Scalar, string and temporal types.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            ValueType::Object | ValueType::Record(_) | ValueType::Bytes | ValueType::Stream
        )
    }

    /// Types that can only be bound from a raw request body.
    pub fn is_raw_body(&self) -> bool {
        matches!(self, ValueType::Bytes | ValueType::Stream)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Decimal => "decimal",
            ValueType::DateTime => "datetime",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::Record(shape) => shape.name,
            ValueType::Bytes => "bytes",
            ValueType::Stream => "stream",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared return of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    Unit,
    Value(ValueType),
    Stream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ValueType,
}

/// Name, ordered parameters and return type of an operation.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Returns,
}

enum ParamSpec {
    Value(ValueType),
    Record(TypeId, fn() -> RecordShape),
}

/// Registration-time description of one operation.
///
/// ```ignore
/// Operation::get("div")
///     .template("div:{a}/{b}")
///     .param("a", ValueType::Decimal)
///     .param("b", ValueType::Decimal)
///     .returns(ValueType::Decimal)
/// ```
pub struct Operation {
    name: String,
    method: Method,
    template: Option<String>,
    params: Vec<(String, ParamSpec)>,
    returns: Returns,
    content_type: Option<String>,
}

impl Operation {
    pub fn new(method: Method, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            template: None,
            params: Vec::new(),
            returns: Returns::Unit,
            content_type: None,
        }
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(Method::GET, name)
    }

    pub fn post(name: impl Into<String>) -> Self {
        Self::new(Method::POST, name)
    }

    /// Route by URI template instead of the bare operation name.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.params.push((name.into(), ParamSpec::Value(ty)));
        self
    }

    /// Declare a composite parameter whose shape comes from `T`.
    pub fn record<T: Record>(mut self, name: impl Into<String>) -> Self {
        self.params
            .push((name.into(), ParamSpec::Record(TypeId::of::<T>(), T::shape)));
        self
    }

    pub fn returns(mut self, ty: ValueType) -> Self {
        self.returns = Returns::Value(ty);
        self
    }

    /// Return a byte stream sent with the given content type.
    pub fn returns_stream(mut self, content_type: impl Into<String>) -> Self {
        self.returns = Returns::Stream;
        self.content_type = Some(content_type.into());
        self
    }
}

pub(crate) type HandlerFn<S> =
    dyn Fn(Arc<S>, Call) -> BoxFuture<'static, Result<Reply, Fault>> + Send + Sync;

/// Immutable routing and signature metadata for one invocable operation.
pub struct ContractDescriptor<S> {
    signature: Signature,
    method: Method,
    pattern: UriPattern,
    return_content_type: Option<String>,
    handler: Arc<HandlerFn<S>>,
}

impl<S> ContractDescriptor<S> {
    pub(crate) fn new<F, Fut>(
        operation: Operation,
        shapes: &mut ShapeRegistry,
        handler: F,
    ) -> Result<Self, PatternError>
    where
        F: Fn(Arc<S>, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Fault>> + Send + 'static,
    {
        let pattern = match &operation.template {
            Some(template) => UriPattern::template(template)?,
            None => UriPattern::bare(&operation.name),
        };

        let params = operation
            .params
            .into_iter()
            .map(|(name, spec)| {
                let ty = match spec {
                    ParamSpec::Value(ty) => ty,
                    ParamSpec::Record(id, build) => ValueType::Record(shapes.resolve_with(id, build)),
                };
                Param { name, ty }
            })
            .collect();

        let handler: Arc<HandlerFn<S>> = Arc::new(
            move |service: Arc<S>, call: Call| -> BoxFuture<'static, Result<Reply, Fault>> {
                Box::pin(handler(service, call))
            },
        );

        Ok(Self {
            signature: Signature {
                name: operation.name,
                params,
                returns: operation.returns,
            },
            method: operation.method,
            pattern,
            return_content_type: operation.content_type,
            handler,
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &UriPattern {
        &self.pattern
    }

    pub fn return_content_type(&self) -> Option<&str> {
        self.return_content_type.as_deref()
    }

    /// Whether this descriptor claims a request with the given verb and router-relative path.
    pub fn matches(&self, method: &Method, uri: &str) -> bool {
        self.method == *method && self.pattern.is_match(uri)
    }

    pub(crate) fn invoke(&self, service: Arc<S>, call: Call) -> BoxFuture<'static, Result<Reply, Fault>> {
        (self.handler)(service, call)
    }
}

impl<S> fmt::Debug for ContractDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractDescriptor")
            .field("signature", &self.signature)
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("return_content_type", &self.return_content_type)
            .finish_non_exhaustive()
    }
}
