//! Service bindings.
//!
//! # Responsibilities
//! - Hold the ordered descriptors of one service, mounted at a router prefix
//! - Decide whether a request belongs to the service and which descriptor claims it
//! - Provide the service instance: shared, or built per claimed request
//!
//! # Design Decisions
//! - Immutable after registration (thread-safe without locks)
//! - O(n) descriptor scan in declaration order (acceptable for typical contracts)
//! - A path match with the wrong verb does not claim the request

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::codec::{ContractCodec, JsonCodec};
use crate::http::context::RequestContext;
use crate::routing::call::{Call, Fault, Reply};
use crate::routing::contract::{ContractDescriptor, Operation};
use crate::routing::invoke;
use crate::routing::matcher::PatternError;
use crate::routing::shape::ShapeRegistry;
use crate::routing::Binding;

enum Instance<S> {
    Singleton(Arc<S>),
    Factory(Box<dyn Fn() -> S + Send + Sync>),
}

/// The operations of one service mounted at a router prefix.
///
/// ```ignore
/// let binding = ServiceBinding::singleton(Calculator::default())
///     .at("math")
///     .operation(
///         Operation::get("add").param("a", ValueType::Int).param("b", ValueType::Int).returns(ValueType::Int),
///         |calc: Arc<Calculator>, call: Call| async move { calc.add(&call.args) },
///     )?;
/// ```
pub struct ServiceBinding<S> {
    prefix: String,
    descriptors: Vec<ContractDescriptor<S>>,
    instance: Instance<S>,
    codec: Arc<dyn ContractCodec>,
    shapes: ShapeRegistry,
}

impl<S: Send + Sync + 'static> ServiceBinding<S> {
    /// Every request is served by the same instance.
    pub fn singleton(service: impl Into<Arc<S>>) -> Self {
        Self::with_instance(Instance::Singleton(service.into()))
    }

    /// Every claimed request gets a fresh instance from `factory`.
    pub fn per_request<F>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::with_instance(Instance::Factory(Box::new(factory)))
    }

    fn with_instance(instance: Instance<S>) -> Self {
        Self {
            prefix: String::new(),
            descriptors: Vec::new(),
            instance,
            codec: Arc::new(JsonCodec::new()),
            shapes: ShapeRegistry::new(),
        }
    }

    /// Mount under `prefix`, relative to the server prefix.
    pub fn at(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_owned();
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ContractCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Register an operation. Fails if its URI template is malformed.
    pub fn operation<F, Fut>(mut self, operation: Operation, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(Arc<S>, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Fault>> + Send + 'static,
    {
        let descriptor = ContractDescriptor::new(operation, &mut self.shapes, handler)?;
        tracing::debug!(
            operation = descriptor.name(),
            method = %descriptor.method(),
            pattern = ?descriptor.pattern().template_str(),
            prefix = %self.prefix,
            "Operation registered"
        );
        self.descriptors.push(descriptor);
        Ok(self)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn descriptors(&self) -> &[ContractDescriptor<S>] {
        &self.descriptors
    }

    fn instance(&self) -> Arc<S> {
        match &self.instance {
            Instance::Singleton(service) => Arc::clone(service),
            Instance::Factory(factory) => Arc::new(factory()),
        }
    }
}

impl<S: Send + Sync + 'static> Binding for ServiceBinding<S> {
    fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(local) = ctx.resolve_local_prefix(&self.prefix) else {
                return false;
            };
            let uri = local.trim_matches('/');

            let Some(descriptor) = self
                .descriptors
                .iter()
                .find(|descriptor| descriptor.matches(ctx.method(), uri))
            else {
                return false;
            };

            invoke::invoke(descriptor, self.instance(), self.codec.as_ref(), uri, ctx).await;
            true
        })
    }
}

impl<S> std::fmt::Debug for ServiceBinding<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBinding")
            .field("prefix", &self.prefix)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::RequestBody;
    use crate::net::prefix::ServerPrefix;
    use crate::routing::contract::ValueType;
    use http::{Method, Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct Calculator;

    struct Counted;

    impl Counted {
        fn new() -> Self {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Counted
        }
    }

    fn context(method: Method, uri: &str) -> RequestContext {
        let prefixes: Vec<ServerPrefix> = vec!["http://a.test/".parse().unwrap()];
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "a.test")
            .body(RequestBody::Empty)
            .unwrap();
        RequestContext::new(request, &prefixes)
    }

    fn calculator() -> ServiceBinding<Calculator> {
        ServiceBinding::singleton(Calculator)
            .at("/math/")
            .operation(
                Operation::get("add")
                    .param("a", ValueType::Int)
                    .param("b", ValueType::Int)
                    .returns(ValueType::Int),
                |_: Arc<Calculator>, call: Call| async move {
                    let a: i32 = call.args.get(0)?;
                    let b: i32 = call.args.get(1)?;
                    Ok(Reply::from(serde_json::json!(a + b)))
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn claims_matching_request_under_prefix() {
        let binding = calculator();
        let mut ctx = context(Method::GET, "/math/add?a=2&b=3");

        assert!(binding.process(&mut ctx).await);
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body().map(|b| b.as_ref()), Some(&b"5"[..]));
        assert!(ctx.response().header("server").is_some());
    }

    #[tokio::test]
    async fn ignores_other_prefixes_and_verbs() {
        let binding = calculator();

        let mut outside = context(Method::GET, "/add?a=2&b=3");
        assert!(!binding.process(&mut outside).await);

        let mut wrong_verb = context(Method::POST, "/math/add");
        assert!(!binding.process(&mut wrong_verb).await);
        assert!(wrong_verb.response().headers().is_empty());
    }

    #[tokio::test]
    async fn factory_builds_instance_per_claimed_request() {
        let binding = ServiceBinding::per_request(Counted::new)
            .operation(Operation::get("ping"), |_: Arc<Counted>, _: Call| async { Ok(Reply::Unit) })
            .unwrap();
        let before = BUILT.load(Ordering::SeqCst);

        assert!(binding.process(&mut context(Method::GET, "/ping")).await);
        assert!(binding.process(&mut context(Method::GET, "/ping")).await);
        assert!(!binding.process(&mut context(Method::GET, "/pong")).await);

        assert_eq!(BUILT.load(Ordering::SeqCst) - before, 2);
    }

    #[test]
    fn malformed_template_fails_registration() {
        let result = ServiceBinding::singleton(Calculator)
            .operation(Operation::get("x").template("x/{}"), |_: Arc<Calculator>, _: Call| async {
                Ok(Reply::Unit)
            });
        assert!(result.is_err());
    }
}
