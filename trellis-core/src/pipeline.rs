//! Per-route request pipeline.
//!
//! A bound route is an ordered list of [`RequestStage`]s executed by a
//! [`StageChain`]. Each stage receives the request context and a [`Next`]
//! continuation for the rest of the chain, and produces exactly one response
//! by value, so a response can never be written twice.
//!
//! Stages that only handle failures ([`RequestStage::catches_errors`]) are
//! skipped on the way in. When any later stage fails, the error is offered
//! to them in order; the first to produce a response ends the request.

use crate::container::{RequestScope, Resolver, Token};
use crate::exception_filter::{ExceptionContext, run_filters};
use crate::guard::{GuardOutcome, evaluate_guards};
use crate::logging::{debug, trace};
use crate::metadata::{ClassId, MethodHandler, ParamDescriptor, ParamSource};
use crate::pipe::{PipeTarget, apply_pipes};
use crate::{
    Arguments, Container, Error, ExceptionFilter, Guard, HttpMethod, HttpRequest, HttpResponse,
    Interceptor, Middleware, Pipe,
};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;

/// Continuation handed to a stage: runs the remainder of the chain
pub type Next =
    Box<dyn FnOnce(RequestContext) -> BoxFuture<'static, Result<HttpResponse, Error>> + Send>;

/// Build a [`Next`] from an async closure
pub fn next_fn<F, Fut>(f: F) -> Next
where
    F: FnOnce(RequestContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Box::new(
        move |ctx: RequestContext| -> BoxFuture<'static, Result<HttpResponse, Error>> {
            Box::pin(f(ctx))
        },
    )
}

/// The route a request was matched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub class: ClassId,
    pub handler: &'static str,
    pub method: HttpMethod,
    /// Full path pattern, prefix included
    pub path: String,
}

/// Everything a stage may look at while handling one request.
///
/// Clones share the deferred response headers, so a header deferred by any
/// stage reaches the final response.
#[derive(Clone)]
pub struct RequestContext {
    pub request: HttpRequest,
    scope: Arc<RequestScope>,
    route: Arc<RouteTarget>,
    deferred: Arc<Mutex<Vec<(String, String)>>>,
}

impl RequestContext {
    pub fn new(request: HttpRequest, scope: Arc<RequestScope>, route: Arc<RouteTarget>) -> Self {
        Self {
            request,
            scope,
            route,
            deferred: Arc::default(),
        }
    }

    /// A context backed by a fresh, empty container and no real route.
    /// Useful for exercising a single stage in isolation.
    pub fn detached(request: HttpRequest) -> Self {
        let route = RouteTarget {
            class: ClassId::of::<()>(),
            handler: "",
            method: request.method,
            path: request.path.clone(),
        };
        let scope = Container::new().create_child_scope();
        Self::new(request, scope, Arc::new(route))
    }

    /// The request's own scope
    pub fn scope(&self) -> &Arc<RequestScope> {
        &self.scope
    }

    pub fn route(&self) -> &RouteTarget {
        &self.route
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.request.header(name)
    }

    /// Set `name` on whichever response ends this request: the handler's,
    /// a filter's or the default error response. A header the response
    /// already carries is kept.
    pub fn defer_header(&self, name: &str, value: impl Into<String>) {
        self.deferred
            .lock()
            .push((name.to_ascii_lowercase(), value.into()));
    }

    pub fn deferred_headers(&self) -> Vec<(String, String)> {
        self.deferred.lock().clone()
    }

    /// Copy the deferred headers onto `response`
    pub fn apply_deferred(&self, mut response: HttpResponse) -> HttpResponse {
        for (name, value) in self.deferred.lock().iter() {
            response
                .headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        response
    }

    pub fn param(&self, name: &str) -> Option<&String> {
        self.request.param(name)
    }

    pub fn query(&self, name: &str) -> Option<&String> {
        self.request.query(name)
    }

    /// Resolve a provider within this request's scope
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.scope.resolve::<T>()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("scope", &self.scope.id())
            .field("handler", &self.route.handler)
            .finish()
    }
}

/// One link of a route's handler chain
#[async_trait]
pub trait RequestStage: Send + Sync {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error>;

    fn name(&self) -> &str;

    /// Whether this stage only acts on failures of later stages
    fn catches_errors(&self) -> bool {
        false
    }

    /// Whether this stage also runs for an `OPTIONS` preflight of its route
    fn runs_on_preflight(&self) -> bool {
        false
    }

    /// Turn an error into a response, or hand it back
    async fn handle_error(
        &self,
        error: Error,
        _context: &RequestContext,
    ) -> Result<HttpResponse, Error> {
        Err(error)
    }
}

pub type BoxedStage = Arc<dyn RequestStage>;

/// Ordered stages of one route
#[derive(Clone)]
pub struct StageChain {
    stages: Arc<[BoxedStage]>,
}

impl StageChain {
    pub fn new(stages: Vec<BoxedStage>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the chain. An `Err` means no error-handling stage answered.
    ///
    /// Error-handling stages see the request as it entered the chain;
    /// rewrites made by middleware on the way in are not visible to them.
    /// Headers deferred with [`RequestContext::defer_header`] are shared.
    pub async fn run(&self, context: RequestContext) -> Result<HttpResponse, Error> {
        let original = context.clone();
        match self.execute_from(0, context).await {
            Ok(response) => Ok(response),
            Err(error) => self.recover(error, &original).await,
        }
    }

    fn execute_from(
        &self,
        index: usize,
        context: RequestContext,
    ) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        let position = (index..self.stages.len()).find(|&i| !self.stages[i].catches_errors());
        let Some(position) = position else {
            return Box::pin(async {
                Err(Error::Internal(
                    "route chain ended without producing a response".to_string(),
                ))
            });
        };

        let stage = self.stages[position].clone();
        let chain = self.clone();
        trace!(stage = stage.name(), position, "Executing stage");

        Box::pin(async move {
            let next: Next = Box::new(move |ctx: RequestContext| chain.execute_from(position + 1, ctx));
            stage.handle(context, next).await
        })
    }

    async fn recover(&self, mut error: Error, context: &RequestContext) -> Result<HttpResponse, Error> {
        for stage in self.stages.iter().filter(|s| s.catches_errors()) {
            error = match stage.handle_error(error, context).await {
                Ok(response) => return Ok(response),
                Err(unhandled) => unhandled,
            };
        }
        Err(error)
    }
}

/// Middleware adapter
pub struct MiddlewareStage(pub Arc<dyn Middleware>);

#[async_trait]
impl RequestStage for MiddlewareStage {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        self.0.handle(context, next).await
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn runs_on_preflight(&self) -> bool {
        true
    }
}

/// Interceptor adapter
pub struct InterceptorStage(pub Arc<dyn Interceptor>);

#[async_trait]
impl RequestStage for InterceptorStage {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        self.0.intercept(context, next).await
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}

/// Evaluates class guards then method guards
pub struct GuardStage {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardStage {
    pub fn new(guards: Vec<Arc<dyn Guard>>) -> Self {
        Self { guards }
    }

    /// Body of the response sent when a guard denies the request
    pub fn forbidden() -> HttpResponse {
        HttpResponse::json_with_status(403, &json!({ "message": "Forbidden" }))
    }
}

#[async_trait]
impl RequestStage for GuardStage {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        match evaluate_guards(&self.guards, &context).await {
            GuardOutcome::Allowed => next(context).await,
            GuardOutcome::Denied(index) => {
                debug!(
                    guard = self.guards[index].name(),
                    path = %context.request.path,
                    "Request denied by guard"
                );
                Ok(Self::forbidden())
            }
            GuardOutcome::Errored(error) => Err(error),
        }
    }

    fn name(&self) -> &str {
        "guards"
    }
}

/// Offers failures to class filters then method filters
pub struct FilterStage {
    filters: Vec<Arc<dyn ExceptionFilter>>,
}

impl FilterStage {
    pub fn new(filters: Vec<Arc<dyn ExceptionFilter>>) -> Self {
        Self { filters }
    }
}

#[async_trait]
impl RequestStage for FilterStage {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        next(context).await
    }

    fn name(&self) -> &str {
        "filters"
    }

    fn catches_errors(&self) -> bool {
        true
    }

    async fn handle_error(
        &self,
        error: Error,
        context: &RequestContext,
    ) -> Result<HttpResponse, Error> {
        if self.filters.is_empty() {
            return Err(error);
        }
        let exception = ExceptionContext::from_request_context(context);
        match run_filters(&self.filters, &error, &exception).await {
            Some(response) => Ok(response),
            None => Err(error),
        }
    }
}

/// Terminal stage: resolves the controller, extracts arguments, invokes the
/// handler and pipes its result into the response.
pub struct DispatchStage {
    controller: Token,
    handler_name: &'static str,
    handler: MethodHandler,
    params: Vec<ParamDescriptor>,
    pipes: Vec<Arc<dyn Pipe>>,
    status: u16,
}

impl DispatchStage {
    /// `params` may be given in any order; they are sorted by index here
    pub fn new(
        class: ClassId,
        handler_name: &'static str,
        handler: MethodHandler,
        mut params: Vec<ParamDescriptor>,
        pipes: Vec<Arc<dyn Pipe>>,
        status: Option<u16>,
    ) -> Self {
        params.sort_by_key(|p| p.index);
        Self {
            controller: class.into(),
            handler_name,
            handler,
            params,
            pipes,
            status: status.unwrap_or(200),
        }
    }

    fn extract(param: &ParamDescriptor, context: &RequestContext) -> Result<Value, Error> {
        let text = |found: Option<&String>| found.map_or(Value::Null, |s| Value::String(s.clone()));
        match &param.source {
            ParamSource::Path(key) => Ok(text(context.param(key))),
            ParamSource::Query(key) => Ok(text(context.query(key))),
            ParamSource::Body => context.request.body_value(),
            ParamSource::Custom { key, factory } => factory(context, key.as_deref()),
        }
    }

    async fn arguments(&self, context: &RequestContext) -> Result<Arguments, Error> {
        let width = self.params.last().map_or(0, |p| p.index + 1);
        let mut values = vec![Value::Null; width];

        for param in &self.params {
            let raw = Self::extract(param, context)?;
            let target = PipeTarget::Param {
                index: param.index,
                kind: param.source.kind(),
                key: param.source.key().map(str::to_string),
            };
            values[param.index] = apply_pipes(&param.pipes, raw, &target).await?;
        }

        Ok(Arguments::new(values))
    }

    async fn invoke(&self, context: &RequestContext) -> Result<Value, Error> {
        let controller = context.scope().resolve_token(&self.controller)?;
        let arguments = self.arguments(context).await?;
        trace!(handler = self.handler_name, args = arguments.len(), "Invoking handler");
        let output = (self.handler)(controller, arguments).await?;
        apply_pipes(&self.pipes, output, &PipeTarget::Return).await
    }
}

#[async_trait]
impl RequestStage for DispatchStage {
    async fn handle(&self, context: RequestContext, _next: Next) -> Result<HttpResponse, Error> {
        match self.invoke(&context).await {
            Ok(body) => Ok(HttpResponse::json_with_status(self.status, &body)),
            Err(Error::Validation(errors)) => {
                debug!(handler = self.handler_name, failures = errors.len(), "Validation failed");
                Ok(HttpResponse::json_with_status(400, &errors.to_json()))
            }
            Err(error) => Err(error),
        }
    }

    fn name(&self) -> &str {
        self.handler_name
    }
}
