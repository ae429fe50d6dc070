//! Controller declaration.
//!
//! Controllers describe their routes through a [`ControllerDecl`] builder
//! rather than annotations. Every call writes into the explicit
//! [`MetadataRegistry`] the application owns; nothing is global.
//!
//! ```
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//! use trellis_core::*;
//!
//! struct UsersController;
//!
//! impl Injectable for UsersController {
//!     fn construct(_: Dependencies) -> Result<Self, Error> {
//!         Ok(UsersController)
//!     }
//! }
//!
//! impl UsersController {
//!     async fn find_one(self: Arc<Self>, args: Arguments) -> Result<Value, Error> {
//!         let id: u32 = args.get(0)?;
//!         Ok(json!({ "id": id }))
//!     }
//! }
//!
//! impl Controller for UsersController {
//!     fn declare(decl: &mut ControllerDecl<'_, Self>) {
//!         decl.prefix("/users").guard(AuthenticationGuard);
//!         decl.get("/:id", "find_one", Self::find_one)
//!             .param(0, ParamSource::Path("id".into()));
//!     }
//! }
//!
//! let mut registry = MetadataRegistry::new();
//! declare_controller::<UsersController>(&mut registry);
//! assert_eq!(registry.routes(ClassId::of::<UsersController>()).len(), 1);
//! ```

use crate::container::AnyArc;
use crate::metadata::{
    ClassId, MetadataRegistry, MetadataValue, MethodHandler, ParamDescriptor, ParamSource,
    RouteInfo,
};
use crate::{Error, ExceptionFilter, Guard, HttpMethod, Injectable, Interceptor, Middleware, Pipe, Scope};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// The argument list a handler is invoked with.
///
/// Position `i` holds the value extracted for the parameter declared at
/// index `i`; undeclared positions hold `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Value>,
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Deserialize the argument at `index`.
    ///
    /// Path and query values arrive as strings; when the string itself does
    /// not fit `T` it is parsed as JSON, so `"42"` reads as a number.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let value = self.values.get(index).cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => Ok(typed),
            Err(first) => match value {
                Value::String(raw) => serde_json::from_str(&raw).map_err(|_| {
                    Error::BadRequest(format!("argument {}: {}", index, first))
                }),
                _ => Err(Error::BadRequest(format!("argument {}: {}", index, first))),
            },
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A type whose methods are exposed as routes
pub trait Controller: Injectable {
    fn declare(decl: &mut ControllerDecl<'_, Self>);
}

/// Run `C`'s declaration against `registry`
pub fn declare_controller<C: Controller>(registry: &mut MetadataRegistry) {
    C::declare(&mut ControllerDecl::new(registry));
}

fn erase_handler<C, F, Fut, R>(handler: F) -> MethodHandler
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    Arc::new(
        move |instance: AnyArc, args: Arguments| -> BoxFuture<'static, Result<Value, Error>> {
            match instance.downcast::<C>() {
                Ok(controller) => {
                    let pending = handler(controller, args);
                    Box::pin(async move {
                        let output = pending.await?;
                        serde_json::to_value(output).map_err(|e| Error::Serialization(e.to_string()))
                    })
                }
                Err(_) => Box::pin(async move {
                    Err(Error::InvalidProvider(format!(
                        "resolved controller is not a {}",
                        std::any::type_name::<C>()
                    )))
                }),
            }
        },
    )
}

/// Class-level declaration builder
pub struct ControllerDecl<'r, C> {
    registry: &'r mut MetadataRegistry,
    class: ClassId,
    _controller: PhantomData<fn() -> C>,
}

impl<'r, C: Send + Sync + 'static> ControllerDecl<'r, C> {
    pub fn new(registry: &'r mut MetadataRegistry) -> Self {
        Self {
            registry,
            class: ClassId::of::<C>(),
            _controller: PhantomData,
        }
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    fn attach(&mut self, value: MetadataValue) -> &mut Self {
        self.registry.attach(self.class, None, value);
        self
    }

    /// Path prefix shared by every route of the controller
    pub fn prefix(&mut self, prefix: &str) -> &mut Self {
        self.attach(MetadataValue::Prefix(prefix.to_string()))
    }

    /// Override the scope the controller is registered with
    pub fn scope(&mut self, scope: Scope) -> &mut Self {
        self.attach(MetadataValue::Scope(scope))
    }

    pub fn guard(&mut self, guard: impl Guard + 'static) -> &mut Self {
        self.attach(MetadataValue::Guards(vec![Arc::new(guard)]))
    }

    pub fn filter(&mut self, filter: impl ExceptionFilter) -> &mut Self {
        self.attach(MetadataValue::Filters(vec![Arc::new(filter)]))
    }

    pub fn interceptor(&mut self, interceptor: impl Interceptor + 'static) -> &mut Self {
        self.attach(MetadataValue::Interceptors(vec![Arc::new(interceptor)]))
    }

    pub fn middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.attach(MetadataValue::Middleware(vec![Arc::new(middleware)]))
    }

    /// Declare a method without making it a route
    pub fn method<F, Fut, R>(&mut self, name: &'static str, handler: F) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.registry.attach(
            self.class,
            Some(name),
            MetadataValue::Handler(erase_handler(handler)),
        );
        MethodDecl {
            registry: &mut *self.registry,
            class: self.class,
            name,
        }
    }

    /// Declare a route: `verb path` dispatches to `handler`
    pub fn route<F, Fut, R>(
        &mut self,
        verb: HttpMethod,
        path: &str,
        name: &'static str,
        handler: F,
    ) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let decl = self.method(name, handler);
        decl.registry.attach(
            decl.class,
            Some(name),
            MetadataValue::Route(RouteInfo {
                method: verb,
                path: path.to_string(),
            }),
        );
        decl
    }

    pub fn get<F, Fut, R>(&mut self, path: &str, name: &'static str, handler: F) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.route(HttpMethod::GET, path, name, handler)
    }

    pub fn post<F, Fut, R>(&mut self, path: &str, name: &'static str, handler: F) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.route(HttpMethod::POST, path, name, handler)
    }

    pub fn put<F, Fut, R>(&mut self, path: &str, name: &'static str, handler: F) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.route(HttpMethod::PUT, path, name, handler)
    }

    pub fn patch<F, Fut, R>(&mut self, path: &str, name: &'static str, handler: F) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.route(HttpMethod::PATCH, path, name, handler)
    }

    pub fn delete<F, Fut, R>(&mut self, path: &str, name: &'static str, handler: F) -> MethodDecl<'_>
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.route(HttpMethod::DELETE, path, name, handler)
    }
}

/// Method-level declaration builder
pub struct MethodDecl<'r> {
    registry: &'r mut MetadataRegistry,
    class: ClassId,
    name: &'static str,
}

impl MethodDecl<'_> {
    fn attach(self, value: MetadataValue) -> Self {
        self.registry.attach(self.class, Some(self.name), value);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn guard(self, guard: impl Guard + 'static) -> Self {
        self.attach(MetadataValue::Guards(vec![Arc::new(guard)]))
    }

    pub fn filter(self, filter: impl ExceptionFilter) -> Self {
        self.attach(MetadataValue::Filters(vec![Arc::new(filter)]))
    }

    pub fn interceptor(self, interceptor: impl Interceptor + 'static) -> Self {
        self.attach(MetadataValue::Interceptors(vec![Arc::new(interceptor)]))
    }

    pub fn middleware(self, middleware: impl Middleware + 'static) -> Self {
        self.attach(MetadataValue::Middleware(vec![Arc::new(middleware)]))
    }

    /// Pipe applied to the handler's return value
    pub fn pipe(self, pipe: impl Pipe + 'static) -> Self {
        self.attach(MetadataValue::Pipes(vec![Arc::new(pipe)]))
    }

    /// Bind the parameter at `index` to `source`
    pub fn param(self, index: usize, source: ParamSource) -> Self {
        self.param_with(ParamDescriptor::new(index, source))
    }

    /// Bind a parameter whose value passes through `pipe` before the call
    pub fn param_piped(self, index: usize, source: ParamSource, pipe: impl Pipe + 'static) -> Self {
        self.param_with(ParamDescriptor::new(index, source).with_pipe(pipe))
    }

    pub fn param_with(self, descriptor: ParamDescriptor) -> Self {
        self.attach(MetadataValue::Params(vec![descriptor]))
    }

    /// Status sent on success instead of 200
    pub fn http_code(self, status: u16) -> Self {
        self.attach(MetadataValue::HttpCode(status))
    }
}
