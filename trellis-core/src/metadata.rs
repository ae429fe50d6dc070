//! Metadata registry.
//!
//! Associates declarative facts (route info, parameter bindings, guard,
//! filter, interceptor, middleware and pipe lists, handler callables, scope)
//! with a controller type and, optionally, one of its methods. The registry
//! is a plain key-value store with no behavior of its own: it is filled in by
//! [`ControllerDecl`](crate::ControllerDecl) at registration time and read by
//! the [`RouteBinder`](crate::RouteBinder).
//!
//! Reads never fail. An absent key yields an empty default.

use crate::{
    Arguments, Error, ExceptionFilter, Guard, HttpMethod, Interceptor, Middleware, Pipe,
    RequestContext, Scope,
};
use crate::container::{AnyArc, Token};
use futures_util::future::BoxFuture;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a controller type
#[derive(Clone, Copy, Debug, Eq)]
pub struct ClassId {
    id: TypeId,
    name: &'static str,
}

impl ClassId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without its module path
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for ClassId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for ClassId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<ClassId> for Token {
    fn from(class: ClassId) -> Self {
        Token::Type {
            id: class.id,
            name: class.name,
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Verb and path attached to a method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: HttpMethod,
    pub path: String,
}

/// A route derived from a controller method carrying route metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub handler: &'static str,
}

/// Factory for a custom parameter. Receives the live request context and the
/// stored extraction key.
pub type ParamFactory =
    Arc<dyn Fn(&RequestContext, Option<&str>) -> Result<serde_json::Value, Error> + Send + Sync>;

/// Where a handler argument comes from
#[derive(Clone)]
pub enum ParamSource {
    /// A named path parameter
    Path(String),
    /// The parsed request body
    Body,
    /// A named query-string parameter
    Query(String),
    /// A user-supplied extractor
    Custom {
        key: Option<String>,
        factory: ParamFactory,
    },
}

impl ParamSource {
    pub fn custom<F>(key: Option<&str>, factory: F) -> Self
    where
        F: Fn(&RequestContext, Option<&str>) -> Result<serde_json::Value, Error>
            + Send
            + Sync
            + 'static,
    {
        ParamSource::Custom {
            key: key.map(str::to_string),
            factory: Arc::new(factory),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParamSource::Path(_) => "path",
            ParamSource::Body => "body",
            ParamSource::Query(_) => "query",
            ParamSource::Custom { .. } => "custom",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            ParamSource::Path(k) | ParamSource::Query(k) => Some(k),
            ParamSource::Body => None,
            ParamSource::Custom { key, .. } => key.as_deref(),
        }
    }
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => write!(f, "{}({})", self.kind(), key),
            None => f.write_str(self.kind()),
        }
    }
}

/// One handler parameter: its declared position, source and input pipes
#[derive(Clone)]
pub struct ParamDescriptor {
    pub index: usize,
    pub source: ParamSource,
    pub pipes: Vec<Arc<dyn Pipe>>,
}

impl ParamDescriptor {
    pub fn new(index: usize, source: ParamSource) -> Self {
        Self {
            index,
            source,
            pipes: Vec::new(),
        }
    }

    pub fn with_pipe(mut self, pipe: impl Pipe + 'static) -> Self {
        self.pipes.push(Arc::new(pipe));
        self
    }
}

impl fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("index", &self.index)
            .field("source", &self.source)
            .field("pipes", &self.pipes.len())
            .finish()
    }
}

/// A controller method captured at registration time.
///
/// Receives the controller instance resolved for the current request and the
/// ordered argument list.
pub type MethodHandler = Arc<
    dyn Fn(AnyArc, Arguments) -> BoxFuture<'static, Result<serde_json::Value, Error>>
        + Send
        + Sync,
>;

/// Kinds of metadata the registry stores
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Prefix,
    Route,
    Handler,
    HttpCode,
    Scope,
    Params,
    Guards,
    Filters,
    Interceptors,
    Middleware,
    Pipes,
}

impl MetadataKind {
    /// List kinds accumulate on repeated attachment instead of overwriting
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            MetadataKind::Params
                | MetadataKind::Guards
                | MetadataKind::Filters
                | MetadataKind::Interceptors
                | MetadataKind::Middleware
                | MetadataKind::Pipes
        )
    }
}

/// A stored metadata value
#[derive(Clone)]
pub enum MetadataValue {
    Prefix(String),
    Route(RouteInfo),
    Handler(MethodHandler),
    HttpCode(u16),
    Scope(Scope),
    Params(Vec<ParamDescriptor>),
    Guards(Vec<Arc<dyn Guard>>),
    Filters(Vec<Arc<dyn ExceptionFilter>>),
    Interceptors(Vec<Arc<dyn Interceptor>>),
    Middleware(Vec<Arc<dyn Middleware>>),
    Pipes(Vec<Arc<dyn Pipe>>),
}

impl MetadataValue {
    pub fn kind(&self) -> MetadataKind {
        match self {
            MetadataValue::Prefix(_) => MetadataKind::Prefix,
            MetadataValue::Route(_) => MetadataKind::Route,
            MetadataValue::Handler(_) => MetadataKind::Handler,
            MetadataValue::HttpCode(_) => MetadataKind::HttpCode,
            MetadataValue::Scope(_) => MetadataKind::Scope,
            MetadataValue::Params(_) => MetadataKind::Params,
            MetadataValue::Guards(_) => MetadataKind::Guards,
            MetadataValue::Filters(_) => MetadataKind::Filters,
            MetadataValue::Interceptors(_) => MetadataKind::Interceptors,
            MetadataValue::Middleware(_) => MetadataKind::Middleware,
            MetadataValue::Pipes(_) => MetadataKind::Pipes,
        }
    }

    /// Merge `other` into `self`. List kinds append; scalar kinds overwrite.
    fn merge(&mut self, other: MetadataValue) {
        match (self, other) {
            (MetadataValue::Params(a), MetadataValue::Params(b)) => a.extend(b),
            (MetadataValue::Guards(a), MetadataValue::Guards(b)) => a.extend(b),
            (MetadataValue::Filters(a), MetadataValue::Filters(b)) => a.extend(b),
            (MetadataValue::Interceptors(a), MetadataValue::Interceptors(b)) => a.extend(b),
            (MetadataValue::Middleware(a), MetadataValue::Middleware(b)) => a.extend(b),
            (MetadataValue::Pipes(a), MetadataValue::Pipes(b)) => a.extend(b),
            (slot, other) => *slot = other,
        }
    }
}

impl fmt::Debug for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Prefix(p) => write!(f, "Prefix({:?})", p),
            MetadataValue::Route(r) => write!(f, "Route({} {})", r.method, r.path),
            MetadataValue::Handler(_) => f.write_str("Handler"),
            MetadataValue::HttpCode(c) => write!(f, "HttpCode({})", c),
            MetadataValue::Scope(s) => write!(f, "Scope({:?})", s),
            MetadataValue::Params(p) => write!(f, "Params({:?})", p),
            MetadataValue::Guards(g) => write!(f, "Guards({})", g.len()),
            MetadataValue::Filters(v) => write!(f, "Filters({})", v.len()),
            MetadataValue::Interceptors(v) => write!(f, "Interceptors({})", v.len()),
            MetadataValue::Middleware(v) => write!(f, "Middleware({})", v.len()),
            MetadataValue::Pipes(v) => write!(f, "Pipes({})", v.len()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MetadataKey {
    class: ClassId,
    method: Option<&'static str>,
    kind: MetadataKind,
}

/// Typed store of declarative metadata keyed by `(class, method?, kind)`
#[derive(Default)]
pub struct MetadataRegistry {
    entries: HashMap<MetadataKey, MetadataValue>,
    methods: HashMap<ClassId, Vec<&'static str>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `(class, method)`. List-valued kinds append to what
    /// is already there.
    pub fn attach(&mut self, class: ClassId, method: Option<&'static str>, value: MetadataValue) {
        if let Some(name) = method {
            let methods = self.methods.entry(class).or_default();
            if !methods.contains(&name) {
                methods.push(name);
            }
        }

        let key = MetadataKey {
            class,
            method,
            kind: value.kind(),
        };
        match self.entries.get_mut(&key) {
            Some(existing) => existing.merge(value),
            None => {
                self.entries.insert(key, value);
            }
        }
    }

    /// The raw stored value, if any
    pub fn read(
        &self,
        class: ClassId,
        method: Option<&'static str>,
        kind: MetadataKind,
    ) -> Option<&MetadataValue> {
        self.entries.get(&MetadataKey {
            class,
            method,
            kind,
        })
    }

    /// Whether anything at all has been declared for `class`
    pub fn is_declared(&self, class: ClassId) -> bool {
        self.methods.contains_key(&class) || self.entries.keys().any(|k| k.class == class)
    }

    /// Methods declared on `class`, in declaration order
    pub fn methods(&self, class: ClassId) -> &[&'static str] {
        self.methods.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn prefix(&self, class: ClassId) -> &str {
        match self.read(class, None, MetadataKind::Prefix) {
            Some(MetadataValue::Prefix(p)) => p,
            _ => "",
        }
    }

    pub fn route(&self, class: ClassId, method: &'static str) -> Option<&RouteInfo> {
        match self.read(class, Some(method), MetadataKind::Route) {
            Some(MetadataValue::Route(r)) => Some(r),
            _ => None,
        }
    }

    pub fn handler(&self, class: ClassId, method: &'static str) -> Option<MethodHandler> {
        match self.read(class, Some(method), MetadataKind::Handler) {
            Some(MetadataValue::Handler(h)) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn http_code(&self, class: ClassId, method: &'static str) -> Option<u16> {
        match self.read(class, Some(method), MetadataKind::HttpCode) {
            Some(MetadataValue::HttpCode(c)) => Some(*c),
            _ => None,
        }
    }

    pub fn scope(&self, class: ClassId) -> Option<Scope> {
        match self.read(class, None, MetadataKind::Scope) {
            Some(MetadataValue::Scope(s)) => Some(*s),
            _ => None,
        }
    }

    pub fn params(&self, class: ClassId, method: &'static str) -> Vec<ParamDescriptor> {
        match self.read(class, Some(method), MetadataKind::Params) {
            Some(MetadataValue::Params(p)) => p.clone(),
            _ => Vec::new(),
        }
    }

    pub fn guards(&self, class: ClassId, method: Option<&'static str>) -> Vec<Arc<dyn Guard>> {
        match self.read(class, method, MetadataKind::Guards) {
            Some(MetadataValue::Guards(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn filters(
        &self,
        class: ClassId,
        method: Option<&'static str>,
    ) -> Vec<Arc<dyn ExceptionFilter>> {
        match self.read(class, method, MetadataKind::Filters) {
            Some(MetadataValue::Filters(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn interceptors(
        &self,
        class: ClassId,
        method: Option<&'static str>,
    ) -> Vec<Arc<dyn Interceptor>> {
        match self.read(class, method, MetadataKind::Interceptors) {
            Some(MetadataValue::Interceptors(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn middleware(
        &self,
        class: ClassId,
        method: Option<&'static str>,
    ) -> Vec<Arc<dyn Middleware>> {
        match self.read(class, method, MetadataKind::Middleware) {
            Some(MetadataValue::Middleware(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn pipes(&self, class: ClassId, method: Option<&'static str>) -> Vec<Arc<dyn Pipe>> {
        match self.read(class, method, MetadataKind::Pipes) {
            Some(MetadataValue::Pipes(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    /// Routes of `class`: every declared method carrying both a verb and a
    /// path, in declaration order. Methods without route metadata are skipped.
    pub fn routes(&self, class: ClassId) -> Vec<RouteDescriptor> {
        self.methods(class)
            .iter()
            .filter_map(|&name| {
                self.route(class, name).map(|info| RouteDescriptor {
                    method: info.method,
                    path: info.path.clone(),
                    handler: name,
                })
            })
            .collect()
    }
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("entries", &self.entries.len())
            .field("classes", &self.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::CustomGuard;

    struct UsersController;
    struct OtherController;

    #[test]
    fn test_absent_reads_are_empty() {
        let registry = MetadataRegistry::new();
        let class = ClassId::of::<UsersController>();
        assert_eq!(registry.prefix(class), "");
        assert!(registry.guards(class, None).is_empty());
        assert!(registry.params(class, "find").is_empty());
        assert!(registry.route(class, "find").is_none());
        assert!(registry.read(class, None, MetadataKind::Filters).is_none());
        assert!(registry.routes(class).is_empty());
    }

    #[test]
    fn test_list_kinds_accumulate() {
        let mut registry = MetadataRegistry::new();
        let class = ClassId::of::<UsersController>();
        let allow = || Arc::new(CustomGuard::new(|_| Ok(true))) as Arc<dyn Guard>;

        registry.attach(class, None, MetadataValue::Guards(vec![allow()]));
        registry.attach(class, None, MetadataValue::Guards(vec![allow(), allow()]));
        assert_eq!(registry.guards(class, None).len(), 3);
        assert!(registry.guards(class, Some("find")).is_empty());
    }

    #[test]
    fn test_scalar_kinds_overwrite() {
        let mut registry = MetadataRegistry::new();
        let class = ClassId::of::<UsersController>();
        registry.attach(class, None, MetadataValue::Prefix("/a".into()));
        registry.attach(class, None, MetadataValue::Prefix("/users".into()));
        assert_eq!(registry.prefix(class), "/users");
    }

    #[test]
    fn test_routes_skip_methods_without_route_info() {
        let mut registry = MetadataRegistry::new();
        let class = ClassId::of::<UsersController>();
        registry.attach(
            class,
            Some("find_all"),
            MetadataValue::Route(RouteInfo {
                method: HttpMethod::GET,
                path: "/".into(),
            }),
        );
        registry.attach(class, Some("helper"), MetadataValue::HttpCode(200));
        registry.attach(
            class,
            Some("create"),
            MetadataValue::Route(RouteInfo {
                method: HttpMethod::POST,
                path: "/".into(),
            }),
        );

        let routes = registry.routes(class);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].handler, "find_all");
        assert_eq!(routes[1].handler, "create");
        assert_eq!(registry.methods(class), &["find_all", "helper", "create"]);
    }

    #[test]
    fn test_classes_are_isolated() {
        let mut registry = MetadataRegistry::new();
        registry.attach(
            ClassId::of::<UsersController>(),
            None,
            MetadataValue::Prefix("/users".into()),
        );
        assert_eq!(registry.prefix(ClassId::of::<OtherController>()), "");
        assert!(registry.is_declared(ClassId::of::<UsersController>()));
        assert!(!registry.is_declared(ClassId::of::<OtherController>()));
    }
}
