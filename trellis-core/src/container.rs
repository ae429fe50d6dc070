// Dependency injection container

use crate::Error;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// A type-erased, shareable instance produced by a provider
pub type AnyArc = Arc<dyn Any + Send + Sync>;

type FactoryFn = Arc<dyn Fn(&dyn Resolver) -> Result<AnyArc, Error> + Send + Sync>;
type ConstructFn = fn(Dependencies) -> Result<AnyArc, Error>;
type DisposeFn = Arc<dyn Fn(&AnyArc) -> Result<(), Error> + Send + Sync>;

/// Lifetime policy for a provider's instances
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One instance for the lifetime of the root container
    #[default]
    Singleton,
    /// A new instance on every resolution
    Transient,
    /// One instance per request scope
    Request,
}

/// Identity under which a provider is bound
#[derive(Clone, Debug, Eq)]
pub enum Token {
    Type { id: TypeId, name: &'static str },
    Named(Cow<'static, str>),
}

impl Token {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Token::Named(name.into())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Type { id: a, .. }, Token::Type { id: b, .. }) => a == b,
            (Token::Named(a), Token::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Token::Type { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            Token::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type { name, .. } => f.write_str(name),
            Token::Named(name) => write!(f, "\"{}\"", name),
        }
    }
}

/// Binds a constructor parameter position to the token resolved for it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectionDescriptor {
    pub index: usize,
    pub token: Token,
}

impl InjectionDescriptor {
    pub fn new(index: usize, token: Token) -> Self {
        Self { index, token }
    }

    pub fn of<T: ?Sized + 'static>(index: usize) -> Self {
        Self::new(index, Token::of::<T>())
    }
}

/// Resolved constructor arguments, ordered by parameter index
pub struct Dependencies {
    resolved: Vec<(InjectionDescriptor, AnyArc)>,
}

impl Dependencies {
    pub fn empty() -> Self {
        Self {
            resolved: Vec::new(),
        }
    }

    /// The dependency injected at `index`, downcast to `T`
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, Error> {
        let (descriptor, instance) = self
            .resolved
            .iter()
            .find(|(d, _)| d.index == index)
            .ok_or_else(|| {
                Error::InvalidProvider(format!("no dependency declared at index {}", index))
            })?;

        instance.clone().downcast::<T>().map_err(|_| {
            Error::InvalidProvider(format!(
                "dependency {} at index {} is not a {}",
                descriptor.token,
                index,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Types the container knows how to construct.
///
/// `injections` declares which tokens feed which constructor position; the
/// container resolves them in ascending index order and hands them to
/// `construct`.
///
/// ```
/// use trellis_core::{Dependencies, Error, Injectable, InjectionDescriptor};
/// use std::sync::Arc;
///
/// struct Repository;
///
/// impl Injectable for Repository {
///     fn construct(_: Dependencies) -> Result<Self, Error> {
///         Ok(Repository)
///     }
/// }
///
/// struct UserService {
///     repo: Arc<Repository>,
/// }
///
/// impl Injectable for UserService {
///     fn injections() -> Vec<InjectionDescriptor> {
///         vec![InjectionDescriptor::of::<Repository>(0)]
///     }
///
///     fn construct(deps: Dependencies) -> Result<Self, Error> {
///         Ok(UserService { repo: deps.get(0)? })
///     }
/// }
/// ```
pub trait Injectable: Send + Sync + Sized + 'static {
    fn injections() -> Vec<InjectionDescriptor> {
        Vec::new()
    }

    /// Scope used when the type is registered without an explicit one
    fn scope() -> Scope {
        Scope::Singleton
    }

    fn construct(deps: Dependencies) -> Result<Self, Error>;
}

fn construct_class<T: Injectable>(deps: Dependencies) -> Result<AnyArc, Error> {
    Ok(Arc::new(T::construct(deps)?))
}

#[derive(Clone)]
enum Strategy {
    Class {
        construct: ConstructFn,
        injections: Vec<InjectionDescriptor>,
    },
    Factory(FactoryFn),
    Value(AnyArc),
}

/// How a token is turned into an instance, plus its scope
#[derive(Clone)]
pub struct ProviderDescriptor {
    token: Token,
    strategy: Strategy,
    scope: Scope,
    dispose: Option<DisposeFn>,
}

impl ProviderDescriptor {
    /// Instantiate `T` through its `Injectable` implementation
    pub fn class<T: Injectable>() -> Self {
        Self {
            token: Token::of::<T>(),
            strategy: Strategy::Class {
                construct: construct_class::<T>,
                injections: T::injections(),
            },
            scope: T::scope(),
            dispose: None,
        }
    }

    /// Produce instances with a factory that may resolve other tokens
    pub fn factory<T, F>(token: Token, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            token,
            strategy: Strategy::Factory(Arc::new(move |resolver| {
                Ok(Arc::new(factory(resolver)?) as AnyArc)
            })),
            scope: Scope::Singleton,
            dispose: None,
        }
    }

    /// Bind a fixed instance
    pub fn value<T: Send + Sync + 'static>(token: Token, instance: T) -> Self {
        Self {
            token,
            strategy: Strategy::Value(Arc::new(instance)),
            scope: Scope::Singleton,
            dispose: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Hook run on each `Request`-scoped instance when its scope is disposed
    pub fn on_dispose<T, F>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.dispose = Some(Arc::new(move |instance: &AnyArc| {
            match instance.downcast_ref::<T>() {
                Some(typed) => hook(typed),
                None => Ok(()),
            }
        }));
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    fn validate(&self) -> Result<(), Error> {
        if matches!(self.strategy, Strategy::Value(_)) && self.scope != Scope::Singleton {
            return Err(Error::InvalidProvider(format!(
                "value provider {} must be a singleton, got {:?}",
                self.token, self.scope
            )));
        }
        if let Strategy::Class { injections, .. } = &self.strategy {
            let mut indices: Vec<usize> = injections.iter().map(|d| d.index).collect();
            indices.sort_unstable();
            if indices.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::InvalidProvider(format!(
                    "{} declares two injections at the same index",
                    self.token
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.strategy {
            Strategy::Class { .. } => "class",
            Strategy::Factory(_) => "factory",
            Strategy::Value(_) => "value",
        };
        f.debug_struct("ProviderDescriptor")
            .field("token", &self.token)
            .field("kind", &kind)
            .field("scope", &self.scope)
            .finish()
    }
}

struct Binding {
    descriptor: ProviderDescriptor,
    singleton: OnceCell<AnyArc>,
}

/// Anything tokens can be resolved against: the root container or a
/// request scope.
pub trait Resolver {
    fn resolve_token(&self, token: &Token) -> Result<AnyArc, Error>;

    fn has(&self, token: &Token) -> bool;
}

/// Typed resolution helpers for every [`Resolver`]
pub trait ResolverExt: Resolver {
    fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        downcast(&Token::of::<T>(), self.resolve_token(&Token::of::<T>())?)
    }

    fn resolve_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>, Error> {
        let token = Token::named(name);
        downcast(&token, self.resolve_token(&token)?)
    }
}

impl<R: Resolver + ?Sized> ResolverExt for R {}

pub(crate) fn downcast<T: Send + Sync + 'static>(token: &Token, any: AnyArc) -> Result<Arc<T>, Error> {
    any.downcast::<T>().map_err(|_| {
        Error::InvalidProvider(format!(
            "{} does not produce a {}",
            token,
            std::any::type_name::<T>()
        ))
    })
}

/// The dependency injection container
///
/// Cloning is cheap; clones share bindings and singleton instances.
#[derive(Clone)]
pub struct Container {
    bindings: Arc<RwLock<HashMap<Token, Arc<Binding>>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self {
            bindings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind a provider. Rebinding an already-bound token is rejected.
    pub fn register(&self, descriptor: ProviderDescriptor) -> Result<(), Error> {
        descriptor.validate()?;

        let token = descriptor.token.clone();
        trace!(provider = %token, "Acquiring write lock for registration");
        let mut bindings = self.bindings.write();
        if bindings.contains_key(&token) {
            return Err(Error::DuplicateProvider(token.to_string()));
        }

        let scope = descriptor.scope;
        bindings.insert(
            token.clone(),
            Arc::new(Binding {
                descriptor,
                singleton: OnceCell::new(),
            }),
        );

        debug!(provider = %token, scope = ?scope, "Provider registered in DI container");
        Ok(())
    }

    /// Register a fixed instance under its own type
    pub fn register_value<T: Send + Sync + 'static>(&self, instance: T) -> Result<(), Error> {
        self.register(ProviderDescriptor::value(Token::of::<T>(), instance))
    }

    /// Check if a provider is registered
    pub fn has(&self, token: &Token) -> bool {
        let exists = self.bindings.read().contains_key(token);
        trace!(provider = %token, exists = exists, "Checked provider existence");
        exists
    }

    /// Resolve a provider by type
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        ResolverExt::resolve(self)
    }

    /// Number of bound tokens
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open an isolated scope for one request
    pub fn create_child_scope(&self) -> Arc<RequestScope> {
        let scope = Arc::new(RequestScope {
            id: Uuid::new_v4(),
            root: self.clone(),
            instances: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        trace!(scope_id = %scope.id, "Request scope created");
        scope
    }

    /// Release everything created in `scope`. Safe to call more than once.
    pub fn dispose_child_scope(&self, scope: &RequestScope) {
        scope.dispose();
    }

    /// Check, without constructing anything, that `token` and every token
    /// its class providers inject are bound, acyclic and scope-compatible.
    /// Factory providers are opaque and only checked for presence.
    pub fn verify(&self, token: &Token) -> Result<(), Error> {
        self.verify_in(token, false, &mut Vec::new())
    }

    fn verify_in(&self, token: &Token, root_only: bool, path: &mut Vec<Token>) -> Result<(), Error> {
        if path.contains(token) {
            let mut chain: Vec<String> = path.iter().map(ToString::to_string).collect();
            chain.push(token.to_string());
            return Err(Error::CircularDependency(chain.join(" -> ")));
        }

        let binding = self.binding(token).ok_or_else(|| match path.last() {
            Some(parent) => Error::ProviderNotFound(format!("{} (required by {})", token, parent)),
            None => Error::ProviderNotFound(token.to_string()),
        })?;

        let scope = binding.descriptor.scope;
        if root_only && scope == Scope::Request {
            return Err(Error::ScopeMismatch(format!(
                "{} is request-scoped but is injected into singleton {}",
                token,
                path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
            )));
        }

        if let Strategy::Class { injections, .. } = &binding.descriptor.strategy {
            let root_only = root_only || scope == Scope::Singleton;
            path.push(token.clone());
            for injection in injections {
                self.verify_in(&injection.token, root_only, path)?;
            }
            path.pop();
        }
        Ok(())
    }

    fn binding(&self, token: &Token) -> Option<Arc<Binding>> {
        self.bindings.read().get(token).cloned()
    }

    fn resolve_in(&self, token: &Token, request: Option<&RequestScope>) -> Result<AnyArc, Error> {
        let path = RefCell::new(Vec::new());
        let cx = ResolveCx {
            container: self,
            request,
            path: &path,
        };
        let result = cx.resolve_token(token);
        match &result {
            Ok(_) => trace!(provider = %token, "Provider resolved successfully"),
            Err(e) => debug!(provider = %token, error = %e, "Provider resolution failed"),
        }
        result
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for Container {
    fn resolve_token(&self, token: &Token) -> Result<AnyArc, Error> {
        self.resolve_in(token, None)
    }

    fn has(&self, token: &Token) -> bool {
        Container::has(self, token)
    }
}

/// One resolution in flight. Tracks the chain of tokens being constructed so
/// a constructor cycle fails instead of recursing.
#[derive(Clone, Copy)]
struct ResolveCx<'a> {
    container: &'a Container,
    request: Option<&'a RequestScope>,
    path: &'a RefCell<Vec<Token>>,
}

impl ResolveCx<'_> {
    fn enter(&self, token: &Token) -> Result<(), Error> {
        let mut path = self.path.borrow_mut();
        if path.contains(token) {
            let mut chain: Vec<String> = path.iter().map(ToString::to_string).collect();
            chain.push(token.to_string());
            return Err(Error::CircularDependency(chain.join(" -> ")));
        }
        path.push(token.clone());
        Ok(())
    }

    fn leave(&self) {
        self.path.borrow_mut().pop();
    }

    fn resolve_binding(&self, token: &Token) -> Result<AnyArc, Error> {
        let binding = self
            .container
            .binding(token)
            .ok_or_else(|| Error::ProviderNotFound(token.to_string()))?;

        match binding.descriptor.scope {
            Scope::Singleton => {
                // Singletons only ever see root bindings
                let root = ResolveCx {
                    request: None,
                    ..*self
                };
                binding
                    .singleton
                    .get_or_try_init(|| root.produce(&binding.descriptor))
                    .cloned()
            }
            Scope::Transient => self.produce(&binding.descriptor),
            Scope::Request => {
                let request = self.request.ok_or_else(|| {
                    Error::ScopeMismatch(format!(
                        "{} is request-scoped and cannot be resolved outside a request",
                        token
                    ))
                })?;
                request.get_or_create(token, || self.produce(&binding.descriptor))
            }
        }
    }

    fn produce(&self, descriptor: &ProviderDescriptor) -> Result<AnyArc, Error> {
        match &descriptor.strategy {
            Strategy::Value(instance) => Ok(instance.clone()),
            Strategy::Factory(factory) => factory(self),
            Strategy::Class {
                construct,
                injections,
            } => {
                let mut ordered = injections.clone();
                ordered.sort_by_key(|d| d.index);

                let mut resolved = Vec::with_capacity(ordered.len());
                for injection in ordered {
                    let instance = self.resolve_token(&injection.token)?;
                    resolved.push((injection, instance));
                }

                trace!(provider = %descriptor.token, deps = resolved.len(), "Constructing provider");
                construct(Dependencies { resolved })
            }
        }
    }
}

impl Resolver for ResolveCx<'_> {
    fn resolve_token(&self, token: &Token) -> Result<AnyArc, Error> {
        self.enter(token)?;
        let result = self.resolve_binding(token);
        self.leave();
        result
    }

    fn has(&self, token: &Token) -> bool {
        self.container.has(token)
    }
}

/// Per-request child of the root container.
///
/// Inherits every root binding. `Singleton` tokens resolve to the shared root
/// instance; `Request` tokens are cached here until the scope is disposed.
pub struct RequestScope {
    id: Uuid,
    root: Container,
    instances: Mutex<HashMap<Token, Arc<OnceCell<AnyArc>>>>,
    created: Mutex<Vec<(Token, AnyArc)>>,
    disposed: AtomicBool,
}

impl RequestScope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Container {
        &self.root
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of request-scoped instances currently held
    pub fn instance_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        ResolverExt::resolve(self)
    }

    fn get_or_create<F>(&self, token: &Token, create: F) -> Result<AnyArc, Error>
    where
        F: FnOnce() -> Result<AnyArc, Error>,
    {
        if self.is_disposed() {
            return Err(Error::ScopeMismatch(format!(
                "request scope {} is already disposed; cannot resolve {}",
                self.id, token
            )));
        }

        // The cell is fetched under the lock but initialised outside it, so a
        // constructor may resolve other request-scoped tokens.
        let cell = self
            .instances
            .lock()
            .entry(token.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut fresh = false;
        let instance = cell
            .get_or_try_init(|| {
                fresh = true;
                create()
            })?
            .clone();

        if fresh {
            self.created.lock().push((token.clone(), instance.clone()));
        }
        Ok(instance)
    }

    /// Drop every request-scoped instance, running dispose hooks in reverse
    /// creation order. Hook failures are logged and swallowed.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let created = std::mem::take(&mut *self.created.lock());
        self.instances.lock().clear();
        let count = created.len();

        for (token, instance) in created.into_iter().rev() {
            let Some(hook) = self
                .root
                .binding(&token)
                .and_then(|b| b.descriptor.dispose.clone())
            else {
                continue;
            };

            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&instance)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(scope_id = %self.id, provider = %token, error = %e, "Dispose hook failed")
                }
                Err(_) => {
                    warn!(scope_id = %self.id, provider = %token, "Dispose hook panicked")
                }
            }
        }

        trace!(scope_id = %self.id, released = count, "Request scope disposed");
    }
}

impl Resolver for RequestScope {
    fn resolve_token(&self, token: &Token) -> Result<AnyArc, Error> {
        self.root.resolve_in(token, Some(self))
    }

    fn has(&self, token: &Token) -> bool {
        self.root.has(token)
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Owns a request scope for the duration of one request and disposes it when
/// dropped, whichever way the request ends.
pub struct RequestScopeGuard {
    scope: Arc<RequestScope>,
}

impl RequestScopeGuard {
    pub fn new(scope: Arc<RequestScope>) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &Arc<RequestScope> {
        &self.scope
    }
}

impl Drop for RequestScopeGuard {
    fn drop(&mut self) {
        self.scope.dispose();
    }
}
