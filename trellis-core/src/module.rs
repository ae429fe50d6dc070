//! Module system for organizing and composing application components.
//!
//! A module lists the providers it contributes, the controllers it exposes
//! and the modules it imports. The [`ModuleResolver`] walks that graph
//! depth-first, imports before the importing module's own providers and
//! controllers, so dependencies are always bound before their dependents.
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::*;
//!
//! struct Database;
//!
//! impl Injectable for Database {
//!     fn construct(_: Dependencies) -> Result<Self, Error> {
//!         Ok(Database)
//!     }
//! }
//!
//! let database = DynamicModule::new("DatabaseModule").with_provider(ProviderDescriptor::class::<Database>());
//! let app = DynamicModule::new("AppModule").import(database);
//!
//! let container = Container::new();
//! let mut registry = MetadataRegistry::new();
//! let mut router = Router::new();
//! ModuleResolver::new(&container, &mut registry, &mut router)
//!     .register_module(&app)
//!     .unwrap();
//! assert!(container.has(&Token::of::<Database>()));
//! ```
//!
//! A provider bound by more than one module is registered once; the first
//! registration wins. Module names identify modules: a module already
//! registered under a name is skipped when it is imported again, and a
//! module that imports itself, directly or transitively, is a configuration
//! error.

use crate::binder::{RouteBinder, RouteRegistrar};
use crate::controller::{Controller, declare_controller};
use crate::logging::{debug, info, trace};
use crate::metadata::{ClassId, MetadataRegistry};
use crate::pipeline::RouteTarget;
use crate::{Container, Error, ProviderDescriptor, Token};
use std::collections::HashSet;
use std::sync::Arc;

/// Registration information for a controller
#[derive(Clone, Copy)]
pub struct ControllerRegistration {
    pub class: ClassId,
    provider: fn() -> ProviderDescriptor,
    declare: fn(&mut MetadataRegistry),
}

impl ControllerRegistration {
    pub fn of<C: Controller>() -> Self {
        Self {
            class: ClassId::of::<C>(),
            provider: ProviderDescriptor::class::<C>,
            declare: declare_controller::<C>,
        }
    }
}

impl std::fmt::Debug for ControllerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRegistration")
            .field("class", &self.class.name())
            .finish()
    }
}

/// A unit of composition
pub trait Module: Send + Sync + 'static {
    fn providers(&self) -> Vec<ProviderDescriptor> {
        vec![]
    }

    fn controllers(&self) -> Vec<ControllerRegistration> {
        vec![]
    }

    fn imports(&self) -> Vec<Arc<dyn Module>> {
        vec![]
    }

    /// Identity of the module within one application
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once the module's imports, providers and controllers are
    /// registered
    fn on_module_init(&self, _container: &Container) -> Result<(), Error> {
        Ok(())
    }
}

/// A module assembled at runtime
#[derive(Clone)]
pub struct DynamicModule {
    name: String,
    providers: Vec<ProviderDescriptor>,
    controllers: Vec<ControllerRegistration>,
    imports: Vec<Arc<dyn Module>>,
}

impl DynamicModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            providers: vec![],
            controllers: vec![],
            imports: vec![],
        }
    }

    pub fn with_provider(mut self, provider: ProviderDescriptor) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_providers(mut self, providers: Vec<ProviderDescriptor>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn with_controller<C: Controller>(mut self) -> Self {
        self.controllers.push(ControllerRegistration::of::<C>());
        self
    }

    pub fn import<M: Module>(mut self, module: M) -> Self {
        self.imports.push(Arc::new(module));
        self
    }

    pub fn import_shared(mut self, module: Arc<dyn Module>) -> Self {
        self.imports.push(module);
        self
    }
}

impl Module for DynamicModule {
    fn providers(&self) -> Vec<ProviderDescriptor> {
        self.providers.clone()
    }

    fn controllers(&self) -> Vec<ControllerRegistration> {
        self.controllers.clone()
    }

    fn imports(&self) -> Vec<Arc<dyn Module>> {
        self.imports.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Walks a module graph, binding providers and routes
pub struct ModuleResolver<'a> {
    container: &'a Container,
    registry: &'a mut MetadataRegistry,
    registrar: &'a mut dyn RouteRegistrar,
    stack: Vec<String>,
    completed: HashSet<String>,
    bound: HashSet<ClassId>,
    routes: Vec<RouteTarget>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(
        container: &'a Container,
        registry: &'a mut MetadataRegistry,
        registrar: &'a mut dyn RouteRegistrar,
    ) -> Self {
        Self {
            container,
            registry,
            registrar,
            stack: Vec::new(),
            completed: HashSet::new(),
            bound: HashSet::new(),
            routes: Vec::new(),
        }
    }

    /// Routes bound so far, in binding order
    pub fn routes(&self) -> &[RouteTarget] {
        &self.routes
    }

    pub fn into_routes(self) -> Vec<RouteTarget> {
        self.routes
    }

    /// Register `module` and everything it imports.
    ///
    /// Afterwards every bound controller's dependency graph is verified, so
    /// a missing provider fails here rather than on the first request.
    pub fn register_module(&mut self, module: &dyn Module) -> Result<(), Error> {
        self.walk(module)?;
        for class in &self.bound {
            self.container.verify(&Token::from(*class))?;
        }
        Ok(())
    }

    fn walk(&mut self, module: &dyn Module) -> Result<(), Error> {
        let name = module.name().to_string();

        if self.stack.contains(&name) {
            let mut chain = self.stack.clone();
            chain.push(name);
            return Err(Error::Configuration(format!(
                "cyclic module import: {}",
                chain.join(" -> ")
            )));
        }
        if self.completed.contains(&name) {
            trace!(module = %name, "Module already registered");
            return Ok(());
        }

        self.stack.push(name.clone());
        debug!(module = %name, depth = self.stack.len(), "Registering module");

        for import in module.imports() {
            self.walk(import.as_ref())?;
        }

        for provider in module.providers() {
            if self.container.has(provider.token()) {
                trace!(provider = %provider.token(), module = %name, "Provider already bound, skipping");
                continue;
            }
            self.container.register(provider)?;
        }

        for controller in module.controllers() {
            self.register_controller(controller)?;
        }

        module.on_module_init(self.container)?;

        self.stack.pop();
        self.completed.insert(name.clone());
        info!(module = %name, "Module initialized");
        Ok(())
    }

    fn register_controller(&mut self, controller: ControllerRegistration) -> Result<(), Error> {
        let class = controller.class;
        if !self.bound.insert(class) {
            trace!(controller = class.short_name(), "Controller already bound");
            return Ok(());
        }

        (controller.declare)(self.registry);

        let token = Token::from(class);
        if !self.container.has(&token) {
            let mut provider = (controller.provider)();
            if let Some(scope) = self.registry.scope(class) {
                provider = provider.with_scope(scope);
            }
            self.container.register(provider)?;
        }

        let bound = RouteBinder::new(self.registry).bind(class, &mut *self.registrar)?;
        info!(
            controller = class.short_name(),
            prefix = self.registry.prefix(class),
            routes = bound.len(),
            "Controller bound"
        );
        self.routes.extend(bound);
        Ok(())
    }
}
