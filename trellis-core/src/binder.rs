// Route binder: turns controller metadata into registered stage chains

use crate::logging::debug;
use crate::metadata::{ClassId, MetadataRegistry, RouteDescriptor};
use crate::pipeline::{
    BoxedStage, DispatchStage, FilterStage, GuardStage, InterceptorStage, MiddlewareStage,
    RouteTarget,
};
use crate::{Error, HttpMethod};
use std::collections::HashSet;
use std::sync::Arc;

/// The server's route-registration primitive
pub trait RouteRegistrar {
    fn register(
        &mut self,
        method: HttpMethod,
        path: &str,
        target: RouteTarget,
        stages: Vec<BoxedStage>,
    ) -> Result<(), Error>;
}

/// Join a controller prefix and a route path into one normalized path.
///
/// Empty segments are dropped, so `"/users/"` + `"/"` is `"/users"` and two
/// empty parts are `"/"`.
pub fn join_paths(prefix: &str, path: &str) -> String {
    let segments: Vec<&str> = prefix
        .split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Reads controller metadata and composes one stage chain per route
pub struct RouteBinder<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> RouteBinder<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    /// Compose the stages of one route in their fixed order: class then
    /// method middleware, class then method interceptors, guards, filters,
    /// dispatch.
    pub fn compose(&self, class: ClassId, route: &RouteDescriptor) -> Result<Vec<BoxedStage>, Error> {
        let registry = self.registry;
        let method = Some(route.handler);

        let handler = registry.handler(class, route.handler).ok_or_else(|| {
            Error::Configuration(format!("{}::{} has no handler", class.short_name(), route.handler))
        })?;

        let params = registry.params(class, route.handler);
        let mut seen = HashSet::new();
        if let Some(dup) = params.iter().find(|p| !seen.insert(p.index)) {
            return Err(Error::Configuration(format!(
                "{}::{} binds parameter {} twice",
                class.short_name(),
                route.handler,
                dup.index
            )));
        }

        let mut stages: Vec<BoxedStage> = Vec::new();

        for middleware in registry
            .middleware(class, None)
            .into_iter()
            .chain(registry.middleware(class, method))
        {
            stages.push(Arc::new(MiddlewareStage(middleware)));
        }

        for interceptor in registry
            .interceptors(class, None)
            .into_iter()
            .chain(registry.interceptors(class, method))
        {
            stages.push(Arc::new(InterceptorStage(interceptor)));
        }

        let mut guards = registry.guards(class, None);
        guards.extend(registry.guards(class, method));
        stages.push(Arc::new(GuardStage::new(guards)));

        let mut filters = registry.filters(class, None);
        filters.extend(registry.filters(class, method));
        stages.push(Arc::new(FilterStage::new(filters)));

        stages.push(Arc::new(DispatchStage::new(
            class,
            route.handler,
            handler,
            params,
            registry.pipes(class, method),
            registry.http_code(class, route.handler),
        )));

        Ok(stages)
    }

    /// Register every route of `class` with `registrar`. Returns the bound
    /// targets in declaration order.
    pub fn bind(
        &self,
        class: ClassId,
        registrar: &mut dyn RouteRegistrar,
    ) -> Result<Vec<RouteTarget>, Error> {
        let prefix = self.registry.prefix(class);
        let routes = self.registry.routes(class);
        if routes.is_empty() {
            debug!(controller = class.short_name(), "Controller declares no routes");
        }

        let mut bound = Vec::with_capacity(routes.len());
        for route in routes {
            let target = RouteTarget {
                class,
                handler: route.handler,
                method: route.method,
                path: join_paths(prefix, &route.path),
            };
            let stages = self.compose(class, &route)?;
            debug!(
                controller = class.short_name(),
                handler = route.handler,
                method = %target.method,
                path = %target.path,
                stages = stages.len(),
                "Route bound"
            );
            registrar.register(target.method, &target.path, target.clone(), stages)?;
            bound.push(target);
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Arguments, Controller, ControllerDecl, declare_controller};
    use crate::{
        AuthenticationGuard, Dependencies, HttpExceptionFilter, Injectable, LoggingInterceptor,
        ParamSource, RequestIdMiddleware,
    };
    use serde_json::Value;

    #[derive(Default)]
    struct Recording {
        routes: Vec<(HttpMethod, String, Vec<String>)>,
    }

    impl RouteRegistrar for Recording {
        fn register(
            &mut self,
            method: HttpMethod,
            path: &str,
            _target: RouteTarget,
            stages: Vec<BoxedStage>,
        ) -> Result<(), Error> {
            let names = stages.iter().map(|s| s.name().to_string()).collect();
            self.routes.push((method, path.to_string(), names));
            Ok(())
        }
    }

    struct OrdersController;

    impl Injectable for OrdersController {
        fn construct(_: Dependencies) -> Result<Self, Error> {
            Ok(OrdersController)
        }
    }

    impl OrdersController {
        async fn list(self: Arc<Self>, _: Arguments) -> Result<Value, Error> {
            Ok(Value::Null)
        }
    }

    impl Controller for OrdersController {
        fn declare(decl: &mut ControllerDecl<'_, Self>) {
            decl.prefix("/orders/")
                .middleware(RequestIdMiddleware)
                .interceptor(LoggingInterceptor)
                .guard(AuthenticationGuard)
                .filter(HttpExceptionFilter);
            decl.get("/", "list", Self::list);
            decl.get("/:id", "show", Self::list)
                .param(0, ParamSource::Path("id".into()));
            decl.method("internal", Self::list);
        }
    }

    struct BrokenController;

    impl Injectable for BrokenController {
        fn construct(_: Dependencies) -> Result<Self, Error> {
            Ok(BrokenController)
        }
    }

    impl BrokenController {
        async fn show(self: Arc<Self>, _: Arguments) -> Result<Value, Error> {
            Ok(Value::Null)
        }
    }

    impl Controller for BrokenController {
        fn declare(decl: &mut ControllerDecl<'_, Self>) {
            decl.get("/x", "show", Self::show)
                .param(0, ParamSource::Body)
                .param(0, ParamSource::Query("q".into()));
        }
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/users", "/"), "/users");
        assert_eq!(join_paths("users/", ":id"), "/users/:id");
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/api//v1/", "/items//:id/"), "/api/v1/items/:id");
    }

    #[test]
    fn test_binds_routes_with_fixed_stage_order() {
        let mut registry = MetadataRegistry::new();
        declare_controller::<OrdersController>(&mut registry);
        let mut recording = Recording::default();

        let bound = RouteBinder::new(&registry)
            .bind(ClassId::of::<OrdersController>(), &mut recording)
            .unwrap();

        assert_eq!(bound.len(), 2);
        assert_eq!(recording.routes[0].0, HttpMethod::GET);
        assert_eq!(recording.routes[0].1, "/orders");
        assert_eq!(recording.routes[1].1, "/orders/:id");

        let names = &recording.routes[0].2;
        assert_eq!(names.len(), 5);
        assert!(names[0].ends_with("RequestIdMiddleware"));
        assert!(names[1].ends_with("LoggingInterceptor"));
        assert_eq!(names[2], "guards");
        assert_eq!(names[3], "filters");
        assert_eq!(names[4], "list");
    }

    #[test]
    fn test_duplicate_parameter_index_is_rejected() {
        let mut registry = MetadataRegistry::new();
        declare_controller::<BrokenController>(&mut registry);

        let result = RouteBinder::new(&registry)
            .bind(ClassId::of::<BrokenController>(), &mut Recording::default());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
