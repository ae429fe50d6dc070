// Routing system for HTTP requests

use crate::binder::RouteRegistrar;
use crate::container::RequestScopeGuard;
use crate::exception_filter::default_error_response;
use crate::logging::{debug, error, trace};
use crate::pipeline::{BoxedStage, Next, RequestContext, RequestStage, RouteTarget, StageChain};
use crate::{Container, Error, HttpMethod, HttpRequest, HttpResponse};
use async_trait::async_trait;
use matchit::Router as MatchitRouter;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Methods offered in an `allow` header, in this order
const ALLOW_ORDER: [HttpMethod; 6] = [
    HttpMethod::GET,
    HttpMethod::HEAD,
    HttpMethod::POST,
    HttpMethod::PUT,
    HttpMethod::PATCH,
    HttpMethod::DELETE,
];

struct RouteEntry {
    target: Arc<RouteTarget>,
    chain: StageChain,
    /// The route's middleware followed by an empty 204
    preflight: StageChain,
}

/// Ends a preflight chain nothing else answered
struct PreflightStage;

#[async_trait]
impl RequestStage for PreflightStage {
    async fn handle(&self, _context: RequestContext, _next: Next) -> Result<HttpResponse, Error> {
        Ok(HttpResponse::no_content())
    }

    fn name(&self) -> &str {
        "preflight"
    }
}

type Params = HashMap<String, String>;

/// Method-keyed radix trees of bound routes
#[derive(Default)]
pub struct Router {
    trees: HashMap<HttpMethod, MatchitRouter<usize>>,
    entries: Vec<RouteEntry>,
}

/// Convert `:name` and `*name` segments into the `{name}` / `{*name}` form
/// the radix tree understands.
fn to_tree_syntax(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Strip a trailing slash, keeping the root path intact
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every bound route, in registration order
    pub fn routes(&self) -> impl Iterator<Item = &RouteTarget> {
        self.entries.iter().map(|e| e.target.as_ref())
    }

    /// Find the route for `method path`, returning its index and the
    /// percent-decoded path params
    fn lookup(&self, method: HttpMethod, path: &str) -> Result<Option<(usize, Params)>, Error> {
        let Some(matched) = self
            .trees
            .get(&method)
            .and_then(|tree| tree.at(normalize(path)).ok())
        else {
            return Ok(None);
        };

        let params = matched
            .params
            .iter()
            .map(|(key, raw)| {
                let value = urlencoding::decode(raw).map_err(|e| {
                    Error::BadRequest(format!("path parameter {} is not valid UTF-8: {}", key, e))
                })?;
                Ok((key.to_owned(), value.into_owned()))
            })
            .collect::<Result<Params, Error>>()?;
        Ok(Some((*matched.value, params)))
    }

    /// Methods with a route matching `path`, and the first such route
    fn allowed(&self, path: &str) -> (Vec<HttpMethod>, Option<usize>) {
        let mut methods = Vec::new();
        let mut first = None;
        for method in ALLOW_ORDER {
            if let Some(matched) = self.trees.get(&method).and_then(|t| t.at(normalize(path)).ok()) {
                methods.push(method);
                first.get_or_insert(*matched.value);
            }
        }
        (methods, first)
    }

    /// Run `request` through its route, creating and tearing down a request
    /// scope around it. Never fails: every error becomes a response.
    pub async fn dispatch(&self, mut request: HttpRequest, container: &Container) -> HttpResponse {
        if let Some((path, query)) = request.path.split_once('?') {
            let query = query.to_string();
            request.path = path.to_string();
            match serde_urlencoded::from_str::<Vec<(String, String)>>(&query) {
                Ok(pairs) => request.query_params.extend(pairs),
                Err(e) => {
                    return default_error_response(&Error::BadRequest(format!(
                        "malformed query string: {}",
                        e
                    )));
                }
            }
        }

        let (index, params) = match self.lookup(request.method, &request.path) {
            Ok(Some(found)) => found,
            Ok(None) if request.method == HttpMethod::OPTIONS => {
                return self.preflight(request, container).await;
            }
            Ok(None) => return not_found(&request),
            Err(e) => return default_error_response(&e),
        };
        request.path_params = params;

        let entry = &self.entries[index];
        Self::run(entry, &entry.chain, request, container).await
    }

    /// Answer an `OPTIONS` request for a path bound under other methods by
    /// running the first such route's middleware. Guards, interceptors and
    /// the handler do not run.
    async fn preflight(&self, request: HttpRequest, container: &Container) -> HttpResponse {
        let (methods, first) = self.allowed(&request.path);
        let Some(index) = first else {
            return not_found(&request);
        };
        trace!(path = %request.path, routes = methods.len(), "Answering preflight");

        let allow = methods
            .iter()
            .map(HttpMethod::as_str)
            .chain(std::iter::once("OPTIONS"))
            .collect::<Vec<_>>()
            .join(", ");

        let entry = &self.entries[index];
        let response = Self::run(entry, &entry.preflight, request, container).await;
        response.with_header("allow", allow)
    }

    /// Run `chain` inside a fresh request scope, torn down before returning
    async fn run(
        entry: &RouteEntry,
        chain: &StageChain,
        request: HttpRequest,
        container: &Container,
    ) -> HttpResponse {
        let guard = RequestScopeGuard::new(container.create_child_scope());
        let context = RequestContext::new(request, guard.scope().clone(), entry.target.clone());
        let shared = context.clone();

        let response = match chain.run(context).await {
            Ok(response) => response,
            Err(e) if e.is_configuration_error() => {
                error!(handler = entry.target.handler, error = %e, "Route is misconfigured");
                default_error_response(&e)
            }
            Err(e) => {
                debug!(handler = entry.target.handler, error = %e, "Unfiltered error");
                default_error_response(&e)
            }
        };

        drop(guard);
        shared.apply_deferred(response)
    }
}

fn not_found(request: &HttpRequest) -> HttpResponse {
    trace!(method = %request.method, path = %request.path, "No route matched");
    HttpResponse::json_with_status(
        404,
        &json!({
            "statusCode": 404,
            "message": format!("Cannot {} {}", request.method, request.path),
        }),
    )
}

impl RouteRegistrar for Router {
    fn register(
        &mut self,
        method: HttpMethod,
        path: &str,
        target: RouteTarget,
        stages: Vec<BoxedStage>,
    ) -> Result<(), Error> {
        let pattern = to_tree_syntax(normalize(path));
        let index = self.entries.len();

        self.trees
            .entry(method)
            .or_default()
            .insert(pattern.as_str(), index)
            .map_err(|e| Error::RouteConflict(format!("{} {}: {}", method, path, e)))?;

        let preflight = stages
            .iter()
            .filter(|stage| stage.runs_on_preflight())
            .cloned()
            .chain(std::iter::once(Arc::new(PreflightStage) as BoxedStage))
            .collect();

        self.entries.push(RouteEntry {
            target: Arc::new(target),
            chain: StageChain::new(stages),
            preflight: StageChain::new(preflight),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ClassId;
    use crate::pipeline::{RequestStage, Next};
    use async_trait::async_trait;

    /// Echoes the matched params and query back as JSON
    struct Echo;

    #[async_trait]
    impl RequestStage for Echo {
        async fn handle(&self, ctx: RequestContext, _next: Next) -> Result<HttpResponse, Error> {
            HttpResponse::ok().with_json(&json!({
                "params": ctx.request.path_params,
                "query": ctx.request.query_params,
            }))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct Fails;

    #[async_trait]
    impl RequestStage for Fails {
        async fn handle(&self, _ctx: RequestContext, _next: Next) -> Result<HttpResponse, Error> {
            Err(Error::Internal("secret detail".into()))
        }

        fn name(&self) -> &str {
            "fails"
        }
    }

    fn target(method: HttpMethod, path: &str) -> RouteTarget {
        RouteTarget {
            class: ClassId::of::<()>(),
            handler: "test",
            method,
            path: path.to_string(),
        }
    }

    fn router_with(method: HttpMethod, path: &str, stage: BoxedStage) -> Router {
        let mut router = Router::new();
        router
            .register(method, path, target(method, path), vec![stage])
            .unwrap();
        router
    }

    #[test]
    fn test_tree_syntax() {
        assert_eq!(to_tree_syntax("/users/:id"), "/users/{id}");
        assert_eq!(to_tree_syntax("/files/*rest"), "/files/{*rest}");
        assert_eq!(to_tree_syntax("/plain"), "/plain");
    }

    #[tokio::test]
    async fn test_dispatch_extracts_params_and_query() {
        let router = router_with(HttpMethod::GET, "/users/:id", Arc::new(Echo));
        let response = router
            .dispatch(
                HttpRequest::new(HttpMethod::GET, "/users/7/?sort=name&q=a%20b"),
                &Container::new(),
            )
            .await;

        assert_eq!(response.status, 200);
        let body = response.body_json().unwrap();
        assert_eq!(body["params"]["id"], "7");
        assert_eq!(body["query"]["sort"], "name");
        assert_eq!(body["query"]["q"], "a b");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let router = router_with(HttpMethod::GET, "/users", Arc::new(Echo));
        let response = router
            .dispatch(HttpRequest::new(HttpMethod::POST, "/users"), &Container::new())
            .await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_root_path_matches_with_and_without_slash() {
        let router = router_with(HttpMethod::GET, "/", Arc::new(Echo));
        let container = Container::new();
        assert_eq!(router.dispatch(HttpRequest::new(HttpMethod::GET, "/"), &container).await.status, 200);
        assert_eq!(router.dispatch(HttpRequest::new(HttpMethod::GET, ""), &container).await.status, 200);
    }

    #[tokio::test]
    async fn test_unfiltered_error_is_opaque_500() {
        let router = router_with(HttpMethod::GET, "/boom", Arc::new(Fails));
        let response = router
            .dispatch(HttpRequest::new(HttpMethod::GET, "/boom"), &Container::new())
            .await;
        assert_eq!(response.status, 500);
        assert_eq!(
            response.body_json().unwrap(),
            json!({"statusCode": 500, "message": "Internal server error"})
        );
    }

    #[test]
    fn test_duplicate_route_conflicts() {
        let mut router = router_with(HttpMethod::GET, "/users/:id", Arc::new(Echo));
        let result = router.register(
            HttpMethod::GET,
            "/users/:id/",
            target(HttpMethod::GET, "/users/:id"),
            vec![Arc::new(Echo)],
        );
        assert!(matches!(result, Err(Error::RouteConflict(_))));

        router
            .register(
                HttpMethod::DELETE,
                "/users/:id",
                target(HttpMethod::DELETE, "/users/:id"),
                vec![Arc::new(Echo)],
            )
            .unwrap();
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn test_path_params_are_percent_decoded() {
        let router = router_with(HttpMethod::GET, "/users/:name", Arc::new(Echo));
        let container = Container::new();

        let response = router
            .dispatch(HttpRequest::new(HttpMethod::GET, "/users/a%20b?q=a%20b"), &container)
            .await;
        let body = response.body_json().unwrap();
        assert_eq!(body["params"]["name"], "a b");
        assert_eq!(body["params"]["name"], body["query"]["q"]);

        let response = router
            .dispatch(HttpRequest::new(HttpMethod::GET, "/users/%FF"), &container)
            .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_options_runs_only_route_middleware() {
        use crate::middleware::CorsMiddleware;
        use crate::pipeline::MiddlewareStage;

        let mut router = Router::new();
        for method in [HttpMethod::DELETE, HttpMethod::GET] {
            router
                .register(
                    method,
                    "/items/:id",
                    target(method, "/items/:id"),
                    vec![
                        Arc::new(MiddlewareStage(Arc::new(CorsMiddleware::new()))),
                        Arc::new(Fails),
                    ],
                )
                .unwrap();
        }
        let container = Container::new();

        let response = router
            .dispatch(HttpRequest::new(HttpMethod::OPTIONS, "/items/3"), &container)
            .await;
        assert_eq!(response.status, 204);
        assert_eq!(response.header("allow"), Some(&"GET, DELETE, OPTIONS".to_string()));
        assert_eq!(response.header("access-control-allow-origin"), Some(&"*".to_string()));
        assert!(response.header("access-control-max-age").is_some());

        let response = router
            .dispatch(HttpRequest::new(HttpMethod::GET, "/items/3"), &container)
            .await;
        assert_eq!(response.status, 500);
        assert_eq!(response.header("access-control-allow-origin"), Some(&"*".to_string()));
    }

    #[tokio::test]
    async fn test_options_without_middleware_lists_methods() {
        let router = router_with(HttpMethod::POST, "/things", Arc::new(Fails));
        let container = Container::new();

        let response = router
            .dispatch(HttpRequest::new(HttpMethod::OPTIONS, "/things/"), &container)
            .await;
        assert_eq!(response.status, 204);
        assert_eq!(response.header("allow"), Some(&"POST, OPTIONS".to_string()));

        let response = router
            .dispatch(HttpRequest::new(HttpMethod::OPTIONS, "/elsewhere"), &container)
            .await;
        assert_eq!(response.status, 404);
    }
}
