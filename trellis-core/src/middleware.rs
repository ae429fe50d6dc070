// Middleware attached to controllers and routes

use crate::logging::{debug, info};
use crate::{Error, HttpMethod, HttpResponse, Next, RequestContext};
use async_trait::async_trait;

/// Middleware trait for processing requests before they reach the handler
///
/// Middleware is the outermost layer of a route. It may rewrite the request,
/// answer without calling `next`, or post-process the response.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// CORS (Cross-Origin Resource Sharing) middleware
pub struct CorsMiddleware {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub allow_credentials: bool,
    pub max_age: u32,
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS, PATCH".to_string(),
            allow_headers: "Content-Type, Authorization, Accept".to_string(),
            allow_credentials: false,
            max_age: 86400,
        }
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_string();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Origin headers go on every response of the request, error responses included
    fn defer_origin(&self, context: &RequestContext) {
        context.defer_header("access-control-allow-origin", self.allow_origin.clone());
        if self.allow_credentials {
            context.defer_header("access-control-allow-credentials", "true");
        }
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        self.defer_origin(&context);

        if context.request.method == HttpMethod::OPTIONS {
            return Ok(HttpResponse::no_content()
                .with_header("access-control-allow-methods", self.allow_methods.clone())
                .with_header("access-control-allow-headers", self.allow_headers.clone())
                .with_header("access-control-max-age", self.max_age.to_string()));
        }

        next(context).await
    }
}

/// Request logging middleware
#[derive(Default)]
pub struct LoggerMiddleware {
    pub log_body: bool,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self { log_body: false }
    }

    pub fn with_body(mut self) -> Self {
        self.log_body = true;
        self
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = context.request.method;
        let path = context.request.path.clone();
        let request_id = context.scope().id();

        if self.log_body {
            debug!(%request_id, %method, %path, body_bytes = context.request.body.len(), "Request received");
        } else {
            debug!(%request_id, %method, %path, "Request received");
        }

        let result = next(context).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(response) => {
                info!(%request_id, %method, %path, status = response.status, elapsed_ms, "Request completed")
            }
            Err(e) => {
                info!(%request_id, %method, %path, error = %e, elapsed_ms, "Request failed")
            }
        }

        result
    }
}

/// Propagates or assigns an `x-request-id` header
pub struct RequestIdMiddleware;

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, mut context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        let request_id = context
            .header("x-request-id")
            .cloned()
            .unwrap_or_else(|| context.scope().id().to_string());

        context
            .request
            .headers
            .insert("x-request-id".to_string(), request_id.clone());
        context.defer_header("x-request-id", request_id);

        next(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpRequest, next_fn};

    fn echo_request_id() -> Next {
        next_fn(|ctx: RequestContext| async move {
            let seen = ctx.header("x-request-id").cloned().unwrap_or_default();
            Ok(HttpResponse::ok().with_body(seen.into_bytes()))
        })
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let ctx = RequestContext::detached(HttpRequest::new(HttpMethod::GET, "/"));
        let expected = ctx.scope().id().to_string();

        let response = RequestIdMiddleware.handle(ctx.clone(), echo_request_id()).await.unwrap();
        let response = ctx.apply_deferred(response);
        assert_eq!(response.header("x-request-id"), Some(&expected));
        assert_eq!(response.body, expected.into_bytes());
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let ctx = RequestContext::detached(
            HttpRequest::new(HttpMethod::GET, "/").with_header("X-Request-Id", "abc"),
        );

        let response = RequestIdMiddleware.handle(ctx.clone(), echo_request_id()).await.unwrap();
        assert_eq!(response.body, b"abc".to_vec());
        assert_eq!(ctx.deferred_headers(), vec![("x-request-id".to_string(), "abc".to_string())]);
    }

    #[tokio::test]
    async fn test_cors_preflight_short_circuits() {
        let ctx = RequestContext::detached(HttpRequest::new(HttpMethod::OPTIONS, "/users"));
        let next = next_fn(|_| async { Err(Error::Internal("handler must not run".into())) });

        let response = CorsMiddleware::new()
            .allow_origin("https://example.com")
            .handle(ctx.clone(), next)
            .await
            .unwrap();
        let response = ctx.apply_deferred(response);

        assert_eq!(response.status, 204);
        assert_eq!(
            response.header("access-control-allow-origin"),
            Some(&"https://example.com".to_string())
        );
        assert!(response.header("access-control-max-age").is_some());
    }

    #[tokio::test]
    async fn test_cors_decorates_responses() {
        let ctx = RequestContext::detached(HttpRequest::new(HttpMethod::GET, "/users"));
        let next = next_fn(|_| async { Ok(HttpResponse::ok()) });

        let response = CorsMiddleware::new()
            .allow_credentials(true)
            .handle(ctx.clone(), next)
            .await
            .unwrap();
        let response = ctx.apply_deferred(response);

        assert_eq!(response.header("access-control-allow-origin"), Some(&"*".to_string()));
        assert_eq!(
            response.header("access-control-allow-credentials"),
            Some(&"true".to_string())
        );
    }

    #[tokio::test]
    async fn test_cors_headers_survive_a_failing_handler() {
        let ctx = RequestContext::detached(HttpRequest::new(HttpMethod::GET, "/users"));
        let next = next_fn(|_| async { Err(Error::NotFound("gone".into())) });

        let result = CorsMiddleware::new().handle(ctx.clone(), next).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(
            ctx.deferred_headers(),
            vec![("access-control-allow-origin".to_string(), "*".to_string())]
        );
    }
}
