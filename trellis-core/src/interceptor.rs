// Interceptors wrapping everything downstream of them

use crate::logging::{info, warn};
use crate::{Error, HttpResponse, Next, RequestContext};
use async_trait::async_trait;

/// Interceptor trait for request/response transformation
///
/// Runs after middleware and before guards. Calling `next` runs the rest of
/// the route; the interceptor may inspect or replace its outcome.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Records method, path, status and elapsed time for every call
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = context.request.method;
        let path = context.request.path.clone();
        let handler = context.route().handler;

        let result = next(context).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(response) => info!(
                %method,
                %path,
                handler,
                status = response.status,
                elapsed_ms,
                "Handled"
            ),
            Err(e) => warn!(%method, %path, handler, error = %e, elapsed_ms, "Failed"),
        }

        result
    }
}

/// Applies a closure to every successful response
pub struct TransformInterceptor<F>
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    transform: F,
}

impl<F> TransformInterceptor<F>
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl<F> Interceptor for TransformInterceptor<F>
where
    F: Fn(HttpResponse) -> HttpResponse + Send + Sync,
{
    async fn intercept(&self, context: RequestContext, next: Next) -> Result<HttpResponse, Error> {
        let response = next(context).await?;
        Ok((self.transform)(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpMethod, HttpRequest, next_fn};

    fn ok_next() -> Next {
        next_fn(|_ctx| async { Ok(HttpResponse::ok().with_body(b"x".to_vec())) })
    }

    #[tokio::test]
    async fn test_transform_interceptor() {
        let interceptor =
            TransformInterceptor::new(|response: HttpResponse| response.with_header("x-wrapped", "1"));
        let ctx = RequestContext::detached(HttpRequest::new(HttpMethod::GET, "/"));

        let response = interceptor.intercept(ctx, ok_next()).await.unwrap();
        assert_eq!(response.header("x-wrapped"), Some(&"1".to_string()));
        assert_eq!(response.body, b"x");
    }

    #[tokio::test]
    async fn test_logging_interceptor_passes_errors_through() {
        let ctx = RequestContext::detached(HttpRequest::new(HttpMethod::GET, "/"));
        let next = next_fn(|_ctx| async { Err(Error::NotFound("gone".into())) });

        let result = LoggingInterceptor.intercept(ctx, next).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
