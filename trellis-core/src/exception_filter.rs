//! Exception filters.
//!
//! A filter converts an error escaping a route into a response. Filters run
//! strictly in attachment order, class filters before method filters, and
//! the first one returning `Some(HttpResponse)` wins; later filters are not
//! consulted. When no filter answers, the error falls through to the
//! router's default error response.
//!
//! ```ignore
//! struct NotFoundFilter;
//!
//! #[async_trait]
//! impl ExceptionFilter for NotFoundFilter {
//!     async fn catch(&self, error: &Error, _ctx: &ExceptionContext) -> Option<HttpResponse> {
//!         matches!(error, Error::NotFound(_))
//!             .then(|| HttpResponse::json_with_status(404, &json!({"error": "missing"})))
//!     }
//! }
//! ```

use crate::logging::trace;
use crate::{Error, HttpMethod, HttpRequest, HttpResponse, RequestContext};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Context information passed to exception filters
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    pub request: HttpRequest,
    /// Identifier of the request scope the error was raised in
    pub request_id: String,
    pub method: HttpMethod,
    pub path: String,
    /// Name of the handler the route is bound to
    pub handler: &'static str,
}

impl ExceptionContext {
    pub fn from_request_context(context: &RequestContext) -> Self {
        Self {
            request: context.request.clone(),
            request_id: context
                .header("x-request-id")
                .cloned()
                .unwrap_or_else(|| context.scope().id().to_string()),
            method: context.request.method,
            path: context.request.path.clone(),
            handler: context.route().handler,
        }
    }
}

/// Converts an error into a response, or declines it
#[async_trait]
pub trait ExceptionFilter: Send + Sync + 'static {
    /// Return `Some` to answer the request, `None` to let the next filter try
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Offer `error` to each filter in order. At most one filter answers.
pub async fn run_filters(
    filters: &[Arc<dyn ExceptionFilter>],
    error: &Error,
    ctx: &ExceptionContext,
) -> Option<HttpResponse> {
    for filter in filters {
        if let Some(response) = filter.catch(error, ctx).await {
            trace!(filter = filter.name(), status = response.status, "Exception filter answered");
            return Some(response);
        }
    }
    None
}

/// The fallback response for an error nothing else handled.
///
/// Structured HTTP exceptions keep their status and message. Validation
/// failures list their errors. Anything else is an opaque 500.
pub fn default_error_response(error: &Error) -> HttpResponse {
    if let Error::Validation(errors) = error {
        return HttpResponse::json_with_status(400, &errors.to_json());
    }
    match error.http_exception() {
        Some((status, message)) => HttpResponse::json_with_status(
            status,
            &json!({ "statusCode": status, "message": message }),
        ),
        None => HttpResponse::json_with_status(
            500,
            &json!({ "statusCode": 500, "message": "Internal server error" }),
        ),
    }
}

/// Baseline filter: answers every error with [`default_error_response`]
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpExceptionFilter;

#[async_trait]
impl ExceptionFilter for HttpExceptionFilter {
    async fn catch(&self, error: &Error, _ctx: &ExceptionContext) -> Option<HttpResponse> {
        Some(default_error_response(error))
    }
}

/// Answers errors matching a predicate with a closure-built response
pub struct CatchFilter<P, R>
where
    P: Fn(&Error) -> bool + Send + Sync + 'static,
    R: Fn(&Error, &ExceptionContext) -> HttpResponse + Send + Sync + 'static,
{
    matches: P,
    respond: R,
}

impl<P, R> CatchFilter<P, R>
where
    P: Fn(&Error) -> bool + Send + Sync + 'static,
    R: Fn(&Error, &ExceptionContext) -> HttpResponse + Send + Sync + 'static,
{
    pub fn new(matches: P, respond: R) -> Self {
        Self { matches, respond }
    }
}

#[async_trait]
impl<P, R> ExceptionFilter for CatchFilter<P, R>
where
    P: Fn(&Error) -> bool + Send + Sync + 'static,
    R: Fn(&Error, &ExceptionContext) -> HttpResponse + Send + Sync + 'static,
{
    async fn catch(&self, error: &Error, ctx: &ExceptionContext) -> Option<HttpResponse> {
        if (self.matches)(error) {
            Some((self.respond)(error, ctx))
        } else {
            None
        }
    }
}
