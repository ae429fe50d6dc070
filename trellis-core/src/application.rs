// Application bootstrapper and HTTP server

use crate::logging::{debug, info, warn};
use crate::module::ModuleResolver;
use crate::pipeline::RouteTarget;
use crate::{
    Container, Error, HttpMethod, HttpRequest, HttpResponse, MetadataRegistry, Module, Router,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Largest request body the server reads unless configured otherwise
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// A bootstrapped application: container, metadata and bound routes.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct Application {
    container: Container,
    registry: Arc<MetadataRegistry>,
    router: Arc<Router>,
    body_limit: usize,
}

impl Application {
    /// Bootstrap from a root module type
    pub fn create<M: Module + Default>() -> Result<Self, Error> {
        Self::from_module(&M::default())
    }

    /// Bootstrap from a root module value.
    ///
    /// Any configuration error (missing or cyclic provider, conflicting
    /// routes, cyclic module imports) aborts startup.
    pub fn from_module(module: &dyn Module) -> Result<Self, Error> {
        Self::with_container(Container::new(), module)
    }

    /// Bootstrap into a container that may already hold providers
    pub fn with_container(container: Container, module: &dyn Module) -> Result<Self, Error> {
        info!(module = module.name(), "Bootstrapping application");

        let mut registry = MetadataRegistry::new();
        let mut router = Router::new();
        let routes = {
            let mut resolver = ModuleResolver::new(&container, &mut registry, &mut router);
            resolver.register_module(module)?;
            resolver.into_routes()
        };

        info!(
            providers = container.len(),
            routes = routes.len(),
            "Application bootstrap complete"
        );

        Ok(Self {
            container,
            registry: Arc::new(registry),
            router: Arc::new(router),
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    /// Cap request bodies read by the server at `bytes`; larger ones get a 413
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Bound routes in registration order
    pub fn routes(&self) -> Vec<RouteTarget> {
        self.router.routes().cloned().collect()
    }

    /// Dispatch one request in-process
    ///
    /// ```
    /// use trellis_core::{Application, DynamicModule, HttpMethod, HttpRequest};
    ///
    /// # tokio_test::block_on(async {
    /// let app = Application::from_module(&DynamicModule::new("Empty")).unwrap();
    /// let response = app.handle(HttpRequest::new(HttpMethod::GET, "/missing")).await;
    /// assert_eq!(response.status, 404);
    /// # });
    /// ```
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        self.router.dispatch(request, &self.container).await
    }

    /// Serve HTTP on `port` until Ctrl-C
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Server listening");

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` completes
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let app = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let app = app.clone();
                    async move { handle_request(req, app).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %err, "Error serving connection");
                }
            });
        }
    }
}

/// Translate a hyper request, dispatch it, translate the response back
async fn handle_request(
    req: Request<IncomingBody>,
    app: Application,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let Some(method) = HttpMethod::from_str(req.method().as_str()) else {
        return Ok(into_hyper(HttpResponse::json_with_status(
            405,
            &json!({ "statusCode": 405, "message": "Method Not Allowed" }),
        )));
    };

    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut request = HttpRequest::new(method, target);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    request.body = match read_body(req.into_body(), app.body_limit).await {
        Ok(body) => body,
        Err(response) => return Ok(into_hyper(response)),
    };

    Ok(into_hyper(app.handle(request).await))
}

/// Collect at most `limit` bytes of `body`
async fn read_body<B>(body: B, limit: usize) -> Result<Vec<u8>, HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes().to_vec()),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(limit, "Request body too large");
            Err(HttpResponse::json_with_status(
                413,
                &json!({
                    "statusCode": 413,
                    "message": format!("Request body exceeds {} bytes", limit),
                }),
            ))
        }
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            Err(HttpResponse::json_with_status(
                400,
                &json!({ "statusCode": 400, "message": "Malformed request body" }),
            ))
        }
    }
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Handler produced an invalid response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_hyper_copies_status_and_headers() {
        let response = into_hyper(
            HttpResponse::json_with_status(201, &json!({"id": 1})).with_header("x-request-id", "abc"),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-request-id"], "abc");
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_invalid_status_falls_back_to_500() {
        let response = into_hyper(HttpResponse::new(42));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_body_within_limit_is_read() {
        let body = read_body(Full::new(Bytes::from_static(b"{\"a\":1}")), 16).await.unwrap();
        assert_eq!(body, b"{\"a\":1}".to_vec());
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let response = read_body(Full::new(Bytes::from(vec![b'x'; 32])), 16)
            .await
            .unwrap_err();
        assert_eq!(response.status, 413);
        assert_eq!(response.body_json().unwrap()["message"], "Request body exceeds 16 bytes");
    }
}
