// In-process HTTP test client

use serde::Serialize;
use serde::de::DeserializeOwned;
use trellis_core::{Application, HttpMethod, HttpRequest, HttpResponse};

/// Drives an [`Application`] without opening a socket
#[derive(Clone)]
pub struct TestClient {
    app: Application,
}

impl TestClient {
    pub fn new(app: Application) -> Self {
        Self { app }
    }

    pub fn get(&self, path: &str) -> TestRequestBuilder {
        self.request(HttpMethod::GET, path)
    }

    pub fn post(&self, path: &str) -> TestRequestBuilder {
        self.request(HttpMethod::POST, path)
    }

    pub fn put(&self, path: &str) -> TestRequestBuilder {
        self.request(HttpMethod::PUT, path)
    }

    pub fn patch(&self, path: &str) -> TestRequestBuilder {
        self.request(HttpMethod::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> TestRequestBuilder {
        self.request(HttpMethod::DELETE, path)
    }

    pub fn request(&self, method: HttpMethod, path: &str) -> TestRequestBuilder {
        TestRequestBuilder::new(self.app.clone(), method, path)
    }

    /// Dispatch an already built request
    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse::new(self.app.handle(request).await)
    }
}

/// A request under construction
pub struct TestRequestBuilder {
    app: Application,
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestRequestBuilder {
    fn new(app: Application, method: HttpMethod, path: &str) -> Self {
        Self {
            app,
            method,
            path: path.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body.
    ///
    /// # Panics
    ///
    /// If `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value)
            .unwrap_or_else(|e| panic!("test request body is not serializable: {}", e));
        self.header("content-type", "application/json").body(body)
    }

    /// The request this builder describes
    pub fn build(&self) -> HttpRequest {
        let mut target = self.path.clone();
        if !self.query.is_empty() {
            // Encoding string pairs cannot fail
            let encoded = serde_urlencoded::to_string(&self.query).unwrap_or_default();
            target.push(if target.contains('?') { '&' } else { '?' });
            target.push_str(&encoded);
        }

        let mut request = HttpRequest::new(self.method, target);
        for (name, value) in &self.headers {
            request = request.with_header(name, value.as_str());
        }
        request.with_body(self.body.clone())
    }

    pub async fn send(self) -> TestResponse {
        let request = self.build();
        TestResponse::new(self.app.handle(request).await)
    }
}

/// The response to a test request
#[derive(Debug, Clone)]
pub struct TestResponse {
    response: HttpResponse,
}

impl TestResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self { response }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.response.body).into_owned()
    }

    /// Deserialize the JSON body.
    ///
    /// # Panics
    ///
    /// If the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.response.body).unwrap_or_else(|e| {
            panic!(
                "response body is not the expected JSON ({}): {}",
                e,
                self.text()
            )
        })
    }

    pub fn into_inner(self) -> HttpResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::DynamicModule;

    fn client() -> TestClient {
        TestClient::new(Application::from_module(&DynamicModule::new("Empty")).unwrap())
    }

    #[test]
    fn test_builder_assembles_request() {
        let request = client()
            .post("/items?page=2")
            .bearer("abc")
            .query("q", "a b")
            .json(&serde_json::json!({ "name": "x" }))
            .build();

        assert_eq!(request.method, HttpMethod::POST);
        assert_eq!(request.path, "/items?page=2&q=a+b");
        assert_eq!(request.header("authorization").map(String::as_str), Some("Bearer abc"));
        assert_eq!(request.header("content-type").map(String::as_str), Some("application/json"));
        assert_eq!(request.body_value().unwrap()["name"], "x");
    }

    #[tokio::test]
    async fn test_unrouted_request_is_404() {
        let response = client().get("/missing").send().await;
        assert_eq!(response.status(), 404);
        assert_eq!(response.json::<serde_json::Value>()["statusCode"], 404);
    }
}
