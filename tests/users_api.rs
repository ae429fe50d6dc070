//! End-to-end tests of the users demo through the facade crate

#[path = "../demos/users.rs"]
#[allow(dead_code)]
mod users;

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis::prelude::*;
use trellis::{RequestScopeGuard, ResolverExt};
use trellis_testing::*;
use users::{User, UsersService, users_module};

fn client() -> (TestApp, TestClient) {
    let module = users_module();
    let app = TestApp::from_module(&module).unwrap();
    let client = app.client();
    (app, client)
}

#[tokio::test]
async fn test_authenticated_list_returns_handler_value() {
    let (_, client) = client();

    let response = client.get("/users/").bearer("x").send().await;
    assert_status(&response, 200);

    let users: Vec<User> = response.json();
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(users[0].name, "Ada");
}

#[tokio::test]
async fn test_missing_authorization_is_forbidden() {
    let (_, client) = client();

    let response = client.get("/users/").send().await;
    assert_status(&response, 403);
    assert_json(&response, &json!({ "message": "Forbidden" }));

    let response = client.get("/users/").header("authorization", "Basic abc").send().await;
    assert_status(&response, 403);
}

#[tokio::test]
async fn test_invalid_body_is_rejected_before_the_handler() {
    let (app, client) = client();

    let response = client
        .post("/users/")
        .bearer("x")
        .json(&json!({ "name": "A", "email": "bad", "age": 5 }))
        .send()
        .await;

    assert_validation_error(&response, "name", "minLength");
    assert_validation_error(&response, "email", "isEmail");
    assert_validation_error(&response, "age", "min");
    let body: Value = response.json();
    assert_eq!(body["message"], "Validation failed");

    let service = app.get::<UsersService>().unwrap();
    assert_eq!(service.list().await.len(), 2);
}

#[tokio::test]
async fn test_valid_body_creates_user() {
    let (app, client) = client();

    let response = client
        .post("/users")
        .bearer("x")
        .json(&json!({ "name": "Linus", "email": "linus@example.com", "age": 54, "admin": true }))
        .send()
        .await;

    assert_status(&response, 201);
    assert_json(
        &response,
        &json!({ "id": 3, "name": "Linus", "email": "linus@example.com", "age": 54 }),
    );
    assert_eq!(app.get::<UsersService>().unwrap().list().await.len(), 3);
}

#[tokio::test]
async fn test_http_exception_filter_shapes_not_found() {
    let (_, client) = client();

    let response = client.get("/users/99").bearer("x").send().await;
    assert_status(&response, 404);
    assert_json(&response, &json!({ "statusCode": 404, "message": "not found" }));

    let response = client.get("/users/1").bearer("x").send().await;
    assert_status(&response, 200);
    assert_eq!(response.json::<User>().email, "ada@example.com");
}

#[tokio::test]
async fn test_static_segment_wins_over_parameter() {
    let (_, client) = client();

    let response = client.get("/users/count").bearer("x").send().await;
    assert_json(&response, &json!(2));

    let response = client.get("/users/abc").bearer("x").send().await;
    assert_validation_error(&response, "id", "isInt");
}

#[tokio::test]
async fn test_singleton_service_is_shared_across_requests() {
    let (app, client) = client();

    client
        .post("/users")
        .bearer("x")
        .json(&json!({ "name": "Ken", "email": "ken@example.com", "age": 81 }))
        .send()
        .await;

    let first = app.get::<UsersService>().unwrap();
    let second = app.get::<UsersService>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let response = client.get("/users/count").bearer("x").send().await;
    assert_json(&response, &json!(3));
}

struct Visit(usize);

static VISITS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn test_scopes_follow_their_lifetimes() {
    let container = Container::new();
    container
        .register(
            ProviderDescriptor::factory(Token::of::<Visit>(), |_| {
                Ok(Visit(VISITS.fetch_add(1, Ordering::SeqCst)))
            })
            .with_scope(Scope::Request),
        )
        .unwrap();
    container
        .register(
            ProviderDescriptor::factory(Token::named("transient"), |_| Ok(Visit(0)))
                .with_scope(Scope::Transient),
        )
        .unwrap();

    let first = RequestScopeGuard::new(container.create_child_scope());
    let a = first.scope().resolve::<Visit>().unwrap();
    let b = first.scope().resolve::<Visit>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let second = RequestScopeGuard::new(container.create_child_scope());
    let c = second.scope().resolve::<Visit>().unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_ne!(a.0, c.0);

    let x = container.resolve_named::<Visit>("transient").unwrap();
    let y = container.resolve_named::<Visit>("transient").unwrap();
    assert!(!Arc::ptr_eq(&x, &y));
}

#[test]
fn test_layered_imports_bind_each_provider_once() {
    struct A;
    struct B;
    struct C;

    let c = DynamicModule::new("C").with_provider(ProviderDescriptor::value(Token::of::<C>(), C));
    let b = DynamicModule::new("B")
        .with_provider(ProviderDescriptor::value(Token::of::<B>(), B))
        .import(c);
    let a = DynamicModule::new("A")
        .with_provider(ProviderDescriptor::value(Token::of::<A>(), A))
        .import(b);

    let app = Application::from_module(&a).unwrap();
    assert_eq!(app.container().len(), 3);
    assert!(app.container().resolve::<A>().is_ok());
    assert!(app.container().resolve::<B>().is_ok());
    assert!(app.container().resolve::<C>().is_ok());
}
