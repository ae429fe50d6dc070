//! Integration tests for trellis-testing

use serde_json::{Value, json};
use std::sync::Arc;
use trellis_core::*;
use trellis_testing::*;

/// The collaborator a test replaces
trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        1_700_000_000
    }
}

struct FixedClock {
    at: u64,
    reads: CallRecorder<()>,
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.reads.record(());
        self.at
    }
}

fn clock_token() -> Token {
    Token::named("clock")
}

struct TimeController {
    clock: Arc<Box<dyn Clock>>,
}

impl Injectable for TimeController {
    fn injections() -> Vec<InjectionDescriptor> {
        vec![InjectionDescriptor::new(0, clock_token())]
    }

    fn construct(deps: Dependencies) -> Result<Self, Error> {
        Ok(TimeController {
            clock: deps.get(0)?,
        })
    }
}

impl TimeController {
    async fn now(self: Arc<Self>, _args: Arguments) -> Result<Value, Error> {
        Ok(json!({ "now": self.clock.now() }))
    }

    async fn echo(self: Arc<Self>, args: Arguments) -> Result<Value, Error> {
        let body: Value = args.get(0)?;
        let tag: Option<String> = args.get(1)?;
        Ok(json!({ "body": body, "tag": tag }))
    }
}

impl Controller for TimeController {
    fn declare(decl: &mut ControllerDecl<'_, Self>) {
        decl.prefix("/time");
        decl.get("/", "now", Self::now);
        decl.post("/echo", "echo", Self::echo)
            .guard(AuthenticationGuard)
            .param(0, ParamSource::Body)
            .param(1, ParamSource::Query("tag".into()))
            .http_code(201);
    }
}

fn module() -> DynamicModule {
    let clock: Box<dyn Clock> = Box::new(SystemClock);
    DynamicModule::new("TimeModule")
        .with_provider(ProviderDescriptor::value(clock_token(), clock))
        .with_controller::<TimeController>()
}

#[tokio::test]
async fn test_real_provider_is_used_by_default() {
    let module = module();
    let app = TestApp::from_module(&module).unwrap();

    let response = app.client().get("/time").send().await;
    assert_status(&response, 200);
    assert_json(&response, &json!({ "now": 1_700_000_000u64 }));
}

#[tokio::test]
async fn test_overridden_provider_reaches_the_controller() {
    let reads = CallRecorder::new();
    let fake: Box<dyn Clock> = Box::new(FixedClock {
        at: 42,
        reads: reads.clone(),
    });

    let module = module();
    let app = TestApp::builder(&module)
        .override_provider(ProviderDescriptor::value(clock_token(), fake))
        .build()
        .unwrap();

    let response = app.client().get("/time").send().await;
    assert_json(&response, &json!({ "now": 42 }));
    assert_eq!(reads.count(), 1);
}

#[tokio::test]
async fn test_request_builder_feeds_params_and_guards() {
    let module = module();
    let client = TestApp::from_module(&module).unwrap().client();

    let denied = client.post("/time/echo").json(&json!({ "a": 1 })).send().await;
    assert_status(&denied, 403);
    assert_json(&denied, &json!({ "message": "Forbidden" }));

    let created = client
        .post("/time/echo")
        .bearer("token")
        .query("tag", "v1")
        .json(&json!({ "a": 1 }))
        .send()
        .await;
    assert_status(&created, 201);
    assert_success(&created);
    assert_json(&created, &json!({ "body": { "a": 1 }, "tag": "v1" }));
}

#[tokio::test]
async fn test_unknown_route() {
    let module = module();
    let client = TestApp::from_module(&module).unwrap().client();

    let response = client.delete("/time").send().await;
    assert_client_error(&response);
    assert_body_contains(&response, "Cannot DELETE /time");
}
