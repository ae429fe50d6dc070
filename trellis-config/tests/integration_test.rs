//! Integration tests for trellis-config

use serde::Deserialize;
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use trellis_config::*;
use trellis_core::{
    Application, Arguments, Container, Controller, ControllerDecl, Dependencies, DynamicModule,
    Error, HttpMethod, HttpRequest, Injectable, InjectionDescriptor,
};

fn file_with(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_sources_layer_in_load_order() {
    let json = file_with(".json", r#"{"server": {"port": 3000, "host": "127.0.0.1"}, "name": "base"}"#);
    let toml = file_with(".toml", "name = \"override\"\n\n[server]\nport = 4000\n");
    let dotenv = file_with(".env", "APP_SERVER__HOST=0.0.0.0\nOTHER_KEY=ignored\n# comment\n");

    let config = ConfigManager::with_prefix("APP");
    config
        .load_file(json.path())
        .unwrap()
        .load_file(toml.path())
        .unwrap()
        .load_dotenv(dotenv.path())
        .unwrap();

    assert_eq!(
        config.snapshot(),
        json!({ "server": { "port": 4000, "host": "0.0.0.0" }, "name": "override" })
    );
    assert!(!config.has("other_key"));
}

#[test]
fn test_unsupported_file_is_rejected() {
    let yaml = file_with(".yaml", "port: 1");
    let config = ConfigManager::new();
    assert!(matches!(config.load_file(yaml.path()), Err(ConfigError::Load(_))));
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let broken = file_with(".json", "{ not json");
    let config = ConfigManager::new();
    assert!(matches!(config.load_file(broken.path()), Err(ConfigError::Parse(_))));
}

#[derive(Debug, Deserialize)]
struct DatabaseConfig {
    url: String,
    #[serde(default = "default_pool")]
    pool: u32,
}

fn default_pool() -> u32 {
    8
}

#[derive(Debug, Deserialize)]
struct AppConfig {
    database: DatabaseConfig,
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::url("database.url", &self.database.url, &["postgres"])?;
        ConfigValidator::in_range("database.pool", self.database.pool, 1, 64)
    }
}

#[test]
fn test_typed_provider_is_injectable() {
    let config = ConfigManager::new();
    config.set("database.url", "postgres://localhost/app").unwrap();

    let container = Container::new();
    container.register(config.typed_provider::<AppConfig>().unwrap()).unwrap();

    let app_config = container.resolve::<AppConfig>().unwrap();
    assert_eq!(app_config.database.pool, 8);
}

#[test]
fn test_invalid_typed_config_fails_startup() {
    let config = ConfigManager::new();
    config.set("database.url", "mysql://localhost").unwrap();

    let error: Error = config.typed_provider::<AppConfig>().unwrap_err().into();
    assert!(error.is_configuration_error());
}

struct InfoController {
    config: Arc<ConfigManager>,
}

impl Injectable for InfoController {
    fn injections() -> Vec<InjectionDescriptor> {
        vec![InjectionDescriptor::of::<ConfigManager>(0)]
    }

    fn construct(deps: Dependencies) -> std::result::Result<Self, Error> {
        Ok(InfoController {
            config: deps.get(0)?,
        })
    }
}

impl InfoController {
    async fn info(self: Arc<Self>, _args: Arguments) -> std::result::Result<Value, Error> {
        let name: String = self.config.get("name")?;
        Ok(json!({ "name": name }))
    }
}

impl Controller for InfoController {
    fn declare(decl: &mut ControllerDecl<'_, Self>) {
        decl.prefix("/info");
        decl.get("/", "info", Self::info);
    }
}

#[tokio::test]
async fn test_manager_is_injected_into_controllers() {
    let config = ConfigManager::new();
    config.set("name", "trellis").unwrap();

    let module = DynamicModule::new("InfoModule")
        .with_provider(config.provider())
        .with_controller::<InfoController>();
    let app = Application::from_module(&module).unwrap();

    let response = app.handle(HttpRequest::new(HttpMethod::GET, "/info")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_json().unwrap(), json!({ "name": "trellis" }));
}
