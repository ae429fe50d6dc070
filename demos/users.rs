//! Users API
//!
//! A small CRUD service showing a guarded controller, a validating pipe and
//! the HTTP exception filter.
//!
//! ```bash
//! cargo run --example users
//! curl -H 'Authorization: Bearer demo' http://localhost:3000/users/
//! ```
//!
//! Set `USERS_PORT` to listen elsewhere.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use trellis::logging::{LogConfig, LogFormat, info};
use trellis::prelude::*;
use trellis_config::ConfigManager;
use trellis_validation::{IsEmail, Min, MinLength, NotEmpty, ValidationError, collect};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub age: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserDto {
    pub name: String,
    pub email: String,
    pub age: u32,
}

impl trellis_validation::Validate for CreateUserDto {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        collect([
            NotEmpty::validate(&self.name, "name"),
            MinLength(2).validate(&self.name, "name"),
            IsEmail::validate(&self.email, "email"),
            Min(18).validate(self.age, "age"),
        ])
    }
}

/// In-memory user store
pub struct UsersService {
    users: RwLock<Vec<User>>,
    next_id: AtomicU64,
}

impl Injectable for UsersService {
    fn construct(_: Dependencies) -> Result<Self, Error> {
        let seed = vec![
            User {
                id: 1,
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                age: 36,
            },
            User {
                id: 2,
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                age: 45,
            },
        ];
        Ok(UsersService {
            next_id: AtomicU64::new(seed.len() as u64 + 1),
            users: RwLock::new(seed),
        })
    }
}

impl UsersService {
    pub async fn list(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn find(&self, id: u64) -> Result<User, Error> {
        self.users
            .read()
            .await
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| Error::http(404, "not found"))
    }

    pub async fn create(&self, dto: CreateUserDto) -> User {
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: dto.name,
            email: dto.email,
            age: dto.age,
        };
        self.users.write().await.push(user.clone());
        user
    }
}

pub struct UsersController {
    users: Arc<UsersService>,
}

impl Injectable for UsersController {
    fn injections() -> Vec<InjectionDescriptor> {
        vec![InjectionDescriptor::of::<UsersService>(0)]
    }

    fn construct(deps: Dependencies) -> Result<Self, Error> {
        Ok(UsersController {
            users: deps.get(0)?,
        })
    }
}

impl UsersController {
    async fn list(self: Arc<Self>, _args: Arguments) -> Result<Vec<User>, Error> {
        Ok(self.users.list().await)
    }

    async fn find(self: Arc<Self>, args: Arguments) -> Result<User, Error> {
        self.users.find(args.get(0)?).await
    }

    async fn create(self: Arc<Self>, args: Arguments) -> Result<User, Error> {
        Ok(self.users.create(args.get(0)?).await)
    }

    async fn count(self: Arc<Self>, _args: Arguments) -> Result<Value, Error> {
        Ok(Value::from(self.users.list().await.len()))
    }
}

impl Controller for UsersController {
    fn declare(decl: &mut ControllerDecl<'_, Self>) {
        decl.prefix("/users")
            .guard(AuthenticationGuard)
            .filter(HttpExceptionFilter);
        decl.get("/", "list", Self::list);
        decl.get("/count", "count", Self::count);
        decl.get("/:id", "find", Self::find)
            .param_piped(0, ParamSource::Path("id".into()), trellis::ParseIntPipe);
        decl.post("/", "create", Self::create)
            .param_piped(
                0,
                ParamSource::Body,
                trellis_validation::ValidationPipe::<CreateUserDto>::new(),
            )
            .http_code(201);
    }
}

pub fn users_module() -> DynamicModule {
    DynamicModule::new("UsersModule")
        .with_provider(ProviderDescriptor::class::<UsersService>())
        .with_controller::<UsersController>()
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _log_guard = LogConfig::new().format(LogFormat::Pretty).init()?;

    let config = ConfigManager::with_prefix("USERS");
    config.load_env();
    let port: u16 = config.get_or("port", 3000);

    let module = DynamicModule::new("AppModule")
        .with_provider(config.provider())
        .import(users_module());
    let app = Application::from_module(&module)?;

    info!(port, routes = app.routes().len(), "Users API ready");
    app.listen(port).await
}
