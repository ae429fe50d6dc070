// Trellis - A NestJS-inspired HTTP framework for Rust
//
// Controllers, guards, pipes and filters are declared as metadata; modules
// group providers and controllers; the application resolves the module graph
// and binds every route to a fixed request pipeline.

// Re-export core functionality
pub use trellis_core::*;

// Re-export optional crates
#[cfg(feature = "validation")]
pub use trellis_validation;

#[cfg(feature = "config")]
pub use trellis_config;

#[cfg(feature = "testing")]
pub use trellis_testing;

/// Prelude for common imports
///
/// ```
/// use trellis::prelude::*;
///
/// # tokio_test::block_on(async {
/// let app = Application::from_module(&DynamicModule::new("AppModule")).unwrap();
/// let response = app.handle(HttpRequest::new(HttpMethod::GET, "/")).await;
/// assert_eq!(response.status, 404);
/// # });
/// ```
pub mod prelude {
    pub use crate::{
        Application,
        Arguments,
        AuthenticationGuard,
        Container,
        Controller,
        ControllerDecl,
        Dependencies,
        DynamicModule,
        Error,
        ExceptionFilter,
        Guard,
        HttpExceptionFilter,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Injectable,
        InjectionDescriptor,
        Interceptor,
        Middleware,
        Module,
        ParamSource,
        Pipe,
        ProviderDescriptor,
        Scope,
        Token,
        async_trait,
    };

    #[cfg(feature = "validation")]
    pub use trellis_validation::{Schema, ValidationPipe, Validate};
}
