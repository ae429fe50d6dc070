// Test application builder

use crate::TestClient;
use std::sync::Arc;
use trellis_core::{Application, Container, Error, Module, ProviderDescriptor, Token};

/// Builds an [`Application`] whose providers can be swapped for test doubles.
///
/// Overrides are bound before the module graph is resolved. A module
/// providing the same token later is skipped, so the override wins.
pub struct TestAppBuilder<'m> {
    module: &'m dyn Module,
    overrides: Vec<ProviderDescriptor>,
}

impl<'m> TestAppBuilder<'m> {
    pub fn new(module: &'m dyn Module) -> Self {
        Self {
            module,
            overrides: Vec::new(),
        }
    }

    /// Replace whatever the modules bind for the descriptor's token
    pub fn override_provider(mut self, descriptor: ProviderDescriptor) -> Self {
        self.overrides.push(descriptor);
        self
    }

    /// Replace the provider for `T` with a fixed instance
    pub fn override_value<T: Send + Sync + 'static>(self, instance: T) -> Self {
        self.override_provider(ProviderDescriptor::value(Token::of::<T>(), instance))
    }

    pub fn build(self) -> Result<TestApp, Error> {
        let container = Container::new();
        for descriptor in self.overrides {
            container.register(descriptor)?;
        }
        let app = Application::with_container(container, self.module)?;
        Ok(TestApp { app })
    }
}

/// A bootstrapped application under test
#[derive(Clone)]
pub struct TestApp {
    app: Application,
}

impl TestApp {
    pub fn builder(module: &dyn Module) -> TestAppBuilder<'_> {
        TestAppBuilder::new(module)
    }

    /// Bootstrap `module` with no overrides
    pub fn from_module(module: &dyn Module) -> Result<Self, Error> {
        Self::builder(module).build()
    }

    pub fn client(&self) -> TestClient {
        TestClient::new(self.app.clone())
    }

    /// Resolve a singleton or transient provider from the root container
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.app.container().resolve::<T>()
    }

    pub fn application(&self) -> &Application {
        &self.app
    }
}
