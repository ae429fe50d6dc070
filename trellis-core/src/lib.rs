// Core library for the Trellis framework
// Metadata registry, dependency container, module resolver, route binder
// and the per-route request pipeline.

pub mod application;
pub mod binder;
pub mod container;
pub mod controller;
pub mod error;
pub mod exception_filter;
pub mod guard;
pub mod http;
pub mod interceptor;
pub mod logging;
pub mod metadata;
pub mod middleware;
pub mod module;
pub mod pipe;
pub mod pipeline;
pub mod routing;

// Re-export commonly used types
pub use application::*;
pub use binder::*;
pub use container::*;
pub use controller::*;
pub use error::*;
pub use exception_filter::*;
pub use guard::*;
pub use http::*;
pub use interceptor::*;
pub use metadata::*;
pub use middleware::*;
pub use module::*;
pub use pipe::*;
pub use pipeline::*;
pub use routing::*;

// Re-exported so implementors of the async traits need not depend on it
pub use async_trait::async_trait;
