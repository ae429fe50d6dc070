//! Testing utilities for Trellis applications.
//!
//! Requests are dispatched in-process through the same pipeline a server
//! would use, so guards, pipes and filters all run.
//!
//! ```
//! use trellis_core::DynamicModule;
//! use trellis_testing::{TestApp, assert_status};
//!
//! # tokio_test::block_on(async {
//! let module = DynamicModule::new("AppModule");
//! let app = TestApp::from_module(&module).unwrap();
//!
//! let response = app.client().get("/health").send().await;
//! assert_status(&response, 404);
//! # });
//! ```

pub mod assertions;
pub mod mock;
pub mod test_app;
pub mod test_client;

pub use assertions::*;
pub use mock::*;
pub use test_app::*;
pub use test_client::*;
