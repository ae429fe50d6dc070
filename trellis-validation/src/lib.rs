//! Validation for Trellis
//!
//! Validators check single values, [`Schema`] checks a JSON object field by
//! field, and the pipes plug both into a route so that a request whose body
//! fails validation is answered with a 400 before the handler runs.
//!
//! # Examples
//!
//! ## Validating a DTO
//!
//! ```
//! use trellis_validation::{IsEmail, MinLength, NotEmpty, Validate, ValidationError, collect};
//!
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! impl Validate for CreateUser {
//!     fn validate(&self) -> Result<(), Vec<ValidationError>> {
//!         collect([
//!             NotEmpty::validate(&self.name, "name"),
//!             MinLength(2).validate(&self.name, "name"),
//!             IsEmail::validate(&self.email, "email"),
//!         ])
//!     }
//! }
//!
//! let dto = CreateUser {
//!     name: "Ada".to_string(),
//!     email: "ada@example.com".to_string(),
//! };
//! assert!(dto.validate().is_ok());
//! ```
//!
//! ## Schemas
//!
//! ```
//! use serde_json::json;
//! use trellis_validation::{FieldRules, IsEmail, Min, Schema};
//!
//! let schema = Schema::new()
//!     .field(FieldRules::for_field("email").required().string(IsEmail::validate))
//!     .field(FieldRules::for_field("age").optional().number(|v, f| Min(18.0).validate(v, f)));
//!
//! assert!(schema.validate(&json!({ "email": "ada@example.com", "age": 36 })).is_ok());
//! assert_eq!(schema.validate(&json!({ "age": 3 })).unwrap_err().len(), 2);
//! ```

mod pipe;
mod rules;
mod traits;
mod validators;

pub use pipe::*;
pub use rules::*;
pub use traits::*;
pub use validators::*;

pub use trellis_core::{ValidationError, ValidationErrors};
