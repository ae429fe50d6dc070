// Validation pipes for handler parameters

use crate::{Schema, Validate, ValidationError, ValidationErrors};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use trellis_core::{Error, HttpRequest, Pipe, PipeTarget};

/// Deserializes a parameter into `T` and validates it.
///
/// On success the parameter is replaced by `T` serialized back to JSON, so
/// unknown fields are dropped and defaults are filled in. Malformed input and
/// failed rules both become [`Error::Validation`], which the dispatcher
/// answers with a 400 before the handler runs.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use trellis_core::{Error, Pipe, PipeTarget};
/// use trellis_validation::{NotEmpty, Validate, ValidationError, ValidationPipe};
///
/// #[derive(Serialize, Deserialize)]
/// struct Rename {
///     name: String,
/// }
///
/// impl Validate for Rename {
///     fn validate(&self) -> Result<(), Vec<ValidationError>> {
///         NotEmpty::validate(&self.name, "name").map_err(|e| vec![e])
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let pipe = ValidationPipe::<Rename>::new();
/// let ok = pipe.transform(json!({ "name": "x", "extra": 1 }), &PipeTarget::Return).await;
/// assert_eq!(ok.unwrap(), json!({ "name": "x" }));
///
/// let err = pipe.transform(json!({ "name": "" }), &PipeTarget::Return).await;
/// assert!(matches!(err, Err(Error::Validation(_))));
/// # });
/// ```
pub struct ValidationPipe<T> {
    _dto: PhantomData<fn() -> T>,
}

impl<T> ValidationPipe<T>
where
    T: DeserializeOwned + Serialize + Validate,
{
    pub fn new() -> Self {
        Self { _dto: PhantomData }
    }

    /// Deserialize and validate `value`, reporting failures against `field`
    pub fn check(value: Value, field: &str) -> Result<T, Error> {
        let dto: T = serde_json::from_value(value).map_err(|e| {
            Error::Validation(
                ValidationError::new(field, format!("{} is malformed: {}", field, e))
                    .with_constraint("isValidShape")
                    .into(),
            )
        })?;

        dto.validate()
            .map_err(|errors| Error::Validation(ValidationErrors::new(errors)))?;
        Ok(dto)
    }

    /// Parse a request body straight into a validated `T`
    pub fn parse(request: &HttpRequest) -> Result<T, Error> {
        Self::check(request.body_value()?, "body")
    }
}

impl<T> Default for ValidationPipe<T>
where
    T: DeserializeOwned + Serialize + Validate,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Pipe for ValidationPipe<T>
where
    T: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
{
    async fn transform(&self, value: Value, target: &PipeTarget) -> Result<Value, Error> {
        let field = match target {
            PipeTarget::Param { kind: "body", .. } => "body".to_string(),
            other => other.field(),
        };
        let dto = Self::check(value, &field)?;
        serde_json::to_value(&dto).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Validates a parameter against a [`Schema`] without typing it
pub struct SchemaPipe(pub Schema);

#[async_trait]
impl Pipe for SchemaPipe {
    async fn transform(&self, value: Value, _target: &PipeTarget) -> Result<Value, Error> {
        self.0
            .validate(&value)
            .map_err(|errors| Error::Validation(ValidationErrors::new(errors)))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldRules, IsEmail, Min, NotEmpty, collect};
    use serde::Deserialize;
    use serde_json::json;
    use trellis_core::HttpMethod;

    #[derive(Debug, Deserialize, Serialize)]
    struct CreateUser {
        name: String,
        email: String,
        #[serde(default)]
        age: u32,
    }

    impl Validate for CreateUser {
        fn validate(&self) -> Result<(), Vec<ValidationError>> {
            collect([
                NotEmpty::validate(&self.name, "name"),
                IsEmail::validate(&self.email, "email"),
                Min(13).validate(self.age, "age"),
            ])
        }
    }

    fn body_target() -> PipeTarget {
        PipeTarget::Param {
            index: 0,
            kind: "body",
            key: None,
        }
    }

    #[tokio::test]
    async fn test_valid_body_is_normalized() {
        let pipe = ValidationPipe::<CreateUser>::new();
        let out = pipe
            .transform(
                json!({ "name": "Ada", "email": "ada@example.com", "age": 36, "admin": true }),
                &body_target(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({ "name": "Ada", "email": "ada@example.com", "age": 36 }));
    }

    #[tokio::test]
    async fn test_rule_failures_are_listed() {
        let pipe = ValidationPipe::<CreateUser>::new();
        let err = pipe
            .transform(json!({ "name": "", "email": "nope" }), &body_target())
            .await
            .unwrap_err();

        match err {
            Error::Validation(errors) => {
                let fields: Vec<&str> = errors.errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["name", "email", "age"]);
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_shape_is_a_validation_error() {
        let pipe = ValidationPipe::<CreateUser>::new();
        let err = pipe.transform(json!("text"), &body_target()).await.unwrap_err();
        match err {
            Error::Validation(errors) => {
                assert_eq!(errors.errors[0].field, "body");
                assert_eq!(errors.errors[0].constraint, "isValidShape");
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_request_body() {
        let request = HttpRequest::new(HttpMethod::POST, "/users")
            .with_json(&json!({ "name": "Ada", "email": "ada@example.com", "age": 20 }))
            .unwrap();
        let user = ValidationPipe::<CreateUser>::parse(&request).unwrap();
        assert_eq!(user.name, "Ada");
    }

    #[tokio::test]
    async fn test_schema_pipe_passes_value_through() {
        let pipe = SchemaPipe(
            Schema::new().field(FieldRules::for_field("email").required().string(IsEmail::validate)),
        );
        let value = json!({ "email": "ada@example.com", "extra": 1 });
        assert_eq!(pipe.transform(value.clone(), &body_target()).await.unwrap(), value);
        assert!(pipe.transform(json!({}), &body_target()).await.is_err());
    }
}
