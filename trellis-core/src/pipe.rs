// Pipes: transformation and validation steps

use crate::{Error, ValidationError};
use async_trait::async_trait;
use serde_json::Value;

/// What a pipe is being applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeTarget {
    /// An extracted handler argument, before invocation
    Param {
        index: usize,
        kind: &'static str,
        key: Option<String>,
    },
    /// The handler's return value
    Return,
}

impl PipeTarget {
    /// Field name used when reporting a failure for this target
    pub fn field(&self) -> String {
        match self {
            PipeTarget::Param { key: Some(key), .. } => key.clone(),
            PipeTarget::Param { index, kind, .. } => format!("{}[{}]", kind, index),
            PipeTarget::Return => "return".to_string(),
        }
    }
}

/// A transformation or validation step. May replace the value or fail.
///
/// Returning [`Error::Validation`] short-circuits the request with a 400 that
/// lists the failures.
#[async_trait]
pub trait Pipe: Send + Sync {
    async fn transform(&self, value: Value, target: &PipeTarget) -> Result<Value, Error>;
}

/// Run `value` through `pipes` sequentially
pub async fn apply_pipes(
    pipes: &[std::sync::Arc<dyn Pipe>],
    mut value: Value,
    target: &PipeTarget,
) -> Result<Value, Error> {
    for pipe in pipes {
        value = pipe.transform(value, target).await?;
    }
    Ok(value)
}

/// Pipe backed by a closure
pub struct FnPipe<F>
where
    F: Fn(Value, &PipeTarget) -> Result<Value, Error> + Send + Sync,
{
    transform: F,
}

impl<F> FnPipe<F>
where
    F: Fn(Value, &PipeTarget) -> Result<Value, Error> + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl<F> Pipe for FnPipe<F>
where
    F: Fn(Value, &PipeTarget) -> Result<Value, Error> + Send + Sync,
{
    async fn transform(&self, value: Value, target: &PipeTarget) -> Result<Value, Error> {
        (self.transform)(value, target)
    }
}

/// Converts a numeric string into an integer. Integers pass unchanged.
pub struct ParseIntPipe;

#[async_trait]
impl Pipe for ParseIntPipe {
    async fn transform(&self, value: Value, target: &PipeTarget) -> Result<Value, Error> {
        if value.is_i64() || value.is_u64() {
            return Ok(value);
        }
        let parsed = value.as_str().and_then(|s| s.trim().parse::<i64>().ok());

        match parsed {
            Some(n) => Ok(Value::from(n)),
            None => {
                let shown = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Err(Error::Validation(
                    ValidationError::new(target.field(), "numeric string is expected")
                        .with_constraint("isInt")
                        .with_value(shown)
                        .into(),
                ))
            }
        }
    }
}
