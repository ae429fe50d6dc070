// Field rules and object schemas over JSON values

use crate::ValidationError;
use serde_json::Value;
use std::sync::Arc;

type Check = Arc<dyn Fn(&Value, &str) -> Result<(), ValidationError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Presence {
    Required,
    Optional,
}

/// The checks applied to one field of an object
#[derive(Clone)]
pub struct FieldRules {
    field: String,
    presence: Presence,
    checks: Vec<Check>,
}

impl FieldRules {
    /// Rules for `field`. Fields are optional until [`required`](Self::required).
    pub fn for_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            presence: Presence::Optional,
            checks: Vec::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Missing or `null` values fail instead of skipping the checks
    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    /// Add a check over the raw JSON value
    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.checks.push(Arc::new(check));
        self
    }

    /// Add a check that requires a string
    pub fn string<F>(self, check: F) -> Self
    where
        F: Fn(&str, &str) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.check(move |value, field| match value.as_str() {
            Some(s) => check(s, field),
            None => Err(type_error(field, "string", value)),
        })
    }

    /// Add a check that requires a number
    pub fn number<F>(self, check: F) -> Self
    where
        F: Fn(f64, &str) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.check(move |value, field| match value.as_f64() {
            Some(n) => check(n, field),
            None => Err(type_error(field, "number", value)),
        })
    }

    /// Validate `value`, the field as found in its object (`None` if absent)
    pub fn validate(&self, value: Option<&Value>) -> Result<(), Vec<ValidationError>> {
        let value = match value {
            Some(Value::Null) | None => {
                return match self.presence {
                    Presence::Optional => Ok(()),
                    Presence::Required => Err(vec![ValidationError::new(
                        &self.field,
                        format!("{} should not be null or undefined", self.field),
                    )
                    .with_constraint("isDefined")]),
                };
            }
            Some(value) => value,
        };

        let errors: Vec<ValidationError> = self
            .checks
            .iter()
            .filter_map(|check| check(value, &self.field).err())
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn type_error(field: &str, expected: &str, found: &Value) -> ValidationError {
    let constraint = match expected {
        "string" => "isString",
        _ => "isNumber",
    };
    ValidationError::new(field, format!("{} must be a {}", field, expected))
        .with_constraint(constraint)
        .with_value(found.to_string())
}

/// Field rules for a JSON object
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<FieldRules>,
    forbid_unknown: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, rules: FieldRules) -> Self {
        self.fields.push(rules);
        self
    }

    /// Reject properties no rule mentions
    pub fn forbid_unknown(mut self) -> Self {
        self.forbid_unknown = true;
        self
    }

    /// Check every rule against `value`, collecting all failures
    pub fn validate(&self, value: &Value) -> Result<(), Vec<ValidationError>> {
        let Some(object) = value.as_object() else {
            return Err(vec![
                ValidationError::new("body", "body must be an object")
                    .with_constraint("isObject")
                    .with_value(value.to_string()),
            ]);
        };

        let mut errors = Vec::new();
        for rules in &self.fields {
            if let Err(mut failed) = rules.validate(object.get(rules.field())) {
                errors.append(&mut failed);
            }
        }

        if self.forbid_unknown {
            for key in object.keys() {
                if !self.fields.iter().any(|r| r.field() == key) {
                    errors.push(
                        ValidationError::new(key.as_str(), format!("property {} should not exist", key))
                            .with_constraint("whitelistValidation"),
                    );
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
