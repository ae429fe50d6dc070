// Built-in validators

use crate::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

fn pattern(source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|e| panic!("built-in pattern {:?} is invalid: {}", source, e))
}

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
});

static URL: Lazy<Regex> = Lazy::new(|| pattern(r"^https?://[^\s/$.?#][^\s]*$"));

static UUID: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
});

fn failure(field: &str, message: String, constraint: &str, value: impl ToString) -> ValidationError {
    ValidationError::new(field, message)
        .with_constraint(constraint)
        .with_value(value.to_string())
}

// ========== Strings ==========

/// Rejects empty and whitespace-only strings
pub struct NotEmpty;

impl NotEmpty {
    pub fn validate(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, format!("{} should not be empty", field))
                .with_constraint("isNotEmpty"));
        }
        Ok(())
    }
}

/// Minimum length in characters
pub struct MinLength(pub usize);

impl MinLength {
    pub fn validate(&self, value: &str, field: &str) -> Result<(), ValidationError> {
        if value.chars().count() >= self.0 {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must be longer than or equal to {} characters", field, self.0),
            "minLength",
            value,
        ))
    }
}

/// Maximum length in characters
pub struct MaxLength(pub usize);

impl MaxLength {
    pub fn validate(&self, value: &str, field: &str) -> Result<(), ValidationError> {
        if value.chars().count() <= self.0 {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must be shorter than or equal to {} characters", field, self.0),
            "maxLength",
            value,
        ))
    }
}

pub struct IsEmail;

impl IsEmail {
    pub fn validate(value: &str, field: &str) -> Result<(), ValidationError> {
        if EMAIL.is_match(value) {
            return Ok(());
        }
        Err(failure(field, format!("{} must be an email", field), "isEmail", value))
    }
}

/// `http` and `https` URLs
pub struct IsUrl;

impl IsUrl {
    pub fn validate(value: &str, field: &str) -> Result<(), ValidationError> {
        if URL.is_match(value) {
            return Ok(());
        }
        Err(failure(field, format!("{} must be a URL address", field), "isUrl", value))
    }
}

pub struct IsUuid;

impl IsUuid {
    pub fn validate(value: &str, field: &str) -> Result<(), ValidationError> {
        if UUID.is_match(value) {
            return Ok(());
        }
        Err(failure(field, format!("{} must be a UUID", field), "isUuid", value))
    }
}

/// Membership in a fixed set of strings
pub struct IsIn(pub &'static [&'static str]);

impl IsIn {
    pub fn validate(&self, value: &str, field: &str) -> Result<(), ValidationError> {
        if self.0.iter().any(|allowed| *allowed == value) {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must be one of the following values: {}", field, self.0.join(", ")),
            "isIn",
            value,
        ))
    }
}

/// Match against a caller-supplied regular expression
pub struct Matches(pub Regex);

impl Matches {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    pub fn validate(&self, value: &str, field: &str) -> Result<(), ValidationError> {
        if self.0.is_match(value) {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must match {} regular expression", field, self.0.as_str()),
            "matches",
            value,
        ))
    }
}

// ========== Numbers ==========

/// Inclusive lower bound
pub struct Min<T>(pub T);

impl<T: PartialOrd + Display + Copy> Min<T> {
    pub fn validate(&self, value: T, field: &str) -> Result<(), ValidationError> {
        if value >= self.0 {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must not be less than {}", field, self.0),
            "min",
            value,
        ))
    }
}

/// Inclusive upper bound
pub struct Max<T>(pub T);

impl<T: PartialOrd + Display + Copy> Max<T> {
    pub fn validate(&self, value: T, field: &str) -> Result<(), ValidationError> {
        if value <= self.0 {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must not be greater than {}", field, self.0),
            "max",
            value,
        ))
    }
}

/// Inclusive range
pub struct InRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Display + Copy> InRange<T> {
    pub fn validate(&self, value: T, field: &str) -> Result<(), ValidationError> {
        if value >= self.min && value <= self.max {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must be between {} and {}", field, self.min, self.max),
            "inRange",
            value,
        ))
    }
}

/// Whole numbers only; checked on the JSON representation
pub struct IsInt;

impl IsInt {
    pub fn validate(value: f64, field: &str) -> Result<(), ValidationError> {
        if value.is_finite() && value.fract() == 0.0 {
            return Ok(());
        }
        Err(failure(
            field,
            format!("{} must be an integer number", field),
            "isInt",
            value,
        ))
    }
}
