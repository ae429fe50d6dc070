// Configuration validation

use crate::{ConfigError, Result};

/// Checks run on a typed configuration after it is loaded
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Common checks for implementing [`Validate`]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(key: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
        }
        Ok(())
    }

    pub fn in_range<T>(key: &str, value: T, min: T, max: T) -> Result<()>
    where
        T: PartialOrd + std::fmt::Display,
    {
        if value < min || value > max {
            return Err(ConfigError::Invalid(format!(
                "{} must be between {} and {}, got {}",
                key, min, max, value
            )));
        }
        Ok(())
    }

    pub fn one_of(key: &str, value: &str, allowed: &[&str]) -> Result<()> {
        if !allowed.iter().any(|a| *a == value) {
            return Err(ConfigError::Invalid(format!(
                "{} must be one of [{}], got {}",
                key,
                allowed.join(", "),
                value
            )));
        }
        Ok(())
    }

    /// `scheme://rest`, where the scheme is one of `schemes`
    pub fn url(key: &str, value: &str, schemes: &[&str]) -> Result<()> {
        match value.split_once("://") {
            Some((scheme, rest)) if !rest.is_empty() && schemes.iter().any(|s| *s == scheme) => Ok(()),
            _ => Err(ConfigError::Invalid(format!(
                "{} must be a {} URL, got {}",
                key,
                schemes.join("/"),
                value
            ))),
        }
    }
}
