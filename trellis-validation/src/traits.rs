// Validation traits

use crate::ValidationError;

/// Types that can check their own invariants
pub trait Validate {
    /// Every failure, not just the first
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = self
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.validate().err().map(|errs| (index, errs)))
            .flat_map(|(index, errs)| {
                errs.into_iter().map(move |mut e| {
                    e.field = format!("[{}].{}", index, e.field);
                    e
                })
            })
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        match self {
            Some(inner) => inner.validate(),
            None => Ok(()),
        }
    }
}

/// Gather the failures out of a list of single-value checks
pub fn collect<I>(checks: I) -> Result<(), Vec<ValidationError>>
where
    I: IntoIterator<Item = Result<(), ValidationError>>,
{
    let errors: Vec<ValidationError> = checks.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
