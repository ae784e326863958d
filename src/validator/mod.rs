//! Field validation helpers.
//!
//! A `Validator` is created per request, filled by the rule functions and then
//! converted into a result by the caller.

use std::collections::HashSet;
use std::hash::Hash;

use crate::errors::{AppError, FieldErrors};

/// Accumulates one error message per field.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no errors have been recorded.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error unless the field already has one.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record an error when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    #[cfg(test)]
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Finish validation, yielding a 422 error if anything failed.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.valid() {
            Ok(())
        } else {
            Err(AppError::FailedValidation(self.errors))
        }
    }
}

/// True if `value` is one of `permitted`.
pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

/// True if every element of `values` is distinct.
pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}
