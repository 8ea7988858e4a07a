//! Validation Rules
//!
//! Shape-agnostic validation: every request shape implements [`Validate`],
//! and the rule traits below record into a shared [`Violations`] set so a
//! caller always sees every broken rule, never only the first.

use crate::error::Violations;

pub const ORGANIZATION_NAME_MAX: usize = 60;
pub const ORGANIZATION_ADDRESS_MAX: usize = 60;
pub const ORGANIZATION_COUNTRY_MAX: usize = 60;
pub const MEMBER_NAME_MAX: usize = 30;
pub const MEMBER_POSITION_MAX: usize = 20;
pub const MEMBER_AGE_MIN: i32 = 0;
pub const MEMBER_AGE_MAX: i32 = 150;

/// A value that can check itself against its schema rules.
pub trait Validate {
    /// Check every rule, returning the full violation set on failure.
    fn validate(&self) -> Result<(), Violations>;
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), Violations> {
        let mut violations = Violations::new();
        for (i, item) in self.iter().enumerate() {
            if let Err(nested) = item.validate() {
                violations.extend_nested(&format!("[{}]", i), nested);
            }
        }
        violations.into_result()
    }
}

/// Rules for text fields.
///
/// # Example
/// ```
/// use roster_core::{validation::CheckText, Violations};
///
/// let mut violations = Violations::new();
/// "".check_required("name", &mut violations);
/// assert_eq!(violations.len(), 1);
/// ```
pub trait CheckText {
    /// Record a violation if the value is absent, empty or whitespace-only.
    fn check_required(&self, field: &str, out: &mut Violations);

    /// Record a violation if the value is longer than `max` characters.
    fn check_max_chars(&self, field: &str, max: usize, out: &mut Violations);
}

impl CheckText for str {
    fn check_required(&self, field: &str, out: &mut Violations) {
        if self.trim().is_empty() {
            out.push(field, format!("The {} field is required.", field));
        }
    }

    fn check_max_chars(&self, field: &str, max: usize, out: &mut Violations) {
        if self.chars().count() > max {
            out.push(
                field,
                format!("Maximum length for the {} is {} characters.", field, max),
            );
        }
    }
}

impl CheckText for String {
    fn check_required(&self, field: &str, out: &mut Violations) {
        self.as_str().check_required(field, out)
    }

    fn check_max_chars(&self, field: &str, max: usize, out: &mut Violations) {
        self.as_str().check_max_chars(field, max, out)
    }
}

impl<T: CheckText> CheckText for Option<T> {
    fn check_required(&self, field: &str, out: &mut Violations) {
        match self {
            Some(value) => value.check_required(field, out),
            None => out.push(field, format!("The {} field is required.", field)),
        }
    }

    fn check_max_chars(&self, field: &str, max: usize, out: &mut Violations) {
        if let Some(value) = self {
            value.check_max_chars(field, max, out);
        }
    }
}

/// Rules for numeric fields.
pub trait CheckRange: Sized {
    /// Record a violation unless `min <= value <= max`.
    fn check_range(&self, field: &str, min: Self, max: Self, out: &mut Violations);
}

macro_rules! impl_check_range {
    ($($t:ty),*) => {
        $(
            impl CheckRange for $t {
                fn check_range(&self, field: &str, min: Self, max: Self, out: &mut Violations) {
                    if *self < min || *self > max {
                        out.push(
                            field,
                            format!("The {} field must be between {} and {}.", field, min, max),
                        );
                    }
                }
            }
        )*
    };
}

impl_check_range!(i16, i32, i64, u16, u32, u64);
