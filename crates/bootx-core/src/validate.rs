//! Payload validation.
//!
//! Payload types declare their constraints by implementing [`Validate`],
//! usually through `#[derive(Validate)]`. The framework never calls
//! [`Validate::validate`] directly: it goes through a pluggable
//! [`Validator`], whose default simply forwards to the payload.

use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Arc;

use crate::error::{ValidationError, Violation};

/// Declared constraints of a payload type.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl<T: Validate + ?Sized> Validate for Box<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        (**self).validate()
    }
}

impl<T: Validate + ?Sized> Validate for Arc<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        (**self).validate()
    }
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.as_ref().map_or(Ok(()), Validate::validate)
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::new();
        for (i, item) in self.iter().enumerate() {
            violations.nested(&format!("[{i}]"), item.validate());
        }
        violations.finish()
    }
}

macro_rules! impl_validate_unconstrained {
    ($($ty:ty),* $(,)?) => {
        $( impl Validate for $ty {} )*
    };
}

impl_validate_unconstrained!(
    (),
    bool,
    char,
    String,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    serde_json::Value,
);

impl<K, V, S> Validate for HashMap<K, V, S> {}
impl<K, V> Validate for BTreeMap<K, V> {}

/// A bound payload with its concrete type erased.
///
/// Implemented for every `Validate + Send + Sync + 'static` type.
pub trait Payload: Any + Send + Sync {
    /// Runs the payload's own [`Validate`] implementation.
    fn check(&self) -> Result<(), ValidationError>;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> Payload for T
where
    T: Validate + Send + Sync + 'static,
{
    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl std::fmt::Debug for dyn Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name())
            .finish()
    }
}

/// Pluggable `validate(value) -> error|nil` collaborator.
pub trait Validator: Send + Sync + 'static {
    fn validate(&self, payload: &dyn Payload) -> Result<(), ValidationError>;
}

/// Forwards to the payload's [`Validate`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl Validator for DefaultValidator {
    fn validate(&self, payload: &dyn Payload) -> Result<(), ValidationError> {
        payload.check()
    }
}

impl<F> Validator for F
where
    F: Fn(&dyn Payload) -> Result<(), ValidationError> + Send + Sync + 'static,
{
    fn validate(&self, payload: &dyn Payload) -> Result<(), ValidationError> {
        self(payload)
    }
}

/// Collects violations across several checks.
#[derive(Debug, Default)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn check(&mut self, result: Result<(), Violation>) {
        if let Err(v) = result {
            self.0.push(v);
        }
    }

    /// Merges a nested payload's violations under `field`.
    pub fn nested(&mut self, field: &str, result: Result<(), ValidationError>) {
        if let Err(e) = result {
            self.0.extend(e.nest(field).violations().iter().cloned());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.0))
        }
    }
}

/// Types that can be absent or empty.
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Presence for &str {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

/// Types with a measurable length.
pub trait Length {
    /// `None` means the value is absent and length rules do not apply.
    fn length(&self) -> Option<usize>;
}

impl Length for String {
    fn length(&self) -> Option<usize> {
        Some(self.chars().count())
    }
}

impl Length for &str {
    fn length(&self) -> Option<usize> {
        Some(self.chars().count())
    }
}

impl<T> Length for Vec<T> {
    fn length(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<T: Length> Length for Option<T> {
    fn length(&self) -> Option<usize> {
        self.as_ref().and_then(Length::length)
    }
}

/// Rule helpers used by `#[derive(Validate)]`.
pub mod rules {
    use super::*;

    type Field = Cow<'static, str>;

    pub fn required<T: Presence + ?Sized>(
        field: impl Into<Field>,
        value: &T,
    ) -> Result<(), Violation> {
        if value.is_present() {
            Ok(())
        } else {
            Err(Violation::new(field, "is required"))
        }
    }

    pub fn min<T: PartialOrd + Display>(
        field: impl Into<Field>,
        value: &T,
        min: T,
    ) -> Result<(), Violation> {
        if *value < min {
            Err(Violation::new(field, format!("must be at least {min}")))
        } else {
            Ok(())
        }
    }

    pub fn max<T: PartialOrd + Display>(
        field: impl Into<Field>,
        value: &T,
        max: T,
    ) -> Result<(), Violation> {
        if *value > max {
            Err(Violation::new(field, format!("must be at most {max}")))
        } else {
            Ok(())
        }
    }

    pub fn length<T: Length + ?Sized>(
        field: impl Into<Field>,
        value: &T,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<(), Violation> {
        let Some(len) = value.length() else {
            return Ok(());
        };
        match (min, max) {
            (Some(min), _) if len < min => Err(Violation::new(
                field,
                format!("length must be at least {min}"),
            )),
            (_, Some(max)) if len > max => Err(Violation::new(
                field,
                format!("length must be at most {max}"),
            )),
            _ => Ok(()),
        }
    }

    /// Runs a user-supplied check returning a message on failure.
    pub fn custom<T: ?Sized, M: Display>(
        field: impl Into<Field>,
        value: &T,
        check: impl FnOnce(&T) -> Result<(), M>,
    ) -> Result<(), Violation> {
        check(value).map_err(|msg| Violation::new(field, msg.to_string()))
    }
}
