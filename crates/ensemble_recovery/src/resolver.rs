//! Deriving a failed category's value from a successful dependency.

use crate::CategoryValue;
use std::fmt;

/// Derives a value for `category` from a successful `dependency`.
///
/// Derivation rules are domain policy; register one per category on the
/// [`DegradationManager`](crate::DegradationManager).
pub trait DependencyResolver: Send + Sync {
    /// Derived value, or `None` when no derivation applies.
    fn resolve(&self, category: &str, dependency: &str, value: &CategoryValue) -> Option<CategoryValue>;
}

/// Copies the dependency's value at reduced confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InheritResolver {
    factor: f64,
}

impl InheritResolver {
    /// Default confidence multiplier.
    pub const DEFAULT_FACTOR: f64 = 0.6;

    /// Resolver scaling confidence by `factor` (clamped to `0..=1`).
    pub fn new(factor: f64) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
        }
    }
}

impl Default for InheritResolver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FACTOR)
    }
}

impl DependencyResolver for InheritResolver {
    fn resolve(&self, _category: &str, _dependency: &str, value: &CategoryValue) -> Option<CategoryValue> {
        if value.value.is_null() {
            return None;
        }
        Some(CategoryValue::new(value.value.clone(), value.confidence * self.factor))
    }
}

/// Resolver backed by a closure.
///
/// ```
/// use ensemble_recovery::{CategoryValue, DependencyResolver, FnResolver};
/// use serde_json::json;
///
/// // A home win implies a home cover at reduced confidence.
/// let spread = FnResolver::new(|_, _, winner: &CategoryValue| {
///     let side = winner.value.as_str()?;
///     Some(CategoryValue::new(json!({"cover": side}), winner.confidence * 0.5))
/// });
///
/// let derived = spread
///     .resolve("spread", "winner", &CategoryValue::new(json!("home"), 0.8))
///     .unwrap();
/// assert_eq!(derived.value, json!({"cover": "home"}));
/// ```
pub struct FnResolver<F> {
    f: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&str, &str, &CategoryValue) -> Option<CategoryValue> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver").finish_non_exhaustive()
    }
}

impl<F> DependencyResolver for FnResolver<F>
where
    F: Fn(&str, &str, &CategoryValue) -> Option<CategoryValue> + Send + Sync,
{
    fn resolve(&self, category: &str, dependency: &str, value: &CategoryValue) -> Option<CategoryValue> {
        (self.f)(category, dependency, value)
    }
}
