//! Equality strategies between control and candidate values.

use std::marker::PhantomData;

use serde::Serialize;

/// Decides whether a control value and a candidate value are equivalent.
///
/// Called exactly once per run, on every path. A side that produced no value
/// (it returned an error, panicked, or no candidate is set) is passed as
/// `None`.
///
/// Implementations must be pure and must not panic for any value the
/// operations can produce; when two values cannot be compared, return `false`.
pub trait Comparer<T>: Send + Sync {
    fn compare(&self, control: Option<&T>, candidate: Option<&T>) -> bool;
}

impl<T, F> Comparer<T> for F
where
    F: Fn(Option<&T>, Option<&T>) -> bool + Send + Sync,
{
    fn compare(&self, control: Option<&T>, candidate: Option<&T>) -> bool {
        self(control, candidate)
    }
}

/// Apply `eq` when both values are present; absent equals absent only.
fn when_present<T>(
    control: Option<&T>,
    candidate: Option<&T>,
    eq: impl FnOnce(&T, &T) -> bool,
) -> bool {
    match (control, candidate) {
        (Some(a), Some(b)) => eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Structural equality via `PartialEq`. The default comparer.
///
/// An absent value only equals another absent value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepEquality;

impl<T: PartialEq> Comparer<T> for DeepEquality {
    fn compare(&self, control: Option<&T>, candidate: Option<&T>) -> bool {
        control == candidate
    }
}

/// Structural equality of the JSON trees of both values.
///
/// Useful for types without `PartialEq`, and reflexive for non-finite floats,
/// which serialize to `null`. A value that fails to serialize never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEquality;

impl<T: Serialize> Comparer<T> for JsonEquality {
    fn compare(&self, control: Option<&T>, candidate: Option<&T>) -> bool {
        when_present(control, candidate, |a, b| {
            match (serde_json::to_value(a), serde_json::to_value(b)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        })
    }
}

/// Compares a projection of each value, e.g. a subset of fields.
pub struct ByKey<F, K> {
    key: F,
    _key: PhantomData<fn() -> K>,
}

/// Build a comparer that treats values as equal when `key` maps them to equal keys.
pub fn by_key<T, K, F>(key: F) -> ByKey<F, K>
where
    F: Fn(&T) -> K,
{
    ByKey {
        key,
        _key: PhantomData,
    }
}

impl<T, K, F> Comparer<T> for ByKey<F, K>
where
    F: Fn(&T) -> K + Send + Sync,
    K: PartialEq,
{
    fn compare(&self, control: Option<&T>, candidate: Option<&T>) -> bool {
        when_present(control, candidate, |a, b| (self.key)(a) == (self.key)(b))
    }
}

/// Numeric equality within an absolute tolerance. Two NaNs compare equal.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    epsilon: f64,
}

impl Tolerance {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.abs(),
        }
    }
}

impl<T> Comparer<T> for Tolerance
where
    T: Copy + Into<f64>,
{
    fn compare(&self, control: Option<&T>, candidate: Option<&T>) -> bool {
        when_present(control, candidate, |control, candidate| {
            let (a, b): (f64, f64) = ((*control).into(), (*candidate).into());
            if a.is_nan() || b.is_nan() {
                return a.is_nan() && b.is_nan();
            }
            a == b || (a - b).abs() <= self.epsilon
        })
    }
}
