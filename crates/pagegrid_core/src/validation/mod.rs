//! Validation results, validator plugins and dependency closure.
//!
//! Validators are injected through [`crate::proxy::BeanProxyFactory`]; each
//! declares the properties it reads so a single edit only re-runs the
//! validators that can observe it.

mod cache;
mod rules;

pub use cache::ValidationCache;
pub use rules::{BeanRule, PropertyRule};

use crate::proxy::BeanView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Validation severity, ordered `Ok < Warning < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Error,
}

/// Verdict of one validator for one property (or for the whole bean).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    severity: Severity,
    message: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: Some(message.into()),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    pub fn is_worse_than(&self, other: &Self) -> bool {
        self.severity > other.severity
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{:?}: {}", self.severity, message),
            None => write!(f, "{:?}", self.severity),
        }
    }
}

/// Keep `candidate` in `slot` only if it is strictly worse than what is there.
///
/// Ties keep the first-seen result.
pub(crate) fn keep_worst(slot: &mut Option<ValidationResult>, candidate: ValidationResult) {
    match slot {
        Some(current) if !candidate.is_worse_than(current) => {}
        _ => *slot = Some(candidate),
    }
}

/// First-seen worst result of `results`, `None` for an empty input.
pub fn worst_of<I>(results: I) -> Option<ValidationResult>
where
    I: IntoIterator<Item = ValidationResult>,
{
    let mut worst = None;
    for result in results {
        keep_worst(&mut worst, result);
    }
    worst
}

/// Bean-local validator plugin.
pub trait BeanValidator: Send + Sync {
    /// Properties this validator reads. Empty means it depends on every property.
    fn dependencies(&self) -> &[String];

    /// Results for one property. Only called for properties in
    /// [`Self::dependencies`] (or for every property when that is empty).
    fn validate_property(&self, bean: &dyn BeanView, property: &str) -> Vec<ValidationResult>;

    /// Property-independent results for the whole bean.
    fn validate_bean(&self, _bean: &dyn BeanView) -> Vec<ValidationResult> {
        Vec::new()
    }

    /// `true` if this validator must run when `property` is revalidated.
    fn watches(&self, property: &str) -> bool {
        let deps = self.dependencies();
        deps.is_empty() || deps.iter().any(|dep| dep == property)
    }
}

/// Cross-entity validator that takes over the verdict for some properties.
///
/// The bean's own validators still run for delegated properties; their worst
/// result is handed in as `internal` and the returned verdict is stored.
pub trait ExternalValidator: Send + Sync {
    fn properties(&self) -> &[String];

    fn validate(
        &self,
        bean: &dyn BeanView,
        property: &str,
        internal: &ValidationResult,
    ) -> ValidationResult;
}

/// Which properties a validation pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Properties(BTreeSet<String>),
}

impl Scope {
    pub fn single(property: &str) -> Self {
        Self::Properties(BTreeSet::from([property.to_string()]))
    }

    pub fn contains(&self, property: &str) -> bool {
        match self {
            Self::All => true,
            Self::Properties(set) => set.contains(property),
        }
    }

    /// Union of two scopes.
    pub fn merge(self, other: Scope) -> Scope {
        match (self, other) {
            (Self::Properties(mut a), Self::Properties(b)) => {
                a.extend(b);
                Self::Properties(a)
            }
            _ => Self::All,
        }
    }
}

/// Ordered set of bean validators shared by every proxy of one entity shape.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    validators: Vec<Arc<dyn BeanValidator>>,
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorSet")
            .field("len", &self.validators.len())
            .finish()
    }
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, validator: Arc<dyn BeanValidator>) {
        self.validators.push(validator);
    }

    pub fn with(mut self, validator: impl BeanValidator + 'static) -> Self {
        self.push(Arc::new(validator));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn BeanValidator> {
        self.validators.iter().map(|validator| validator.as_ref())
    }

    /// Properties to revalidate after `property` changed.
    ///
    /// That is `property` itself plus every dependency of every validator
    /// watching it. A validator without declared dependencies forces a full
    /// pass.
    pub fn closure(&self, property: &str) -> Scope {
        if self
            .validators
            .iter()
            .any(|validator| validator.dependencies().is_empty())
        {
            return Scope::All;
        }
        let mut scope = BTreeSet::from([property.to_string()]);
        for validator in &self.validators {
            let deps = validator.dependencies();
            if deps.iter().any(|dep| dep == property) {
                scope.extend(deps.iter().cloned());
            }
        }
        Scope::Properties(scope)
    }
}

/// Handle returned when an external validator is registered on a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExternalValidatorId(pub(crate) u64);

/// External validators registered on one proxy, in registration order.
#[derive(Clone, Default)]
pub struct ExternalRegistry {
    next_id: u64,
    entries: Vec<(ExternalValidatorId, Arc<dyn ExternalValidator>)>,
}

impl fmt::Debug for ExternalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl ExternalRegistry {
    pub(crate) fn register(
        &mut self,
        validator: Arc<dyn ExternalValidator>,
    ) -> ExternalValidatorId {
        self.next_id += 1;
        let id = ExternalValidatorId(self.next_id);
        self.entries.push((id, validator));
        id
    }

    pub(crate) fn unregister(
        &mut self,
        id: ExternalValidatorId,
    ) -> Option<Arc<dyn ExternalValidator>> {
        let index = self.entries.iter().position(|(entry, _)| *entry == id)?;
        Some(self.entries.remove(index).1)
    }

    /// Validators claiming `property`, in registration order.
    pub(crate) fn claiming<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a dyn ExternalValidator> + 'a {
        self.entries
            .iter()
            .filter(move |(_, validator)| validator.properties().iter().any(|p| p == property))
            .map(|(_, validator)| validator.as_ref())
    }

    /// Every property claimed by at least one registered validator.
    pub(crate) fn claimed_properties(&self) -> impl Iterator<Item = String> + '_ {
        self.entries
            .iter()
            .flat_map(|(_, validator)| validator.properties().iter().cloned())
    }

    pub fn is_delegated(&self, property: &str) -> bool {
        self.claiming(property).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{worst_of, PropertyRule, Scope, Severity, ValidationResult, ValidatorSet};
    use crate::proxy::BeanView;
    use std::collections::BTreeSet;

    fn always_ok(_bean: &dyn BeanView) -> ValidationResult {
        ValidationResult::ok()
    }

    #[test]
    fn severities_are_ordered_worst_last() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn worst_of_is_independent_of_order() {
        let inputs = [
            ValidationResult::ok(),
            ValidationResult::warning("w"),
            ValidationResult::error("e"),
        ];
        let orders = [[0, 1, 2], [2, 1, 0], [1, 2, 0], [1, 0, 2]];
        for order in orders {
            let worst = worst_of(order.iter().map(|&i| inputs[i].clone())).expect("worst");
            assert_eq!(worst.severity(), Severity::Error, "order {:?}", order);
        }
    }

    #[test]
    fn worst_of_keeps_first_seen_on_ties() {
        let worst = worst_of([
            ValidationResult::warning("first"),
            ValidationResult::warning("second"),
        ])
        .expect("worst");
        assert_eq!(worst.message(), Some("first"));
    }

    #[test]
    fn closure_includes_properties_sharing_a_validator() {
        let set = ValidatorSet::new()
            .with(PropertyRule::new("end", always_ok).depends_on("start"))
            .with(PropertyRule::new("name", always_ok));
        let expected: BTreeSet<String> = ["end", "start"].iter().map(|s| s.to_string()).collect();
        assert_eq!(set.closure("start"), Scope::Properties(expected));
        assert_eq!(set.closure("name"), Scope::single("name"));
        assert_eq!(set.closure("other"), Scope::single("other"));
    }

    #[test]
    fn closure_is_total_when_a_validator_has_no_dependencies() {
        let set = ValidatorSet::new()
            .with(PropertyRule::new("name", always_ok))
            .with(super::BeanRule::new(|_bean: &dyn BeanView| ValidationResult::ok()));
        assert_eq!(set.closure("name"), Scope::All);
    }
}
