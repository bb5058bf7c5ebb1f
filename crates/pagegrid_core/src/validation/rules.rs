//! Closure-backed validators for the common single-property and whole-bean cases.

use super::{BeanValidator, ValidationResult};
use crate::proxy::BeanView;

type Check = Box<dyn Fn(&dyn BeanView) -> ValidationResult + Send + Sync>;

/// Validates one property; may read others declared via [`Self::depends_on`].
pub struct PropertyRule {
    property: String,
    dependencies: Vec<String>,
    check: Check,
}

impl PropertyRule {
    pub fn new<F>(property: &str, check: F) -> Self
    where
        F: Fn(&dyn BeanView) -> ValidationResult + Send + Sync + 'static,
    {
        Self {
            property: property.to_string(),
            dependencies: vec![property.to_string()],
            check: Box::new(check),
        }
    }

    /// Declare another property the check reads.
    pub fn depends_on(mut self, property: &str) -> Self {
        if !self.dependencies.iter().any(|dep| dep == property) {
            self.dependencies.push(property.to_string());
        }
        self
    }
}

impl BeanValidator for PropertyRule {
    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn validate_property(&self, bean: &dyn BeanView, property: &str) -> Vec<ValidationResult> {
        if property == self.property {
            vec![(self.check)(bean)]
        } else {
            Vec::new()
        }
    }
}

/// Produces a property-independent result for the whole bean.
pub struct BeanRule {
    dependencies: Vec<String>,
    check: Check,
}

impl BeanRule {
    /// A rule without declared dependencies; it runs on every change.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&dyn BeanView) -> ValidationResult + Send + Sync + 'static,
    {
        Self {
            dependencies: Vec::new(),
            check: Box::new(check),
        }
    }

    pub fn depends_on(mut self, property: &str) -> Self {
        self.dependencies.push(property.to_string());
        self
    }
}

impl BeanValidator for BeanRule {
    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn validate_property(&self, _bean: &dyn BeanView, _property: &str) -> Vec<ValidationResult> {
        Vec::new()
    }

    fn validate_bean(&self, bean: &dyn BeanView) -> Vec<ValidationResult> {
        vec![(self.check)(bean)]
    }
}
