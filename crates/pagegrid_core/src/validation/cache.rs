//! Per-proxy memoized validation results.

use super::{keep_worst, ExternalRegistry, Scope, ValidationResult, ValidatorSet};
use crate::proxy::BeanView;
use std::collections::{BTreeMap, BTreeSet};

/// Cached outcome of the last validation pass for every property.
///
/// Results stay valid until the owning proxy runs another pass over the
/// affected scope.
#[derive(Debug, Clone, Default)]
pub struct ValidationCache {
    results: BTreeMap<String, ValidationResult>,
    independent: Option<ValidationResult>,
    passes: u64,
}

impl ValidationCache {
    /// Run one pass over `scope` and replace the cached results it covers.
    ///
    /// Within the pass the worst result per property wins. Delegated
    /// properties get their internal verdict first, then every external
    /// validator claiming them in turn.
    pub(crate) fn run(
        &mut self,
        bean: &dyn BeanView,
        properties: &BTreeSet<String>,
        scope: &Scope,
        validators: &ValidatorSet,
        externals: &ExternalRegistry,
    ) {
        let targets: Vec<&String> = match scope {
            Scope::All => {
                self.results.clear();
                properties.iter().collect()
            }
            Scope::Properties(set) => set.iter().collect(),
        };
        for property in targets {
            let mut worst = None;
            for validator in validators.iter().filter(|v| v.watches(property)) {
                for result in validator.validate_property(bean, property) {
                    keep_worst(&mut worst, result);
                }
            }
            let mut verdict = worst.unwrap_or_default();
            for external in externals.claiming(property) {
                verdict = external.validate(bean, property, &verdict);
            }
            self.results.insert(property.clone(), verdict);
        }

        let mut independent = None;
        for validator in validators.iter() {
            for result in validator.validate_bean(bean) {
                keep_worst(&mut independent, result);
            }
        }
        self.independent = independent;
        self.passes += 1;
    }

    pub fn property_result(&self, property: &str) -> Option<&ValidationResult> {
        self.results.get(property)
    }

    pub fn independent_result(&self) -> Option<&ValidationResult> {
        self.independent.as_ref()
    }

    /// First non-ok property result, else the independent result, else ok.
    pub fn consolidated(&self) -> ValidationResult {
        self.results
            .values()
            .find(|result| !result.is_ok())
            .or(self.independent.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.independent = None;
    }
}
