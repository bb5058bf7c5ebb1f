//! Construction of row proxies with injected validators and defaults.

use super::RowProxy;
use crate::model::{Record, RecordData, Value};
use crate::validation::{BeanValidator, ValidatorSet};
use std::sync::Arc;

/// Builds proxies for one entity shape.
///
/// Validators and default values are handed in here rather than looked up
/// per row.
#[derive(Debug, Clone)]
pub struct BeanProxyFactory {
    properties: Arc<[String]>,
    validators: ValidatorSet,
    defaults: RecordData,
}

impl BeanProxyFactory {
    pub fn new<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
            validators: ValidatorSet::new(),
            defaults: RecordData::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl BeanValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    /// Default value assigned to `property` on every new transient bean.
    pub fn with_default(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(property.to_string(), value.into());
        self
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// Proxy over a fetched record.
    pub fn create(&self, record: Record) -> RowProxy {
        self.create_shared(Arc::new(record))
    }

    pub fn create_shared(&self, record: Arc<Record>) -> RowProxy {
        RowProxy::new(record, self.properties.clone(), self.validators.clone())
    }

    /// New transient bean carrying the default values as its base.
    pub fn create_transient(&self) -> RowProxy {
        self.create(Record::transient(self.defaults.clone()))
    }

    /// Trailing new-row editor; stays out of the to-create set until edited.
    pub fn create_last_row_dummy(&self) -> RowProxy {
        let mut proxy = self.create_transient();
        proxy.mark_last_row_dummy();
        proxy
    }
}
