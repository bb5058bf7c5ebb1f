//! Row proxies: editable views over immutable fetched records.
//!
//! A proxy is in exactly one of three shapes:
//! - *transient*: built from default values, no server id yet;
//! - *dummy*: a placeholder for rows still loading, never validated;
//! - *persisted*: wraps a record with a stable id and version.
//!
//! The trailing new-row editor is a transient proxy flagged as last-row
//! dummy; it is not validated until its first edit promotes it.

mod edits;
mod factory;
mod message;

pub use edits::Edit;
pub use factory::BeanProxyFactory;
pub use message::{BeanMessage, MessageKind};

use crate::events::EventBus;
use crate::execution::{ExecutionHandle, ExecutionId};
use crate::model::{Record, RecordData, RecordId, Value};
use crate::validation::{
    ExternalRegistry, ExternalValidator, ExternalValidatorId, Scope, Severity, ValidationCache,
    ValidationResult, ValidatorSet,
};
use crossbeam_channel::Receiver;
use edits::EditBuffer;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read access to a bean's current state, handed to validators.
pub trait BeanView {
    /// Current value: the pending edit if any, else the base value.
    fn value(&self, property: &str) -> Option<&Value>;

    /// Value of the underlying fetched record.
    fn base_value(&self, property: &str) -> Option<&Value>;

    fn is_property_modified(&self, property: &str) -> bool;

    fn is_transient(&self) -> bool;
}

impl BeanView for Record {
    fn value(&self, property: &str) -> Option<&Value> {
        Record::value(self, property)
    }

    fn base_value(&self, property: &str) -> Option<&Value> {
        Record::value(self, property)
    }

    fn is_property_modified(&self, _property: &str) -> bool {
        false
    }

    fn is_transient(&self) -> bool {
        self.id.is_none()
    }
}

/// Identity of a proxy within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(u64);

impl ProxyId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bean-{}", self.0)
    }
}

/// What two proxies are compared by: the backing id when present, else the
/// proxy itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BeanIdentity {
    Record(RecordId),
    Local(ProxyId),
}

/// Notifications emitted by one proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum BeanEvent {
    PropertyChanged { property: String },
    /// The base record was replaced (refresh, save, background reload).
    BaseChanged,
    ModificationStateChanged { modified: bool },
    ValidationStateChanged { result: ValidationResult },
    ProcessStateChanged { executing: bool },
    MessagesChanged,
    Disposed,
}

#[derive(Debug, Clone, Copy, Default)]
struct ProxyFlags {
    dummy: bool,
    last_row_dummy: bool,
}

struct BeanValues<'a> {
    base: &'a Record,
    edits: &'a EditBuffer,
    transient: bool,
}

impl BeanView for BeanValues<'_> {
    fn value(&self, property: &str) -> Option<&Value> {
        match self.edits.get(property) {
            Some(edit) => Some(&edit.new),
            None => self.base.value(property),
        }
    }

    fn base_value(&self, property: &str) -> Option<&Value> {
        self.base.value(property)
    }

    fn is_property_modified(&self, property: &str) -> bool {
        self.edits.get(property).is_some()
    }

    fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Mutable wrapper around one immutable base record.
#[derive(Debug)]
pub struct RowProxy {
    id: ProxyId,
    base: Arc<Record>,
    properties: Arc<[String]>,
    edits: EditBuffer,
    messages: Vec<BeanMessage>,
    validators: ValidatorSet,
    externals: ExternalRegistry,
    validation: ValidationCache,
    execution: Option<ExecutionHandle>,
    flags: ProxyFlags,
    events: EventBus<BeanEvent>,
}

impl RowProxy {
    pub(crate) fn new(
        base: Arc<Record>,
        properties: Arc<[String]>,
        validators: ValidatorSet,
    ) -> Self {
        Self {
            id: ProxyId::next(),
            base,
            properties,
            edits: EditBuffer::default(),
            messages: Vec::new(),
            validators,
            externals: ExternalRegistry::default(),
            validation: ValidationCache::default(),
            execution: None,
            flags: ProxyFlags::default(),
            events: EventBus::new(),
        }
    }

    /// Placeholder for rows that are still loading.
    pub fn dummy(execution: Option<ExecutionHandle>) -> Self {
        let mut proxy = Self::new(
            Arc::new(Record::default()),
            Arc::from(Vec::new()),
            ValidatorSet::new(),
        );
        proxy.flags.dummy = true;
        proxy.execution = execution;
        proxy
    }

    pub(crate) fn mark_last_row_dummy(&mut self) {
        self.flags.last_row_dummy = true;
    }

    /// Turn the trailing new-row editor into an ordinary transient bean.
    pub fn promote_last_row_dummy(&mut self) {
        if !self.flags.last_row_dummy {
            return;
        }
        self.flags.last_row_dummy = false;
        self.revalidate(Scope::All);
    }

    fn skips_validation(&self) -> bool {
        self.flags.dummy || self.flags.last_row_dummy
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn record(&self) -> &Arc<Record> {
        &self.base
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.base.id.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.base.version
    }

    pub fn identity(&self) -> BeanIdentity {
        match self.record_id() {
            Some(id) => BeanIdentity::Record(id.clone()),
            None => BeanIdentity::Local(self.id),
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.flags.dummy
    }

    pub fn is_last_row_dummy(&self) -> bool {
        self.flags.last_row_dummy
    }

    pub fn is_transient(&self) -> bool {
        !self.flags.dummy && self.base.id.is_none()
    }

    pub fn is_persisted(&self) -> bool {
        !self.flags.dummy && self.base.id.is_some()
    }

    /// Every property this proxy knows: declared, carried by the record,
    /// edited, or claimed by an external validator.
    pub fn property_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.properties.iter().cloned().collect();
        names.extend(self.base.values.keys().cloned());
        names.extend(self.edits.edits().keys().cloned());
        names
    }

    pub fn value(&self, property: &str) -> Option<&Value> {
        match self.edits.get(property) {
            Some(edit) => Some(&edit.new),
            None => self.base.value(property),
        }
    }

    pub fn base_value(&self, property: &str) -> Option<&Value> {
        self.base.value(property)
    }

    /// Change one property.
    ///
    /// Setting a property back to its base value removes the edit. The
    /// affected validation scope is re-run; validator output never aborts the
    /// edit.
    ///
    /// # Returns
    /// `true` if the effective value changed.
    pub fn set_value(&mut self, property: &str, value: Value) -> bool {
        let was_modified = self.has_modifications();
        if !self.edits.set(&self.base, property, value) {
            return false;
        }
        self.events.emit(BeanEvent::PropertyChanged {
            property: property.to_string(),
        });
        let scope = self.validators.closure(property);
        self.after_edit(was_modified, scope);
        true
    }

    pub fn has_modifications(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn is_property_modified(&self, property: &str) -> bool {
        self.edits.get(property).is_some()
    }

    pub fn modifications(&self) -> &BTreeMap<String, Edit> {
        self.edits.edits()
    }

    /// New values of every pending edit.
    pub fn changed_values(&self) -> RecordData {
        self.edits.changed_values()
    }

    /// Base values overlaid with pending edits; the payload for a create call.
    pub fn current_values(&self) -> RecordData {
        let mut values = self.base.values.clone();
        values.extend(self.edits.changed_values());
        values
    }

    /// Drop every pending edit, keeping them for [`Self::redo_modifications`].
    pub fn undo_modifications(&mut self) -> bool {
        let was_modified = self.has_modifications();
        let properties = self.edits.undo();
        if properties.is_empty() {
            return false;
        }
        let scope = self.scope_for(&properties);
        self.emit_properties(properties);
        self.after_edit(was_modified, scope);
        true
    }

    /// Restore the edits removed by the last undo.
    pub fn redo_modifications(&mut self) -> bool {
        let was_modified = self.has_modifications();
        let properties = self.edits.redo(&self.base);
        if properties.is_empty() {
            return false;
        }
        let scope = self.scope_for(&properties);
        self.emit_properties(properties);
        self.after_edit(was_modified, scope);
        true
    }

    pub fn can_redo(&self) -> bool {
        self.edits.can_redo()
    }

    /// Discard all edits and the redo buffer.
    pub fn clear_modifications(&mut self) {
        let was_modified = self.has_modifications();
        if !was_modified && !self.edits.can_redo() {
            return;
        }
        self.edits.clear();
        self.after_edit(was_modified, Scope::All);
    }

    /// Replace the base record and apply pending edits over it.
    pub fn rebase(&mut self, record: Arc<Record>) {
        let was_modified = self.has_modifications();
        self.base = record;
        self.edits.rebase(&self.base);
        self.events.emit(BeanEvent::BaseChanged);
        self.after_edit(was_modified, Scope::All);
    }

    /// Adopt the record returned by a completed save.
    ///
    /// Edits that were part of the save (`sent`) are dropped; edits made while
    /// the save was in flight are re-applied over the new base, including a
    /// sent property reverted to its previous value. A transient proxy becomes
    /// persisted here.
    pub fn commit_saved(&mut self, record: Arc<Record>, sent: &RecordData) {
        self.edits.forget_saved(&self.base, sent);
        self.clear_messages();
        self.rebase(record);
    }

    fn scope_for(&self, properties: &[String]) -> Scope {
        properties
            .iter()
            .map(|property| self.validators.closure(property))
            .reduce(Scope::merge)
            .unwrap_or(Scope::Properties(BTreeSet::new()))
    }

    fn emit_properties(&mut self, properties: Vec<String>) {
        for property in properties {
            self.events.emit(BeanEvent::PropertyChanged { property });
        }
    }

    fn after_edit(&mut self, was_modified: bool, scope: Scope) {
        let modified = self.has_modifications();
        if modified != was_modified {
            self.events
                .emit(BeanEvent::ModificationStateChanged { modified });
        }
        self.revalidate(scope);
    }

    fn revalidate(&mut self, scope: Scope) {
        if self.skips_validation() {
            return;
        }
        let before = self.validation.consolidated();
        self.run_validation(&scope);
        let after = self.validation.consolidated();
        if before != after {
            self.events
                .emit(BeanEvent::ValidationStateChanged { result: after });
        }
    }

    fn run_validation(&mut self, scope: &Scope) {
        let mut properties = self.property_names();
        properties.extend(self.externals.claimed_properties());
        let view = BeanValues {
            base: &self.base,
            edits: &self.edits,
            transient: self.base.id.is_none(),
        };
        self.validation
            .run(&view, &properties, scope, &self.validators, &self.externals);
    }

    /// First validation pass after the proxy becomes live. Emits nothing.
    pub(crate) fn prime_validation(&mut self) {
        if !self.skips_validation() {
            self.run_validation(&Scope::All);
        }
    }

    /// Invalidate every cached result and validate again.
    pub fn fire_validation_conditions_changed(&mut self) {
        self.revalidate(Scope::All);
    }

    /// Consolidated result: first non-ok property result, else the
    /// property-independent result, else ok.
    pub fn validation_result(&self) -> ValidationResult {
        self.validation.consolidated()
    }

    pub fn property_validation(&self, property: &str) -> Option<&ValidationResult> {
        self.validation.property_result(property)
    }

    pub fn validation(&self) -> &ValidationCache {
        &self.validation
    }

    /// Delegate the verdict for `validator.properties()` to `validator`.
    ///
    /// The delegated properties are validated again right away.
    pub fn register_external_validator(
        &mut self,
        validator: Arc<dyn ExternalValidator>,
    ) -> ExternalValidatorId {
        let scope = Scope::Properties(validator.properties().iter().cloned().collect());
        let id = self.externals.register(validator);
        self.revalidate(scope);
        id
    }

    /// Return the delegated properties to internal validation.
    pub fn unregister_external_validator(&mut self, id: ExternalValidatorId) -> bool {
        let Some(validator) = self.externals.unregister(id) else {
            return false;
        };
        let scope = Scope::Properties(validator.properties().iter().cloned().collect());
        self.revalidate(scope);
        true
    }

    pub fn is_delegated(&self, property: &str) -> bool {
        self.externals.is_delegated(property)
    }

    pub fn messages(&self) -> &[BeanMessage] {
        &self.messages
    }

    pub fn add_message(&mut self, message: BeanMessage) {
        self.messages.push(message);
        self.events.emit(BeanEvent::MessagesChanged);
    }

    pub fn clear_messages(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        self.messages.clear();
        self.events.emit(BeanEvent::MessagesChanged);
    }

    /// Most severe message, first-seen on ties.
    pub fn worst_message(&self) -> Option<&BeanMessage> {
        self.messages
            .iter()
            .fold(None, |worst: Option<&BeanMessage>, message| match worst {
                Some(current) if message.kind <= current.kind => Some(current),
                _ => Some(message),
            })
    }

    /// Severity cue for the whole row: worst of validation and messages.
    pub fn row_severity(&self) -> Severity {
        let messages = self
            .messages
            .iter()
            .map(BeanMessage::severity)
            .max()
            .unwrap_or_default();
        messages.max(self.validation_result().severity())
    }

    pub fn execution(&self) -> Option<&ExecutionHandle> {
        self.execution.as_ref()
    }

    pub fn has_execution(&self) -> bool {
        self.execution.is_some()
    }

    /// Attach the handle of an operation working on this bean.
    ///
    /// A previously attached handle is replaced (not cancelled).
    pub fn attach_execution(&mut self, handle: ExecutionHandle) {
        let was_executing = self.has_execution();
        self.execution = Some(handle);
        if !was_executing {
            self.events
                .emit(BeanEvent::ProcessStateChanged { executing: true });
        }
    }

    /// Detach the execution `id` if it is the attached one.
    pub fn detach_execution(&mut self, id: ExecutionId) -> bool {
        if self.execution.as_ref().map(ExecutionHandle::id) != Some(id) {
            return false;
        }
        self.execution = None;
        self.events
            .emit(BeanEvent::ProcessStateChanged { executing: false });
        true
    }

    /// Subscribe to this proxy's events. Drop the receiver to unsubscribe.
    pub fn subscribe(&mut self) -> Receiver<BeanEvent> {
        self.events.subscribe()
    }

    /// Tear the proxy down: notify and disconnect subscribers, release the record.
    pub fn dispose(mut self) {
        self.events.emit(BeanEvent::Disposed);
        self.events.close();
    }
}

impl PartialEq for RowProxy {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}
