//! Pending edits with a single-level undo/redo buffer.

use crate::model::{Record, RecordData, Value};
use std::collections::BTreeMap;

/// Original and latest value of one edited property.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub old: Value,
    pub new: Value,
}

fn base_value(base: &Record, property: &str) -> Value {
    base.value(property).cloned().unwrap_or_default()
}

/// Edits keyed by property, plus the edits parked by the last undo.
///
/// Any new edit clears the redo buffer.
#[derive(Debug, Clone, Default)]
pub(crate) struct EditBuffer {
    edits: BTreeMap<String, Edit>,
    redo: Option<BTreeMap<String, Edit>>,
}

impl EditBuffer {
    pub(crate) fn get(&self, property: &str) -> Option<&Edit> {
        self.edits.get(property)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub(crate) fn edits(&self) -> &BTreeMap<String, Edit> {
        &self.edits
    }

    pub(crate) fn can_redo(&self) -> bool {
        self.redo.is_some()
    }

    /// Record `value` for `property`.
    ///
    /// A value equal to the base removes the edit; otherwise the edit keeps
    /// the base as `old` and replaces any earlier `new`.
    ///
    /// # Returns
    /// `true` if the effective value of `property` changed.
    pub(crate) fn set(&mut self, base: &Record, property: &str, value: Value) -> bool {
        self.redo = None;
        let original = base_value(base, property);
        let current = self
            .edits
            .get(property)
            .map(|edit| edit.new.clone())
            .unwrap_or_else(|| original.clone());
        if current == value {
            return false;
        }
        if value == original {
            self.edits.remove(property);
        } else {
            self.edits.insert(
                property.to_string(),
                Edit {
                    old: original,
                    new: value,
                },
            );
        }
        true
    }

    /// Move every edit into the redo buffer.
    pub(crate) fn undo(&mut self) -> Vec<String> {
        if self.edits.is_empty() {
            return Vec::new();
        }
        let parked = std::mem::take(&mut self.edits);
        let properties = parked.keys().cloned().collect();
        self.redo = Some(parked);
        properties
    }

    /// Re-apply the edits parked by the last undo against the current base.
    pub(crate) fn redo(&mut self, base: &Record) -> Vec<String> {
        let Some(parked) = self.redo.take() else {
            return Vec::new();
        };
        let mut properties = Vec::with_capacity(parked.len());
        for (property, edit) in parked {
            let original = base_value(base, &property);
            if edit.new != original {
                self.edits.insert(
                    property.clone(),
                    Edit {
                        old: original,
                        new: edit.new,
                    },
                );
            }
            properties.push(property);
        }
        properties
    }

    /// Re-express the edits relative to a freshly loaded base.
    ///
    /// Edits whose value the new base already carries disappear.
    pub(crate) fn rebase(&mut self, base: &Record) {
        self.edits.retain(|property, edit| {
            let original = base_value(base, property);
            if edit.new == original {
                return false;
            }
            edit.old = original;
            true
        });
    }

    /// Drop edits that a completed save has persisted.
    ///
    /// Edits whose value differs from what was sent were made while the save
    /// was in flight and survive. A sent property reverted to its `base`
    /// value in the meantime becomes an edit back to that value, so the
    /// stored value does not silently win.
    pub(crate) fn forget_saved(&mut self, base: &Record, sent: &RecordData) {
        for (property, value) in sent {
            let persisted = self.edits.get(property).map(|edit| edit.new == *value);
            match persisted {
                Some(true) => {
                    self.edits.remove(property);
                }
                Some(false) => {}
                None => {
                    let current = base_value(base, property);
                    if current != *value {
                        self.edits.insert(
                            property.clone(),
                            Edit {
                                old: value.clone(),
                                new: current,
                            },
                        );
                    }
                }
            }
        }
    }

    pub(crate) fn changed_values(&self) -> RecordData {
        self.edits
            .iter()
            .map(|(property, edit)| (property.clone(), edit.new.clone()))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.edits.clear();
        self.redo = None;
    }
}
