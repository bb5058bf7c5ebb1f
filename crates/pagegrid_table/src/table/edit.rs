//! Edits, locally added rows and cell display state.

use super::BeanTable;
use crate::cell::CellState;
use crate::events::TableEvent;
use crate::TableError;
use pagegrid_core::model::Value;
use pagegrid_core::proxy::{ProxyId, RowProxy};

impl BeanTable {
    /// Set `property` on the bean at `row`.
    ///
    /// Editing the trailing new-row editor turns it into an added bean and
    /// puts a fresh editor after it.
    ///
    /// # Returns
    /// `true` if the effective value changed.
    ///
    /// # Errors
    /// - [`TableError::RowOutOfRange`] for rows past the end.
    /// - [`TableError::NotEditable`] while the row is still loading.
    /// - [`TableError::RowBusy`] while an operation runs on the row.
    pub fn set_value(
        &mut self,
        row: usize,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<bool, TableError> {
        let id = self.editable_bean(row)?;
        let value = value.into();
        let changed = self
            .tracker
            .update(id, |proxy| proxy.set_value(property, value))
            .ok_or(TableError::UnknownBean)?;
        if !changed {
            return Ok(false);
        }
        if self.store.last_row_dummy() == Some(id) {
            self.promote_last_row_dummy(id);
        }
        self.emit(TableEvent::RowsChanged(vec![row]));
        Ok(true)
    }

    /// Drop every pending edit of the bean at `row`, keeping them for redo.
    pub fn undo(&mut self, row: usize) -> Result<bool, TableError> {
        self.edit_row(row, RowProxy::undo_modifications)
    }

    /// Re-apply the edits removed by the last undo on `row`.
    pub fn redo(&mut self, row: usize) -> Result<bool, TableError> {
        self.edit_row(row, RowProxy::redo_modifications)
    }

    fn edit_row(
        &mut self,
        row: usize,
        edit: impl FnOnce(&mut RowProxy) -> bool,
    ) -> Result<bool, TableError> {
        let id = self.editable_bean(row)?;
        let changed = self
            .tracker
            .update(id, edit)
            .ok_or(TableError::UnknownBean)?;
        if changed {
            self.emit(TableEvent::RowsChanged(vec![row]));
        }
        Ok(changed)
    }

    fn editable_bean(&self, row: usize) -> Result<ProxyId, TableError> {
        let row_count = self.store.row_count();
        if row >= row_count {
            return Err(TableError::RowOutOfRange { row, row_count });
        }
        let id = self.store.slot(row).ok_or(TableError::NotEditable(row))?;
        let proxy = self.tracker.get(id).ok_or(TableError::UnknownBean)?;
        if proxy.is_dummy() {
            return Err(TableError::NotEditable(row));
        }
        if proxy.has_execution() {
            return Err(TableError::RowBusy(row));
        }
        Ok(id)
    }

    fn promote_last_row_dummy(&mut self, id: ProxyId) {
        self.tracker
            .update(id, RowProxy::promote_last_row_dummy);
        self.store.push_added(id);
        let next = self.tracker.register(self.factory.create_last_row_dummy());
        self.store.set_last_row_dummy(Some(next));
        let row = self.store.row_count() - 1;
        self.emit(TableEvent::BeansAdded(vec![row]));
    }

    /// Append a new transient bean built from the factory defaults.
    ///
    /// # Returns
    /// The row of the new bean.
    pub fn add_bean(&mut self) -> usize {
        let id = self.tracker.register(self.factory.create_transient());
        let row = self.store.push_added(id);
        self.emit(TableEvent::BeansAdded(vec![row]));
        row
    }

    /// Display state of one cell; starts loading the row's page if needed.
    pub fn cell(&mut self, row: usize, property: &str) -> Option<CellState> {
        self.get_bean(row)
            .map(|proxy| CellState::of(proxy, property))
    }
}
