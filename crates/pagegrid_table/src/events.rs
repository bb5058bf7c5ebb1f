//! Notifications a table sends to its view.

/// Outward table signal.
///
/// Row indices refer to the row layout at the time the event was emitted.
/// Aggregate modification/process/validation state comes from
/// [`crate::BeanTable::subscribe_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    /// Row count or layout changed; repaint everything.
    DataChanged,
    RowsChanged(Vec<usize>),
    BeansAdded(Vec<usize>),
    BeansRemoved(Vec<usize>),
    SelectionChanged,
}
