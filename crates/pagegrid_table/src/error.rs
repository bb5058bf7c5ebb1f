//! Errors returned directly by table operations.
//!
//! Service failures are not in here: they end up as messages on the
//! affected rows. These are caller mistakes the table refuses outright.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("No {0} service is configured for this table")]
    MissingService(&'static str),

    #[error("Bean is not registered with this table")]
    UnknownBean,

    #[error("Row {row} is out of range (row count {row_count})")]
    RowOutOfRange { row: usize, row_count: usize },

    #[error("Row {0} has an operation in progress")]
    RowBusy(usize),

    #[error("Row {0} is not editable")]
    NotEditable(usize),
}
