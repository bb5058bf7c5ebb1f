//! Records, values and the query vocabulary passed to reader services.

mod query;
mod record;
mod value;

pub use query::{CountRequest, Filter, ReadRequest, SortKey};
pub use record::{Record, RecordData, RecordId, RecordKey, RecordModification};
pub use value::Value;
