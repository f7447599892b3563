//! Local store collaborator: the trait the engine writes through and its
//! backends.

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::{InMemoryStore, StoreOp, WriteCounts};
pub use sql::SqlStore;
pub use traits::{Filter, RecordHandle, RecordStore, StorageError, StoredRecord};
