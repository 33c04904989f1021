//! Action Queue Store
//!
//! Durable FIFO of offline actions waiting to be applied remotely. Domain code
//! appends, the sync manager removes; records are never edited in place.

pub mod errors;
pub mod memory_store;
pub mod migrations;
pub mod sql_store;
pub mod traits;

pub use errors::{StorageError, StorageResult};
pub use memory_store::MemoryActionStore;
pub use migrations::{migrate, CURRENT_QUEUE_SCHEMA_VERSION};
pub use sql_store::{CorruptedRecord, SqlActionStore};
pub use traits::{ActionQueueStore, QuarantinedAction};
