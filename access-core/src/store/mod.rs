//! Generic persistence
//!
//! - [`storage`]: the backend contract and shared select/count execution
//! - [`memory`], [`redb_store`]: the two backends
//! - [`table`], [`policy`]: how an entity maps onto a table
//! - [`dao`]: the entity store running the lifecycle on top of all that

pub mod dao;
pub mod event;
pub mod memory;
pub mod monitor;
pub mod policy;
pub mod redb_store;
pub mod retry;
pub mod row;
pub mod storage;
pub mod table;

pub use dao::EntityStore;
pub use event::{DaoEvent, DaoEventType, EventPublisher};
pub use memory::MemoryStorage;
pub use monitor::CountMonitor;
pub use policy::{Entity, EntityPolicy, MappingError};
pub use redb_store::RedbStorage;
pub use retry::{RetryPolicy, TransientClassifier, with_retry};
pub use row::Row;
pub use storage::{RowSource, Storage, StorageError, StorageResult, Transaction};
pub use table::{DataType, EntityTable, Field, bool_to_char, char_to_bool};
