//! Storage seam between the load driver and the destination database.
//!
//! The driver owns a store exclusively for the duration of a file. At most one
//! transaction is open at a time; `write` is only valid inside it.

pub mod dry_run;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use crate::dataset::WriteOperation;
use crate::error::StoreError;
use crate::schema::TableSchema;
use async_trait::async_trait;

pub use dry_run::DryRunStore;
pub use postgres::PgRecordStore;

#[async_trait]
pub trait RecordStore: Send {
    /// Create the table and its indexes when absent.
    async fn ensure_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError>;

    async fn truncate_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError>;

    async fn begin(&mut self) -> Result<(), StoreError>;

    /// Apply one operation inside the open transaction; returns affected rows.
    async fn write(&mut self, op: &WriteOperation) -> Result<u64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
