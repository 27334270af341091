use super::RecordStore;
use crate::dataset::WriteOperation;
use crate::error::StoreError;
use crate::schema::{self, TableSchema};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// Store used by `--dry-run`: keeps transaction bookkeeping honest but writes
/// nothing. Keys inserted during the run are remembered per table, so an
/// update matches only a row inserted earlier in the same run. Rows already in
/// the database are not consulted.
#[derive(Debug, Default)]
pub struct DryRunStore {
    open: bool,
    pending: Vec<(&'static str, String)>,
    keys: HashSet<(&'static str, String)>,
    pub inserts: u64,
    pub updates: u64,
    pub commits: u64,
}

impl DryRunStore {
    fn known(&self, table: &'static str, key: &str) -> bool {
        self.keys.contains(&(table, key.to_string()))
            || self.pending.iter().any(|(t, k)| *t == table && k == key)
    }
}

#[async_trait]
impl RecordStore for DryRunStore {
    async fn ensure_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError> {
        debug!(table = table.name, "dry run: would ensure table");
        Ok(())
    }

    async fn truncate_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError> {
        debug!(table = table.name, "dry run: would truncate table");
        self.keys.retain(|(t, _)| *t != table.name);
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.open {
            return Err(StoreError::TransactionOpen);
        }
        self.open = true;
        Ok(())
    }

    async fn write(&mut self, op: &WriteOperation) -> Result<u64, StoreError> {
        if !self.open {
            return Err(StoreError::NoTransaction);
        }
        match op {
            WriteOperation::Insert { table, record } => {
                self.inserts += 1;
                let key_column = schema::table(table)
                    .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?
                    .key;
                if let Some(key) = record.get(key_column) {
                    self.pending.push((*table, key.to_string()));
                }
                Ok(1)
            }
            WriteOperation::Update { table, key, .. } => {
                self.updates += 1;
                Ok(u64::from(self.known(*table, &key.1)))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::NoTransaction);
        }
        self.open = false;
        self.commits += 1;
        self.keys.extend(self.pending.drain(..));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.open = false;
        self.pending.clear();
        Ok(())
    }
}
