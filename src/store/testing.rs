//! In-memory store that records every call, for driver and pipeline tests.

use super::RecordStore;
use crate::dataset::WriteOperation;
use crate::error::StoreError;
use crate::schema::TableSchema;
use async_trait::async_trait;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EnsureTable(String),
    Truncate(String),
    Begin,
    Write(WriteOperation),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct RecordingStore {
    events: Vec<Event>,
    created: Vec<String>,
    open: bool,
    pending: Vec<WriteOperation>,
    committed: Vec<WriteOperation>,
    keys: HashSet<String>,
    fail_on_write: Option<usize>,
    writes: usize,
}

impl RecordingStore {
    /// Fail the n-th write (1-based) with a storage error.
    pub fn failing_on_write(n: usize) -> Self {
        Self {
            fail_on_write: Some(n),
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn created_tables(&self) -> Vec<&str> {
        self.created.iter().map(String::as_str).collect()
    }

    pub fn committed(&self) -> &[WriteOperation] {
        &self.committed
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events.iter().filter(|e| *e == wanted).count()
    }

    pub fn writes(&self) -> Vec<&WriteOperation> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Write(op) => Some(op),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn ensure_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError> {
        self.events.push(Event::EnsureTable(table.name.to_string()));
        if !self.created.iter().any(|t| t == table.name) {
            self.created.push(table.name.to_string());
        }
        Ok(())
    }

    async fn truncate_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError> {
        self.events.push(Event::Truncate(table.name.to_string()));
        self.committed.retain(|op| op.table() != table.name);
        self.keys.clear();
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.open {
            return Err(StoreError::TransactionOpen);
        }
        self.open = true;
        self.events.push(Event::Begin);
        Ok(())
    }

    async fn write(&mut self, op: &WriteOperation) -> Result<u64, StoreError> {
        if !self.open {
            return Err(StoreError::NoTransaction);
        }
        self.writes += 1;
        if self.fail_on_write == Some(self.writes) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "duplicate key value violates unique constraint".to_string(),
            )));
        }
        self.events.push(Event::Write(op.clone()));
        self.pending.push(op.clone());
        let affected = match op {
            WriteOperation::Insert { record, .. } => {
                if let Some((_, key)) = record.iter().next() {
                    self.keys.insert(key.to_string());
                }
                1
            }
            WriteOperation::Update { key, .. } => u64::from(self.keys.contains(&key.1)),
        };
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::NoTransaction);
        }
        self.open = false;
        self.events.push(Event::Commit);
        self.committed.append(&mut self.pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if self.open {
            self.open = false;
            self.events.push(Event::Rollback);
            self.pending.clear();
        }
        Ok(())
    }
}
