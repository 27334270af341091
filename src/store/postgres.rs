use super::RecordStore;
use crate::dataset::WriteOperation;
use crate::error::StoreError;
use crate::schema::{self, quote_ident, Column, TableSchema, NULL_MARKER};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Postgres-backed store. Values are bound as text and cast in SQL against the
/// column types declared in `schema`.
pub struct PgRecordStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    upsert: bool,
    persistent: bool,
    statements: HashMap<String, String>,
}

impl PgRecordStore {
    pub fn new(pool: PgPool, upsert: bool, persistent: bool) -> Self {
        Self {
            pool,
            tx: None,
            upsert,
            persistent,
            statements: HashMap::new(),
        }
    }

    fn statement_key(op: &WriteOperation) -> String {
        match op {
            WriteOperation::Insert { table, record } => {
                format!("i:{table}:{}", record.columns().collect::<Vec<_>>().join(","))
            }
            WriteOperation::Update { table, key, set } => format!(
                "u:{table}:{}:{}",
                key.0,
                set.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>().join(",")
            ),
        }
    }

    fn render(&self, op: &WriteOperation) -> Result<String, StoreError> {
        let table = lookup(op.table())?;
        match op {
            WriteOperation::Insert { record, .. } => {
                let columns: Vec<&str> = record.columns().collect();
                insert_sql(table, &columns, self.upsert)
            }
            WriteOperation::Update { key, set, .. } => {
                let columns: Vec<&str> = set.iter().map(|(c, _)| c.as_str()).collect();
                update_sql(table, &key.0, &columns)
            }
        }
    }
}

fn lookup(name: &str) -> Result<&'static TableSchema, StoreError> {
    schema::table(name).ok_or_else(|| StoreError::UnknownTable(name.to_string()))
}

fn column<'t>(table: &'t TableSchema, name: &str) -> Result<&'t Column, StoreError> {
    table.column(name).ok_or_else(|| StoreError::UnknownColumn {
        table: table.name.to_string(),
        column: name.to_string(),
    })
}

/// `\N` binds as SQL NULL.
fn nullable(raw: &str) -> Option<&str> {
    if raw == NULL_MARKER {
        None
    } else {
        Some(raw)
    }
}

fn value_expr(column: &Column, placeholder: usize) -> String {
    let cast = format!("CAST(${placeholder} AS {})", column.ty.sql());
    match column.default {
        Some(default) if !column.nullable => format!("COALESCE({cast}, {default})"),
        _ => cast,
    }
}

pub(crate) fn insert_sql(
    table: &TableSchema,
    columns: &[&str],
    upsert: bool,
) -> Result<String, StoreError> {
    let mut names = Vec::with_capacity(columns.len());
    let mut values = Vec::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let col = column(table, name)?;
        names.push(quote_ident(col.name));
        values.push(value_expr(col, i + 1));
    }
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.name),
        names.join(", "),
        values.join(", ")
    );
    if upsert {
        let assignments: Vec<String> = columns
            .iter()
            .filter(|c| **c != table.key)
            .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
            .collect();
        sql.push_str(&format!(" ON CONFLICT ({}) ", quote_ident(table.key)));
        if assignments.is_empty() {
            sql.push_str("DO NOTHING");
        } else {
            sql.push_str("DO UPDATE SET ");
            sql.push_str(&assignments.join(", "));
        }
    }
    Ok(sql)
}

pub(crate) fn update_sql(
    table: &TableSchema,
    key_column: &str,
    columns: &[&str],
) -> Result<String, StoreError> {
    let key = column(table, key_column)?;
    let mut assignments = Vec::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let col = column(table, name)?;
        assignments.push(format!("{} = {}", quote_ident(col.name), value_expr(col, i + 1)));
    }
    Ok(format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quote_ident(table.name),
        assignments.join(", "),
        quote_ident(key.name),
        value_expr(key, columns.len() + 1)
    ))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip_all, fields(table = table.name))]
    async fn ensure_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError> {
        for stmt in table.ensure_statements() {
            sqlx::raw_sql(&stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn truncate_table(&mut self, table: &'static TableSchema) -> Result<(), StoreError> {
        sqlx::raw_sql(&table.truncate_sql())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.tx.is_some() {
            return Err(StoreError::TransactionOpen);
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn write(&mut self, op: &WriteOperation) -> Result<u64, StoreError> {
        let key = Self::statement_key(op);
        if !self.statements.contains_key(&key) {
            let sql = self.render(op)?;
            debug!(%sql, "prepared write statement");
            self.statements.insert(key.clone(), sql);
        }
        let sql = &self.statements[&key];
        let tx = self.tx.as_mut().ok_or(StoreError::NoTransaction)?;

        let mut query = sqlx::query::<Postgres>(sql).persistent(self.persistent);
        match op {
            WriteOperation::Insert { record, .. } => {
                for (_, value) in record.iter() {
                    query = query.bind(nullable(value));
                }
            }
            WriteOperation::Update { key, set, .. } => {
                for (_, value) in set {
                    query = query.bind(nullable(value));
                }
                query = query.bind(key.1.as_str());
            }
        }
        let result = query.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::NoTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
