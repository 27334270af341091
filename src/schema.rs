//! Destination table shapes and the idempotent DDL that creates them.
//!
//! Every statement rendered here is guarded with `IF NOT EXISTS`; an existing
//! table is never altered. Truncation is a separate call the pipeline makes only
//! when both the parse and truncate intents are selected.

use crate::error::StoreError;
use crate::store::RecordStore;
use tracing::info;

/// Value the dumps use for an absent field.
pub const NULL_MARKER: &str = "\\N";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    SmallInt,
    Integer,
    Real,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<&'static str>,
}

impl Column {
    const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            default: None,
        }
    }

    const fn optional(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            default: None,
        }
    }

    /// NOT NULL with a zero default; filled in by a later pass.
    const fn measured(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            default: Some("0"),
        }
    }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub key: &'static str,
    pub columns: &'static [Column],
    /// Secondary indexes, one column each.
    pub indexes: &'static [&'static str],
}

pub static TITLE: TableSchema = TableSchema {
    name: "title",
    key: "tconst",
    columns: &[
        Column::required("tconst", ColumnType::Text),
        Column::required("titleType", ColumnType::Text),
        Column::required("primaryTitle", ColumnType::Text),
        Column::required("originalTitle", ColumnType::Text),
        Column::measured("isAdult", ColumnType::SmallInt),
        Column::optional("startYear", ColumnType::SmallInt),
        Column::optional("endYear", ColumnType::SmallInt),
        Column::optional("runtimeMinutes", ColumnType::Integer),
        Column::optional("genres", ColumnType::Text),
        Column::measured("averageRating", ColumnType::Real),
        Column::measured("numVotes", ColumnType::Integer),
    ],
    indexes: &["averageRating", "endYear", "numVotes"],
};

pub static NAME: TableSchema = TableSchema {
    name: "name",
    key: "nconst",
    columns: &[
        Column::required("nconst", ColumnType::Text),
        Column::required("primaryName", ColumnType::Text),
        Column::optional("birthYear", ColumnType::SmallInt),
        Column::optional("deathYear", ColumnType::SmallInt),
        Column::optional("primaryProfession", ColumnType::Text),
        Column::optional("knownForTitles", ColumnType::Text),
    ],
    indexes: &["birthYear"],
};

static TABLES: [&TableSchema; 2] = [&TITLE, &NAME];

/// Look a destination table up by name.
pub fn table(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().copied().find(|t| t.name == name)
}

/// Double-quote an identifier; the dumps use camelCase column names.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn create_table_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote_ident(c.name), c.ty.sql());
                if !c.nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = c.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                def
            })
            .collect();
        defs.push(format!("PRIMARY KEY ({})", quote_ident(self.key)));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(self.name),
            defs.join(",\n    ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|col| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote_ident(&format!("{}_{}_idx", self.name, col)),
                    quote_ident(self.name),
                    quote_ident(col)
                )
            })
            .collect()
    }

    /// Table DDL followed by its index DDL.
    pub fn ensure_statements(&self) -> Vec<String> {
        let mut out = vec![self.create_table_sql()];
        out.extend(self.create_index_sql());
        out
    }

    pub fn truncate_sql(&self) -> String {
        format!("TRUNCATE TABLE {}", quote_ident(self.name))
    }
}

/// Create every listed table that does not exist yet. Safe to repeat.
pub async fn ensure_schema<S>(store: &mut S, tables: &[&'static TableSchema]) -> Result<(), StoreError>
where
    S: RecordStore + ?Sized,
{
    for table in tables {
        store.ensure_table(table).await?;
        info!(table = table.name, "schema ensured");
    }
    Ok(())
}

/// Destructive: empties every listed table.
pub async fn truncate<S>(store: &mut S, tables: &[&'static TableSchema]) -> Result<(), StoreError>
where
    S: RecordStore + ?Sized,
{
    for table in tables {
        info!(table = table.name, "truncating table");
        store.truncate_table(table).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{Event, RecordingStore};

    #[test]
    fn title_ddl_is_guarded_and_keyed() {
        let ddl = TITLE.create_table_sql();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"title\""));
        assert!(ddl.contains("\"tconst\" text NOT NULL"));
        assert!(ddl.contains("\"averageRating\" real NOT NULL DEFAULT 0"));
        assert!(ddl.contains("\"numVotes\" integer NOT NULL DEFAULT 0"));
        assert!(ddl.contains("\"endYear\" smallint,"));
        assert!(ddl.contains("PRIMARY KEY (\"tconst\")"));
    }

    #[test]
    fn every_statement_is_idempotent() {
        for table in TABLES {
            for stmt in table.ensure_statements() {
                assert!(stmt.contains("IF NOT EXISTS"), "{stmt}");
            }
        }
        assert_eq!(
            TITLE.create_index_sql()[0],
            "CREATE INDEX IF NOT EXISTS \"title_averageRating_idx\" ON \"title\" (\"averageRating\")"
        );
    }

    #[test]
    fn lookup_and_quoting() {
        assert_eq!(table("title").map(|t| t.key), Some("tconst"));
        assert_eq!(table("name").map(|t| t.key), Some("nconst"));
        assert!(table("episode").is_none());
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(TITLE.column("genres").map(|c| c.nullable), Some(true));
        assert_eq!(TITLE.truncate_sql(), "TRUNCATE TABLE \"title\"");
    }

    #[tokio::test]
    async fn ensure_schema_twice_creates_shape_once() {
        let mut store = RecordingStore::default();
        ensure_schema(&mut store, &[&TITLE]).await.unwrap();
        ensure_schema(&mut store, &[&TITLE]).await.unwrap();
        assert_eq!(store.created_tables(), vec!["title"]);
        assert_eq!(
            store
                .events()
                .iter()
                .filter(|e| matches!(e, Event::EnsureTable(_)))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn truncate_only_touches_listed_tables() {
        let mut store = RecordingStore::default();
        truncate(&mut store, &[&TITLE]).await.unwrap();
        assert_eq!(store.events(), &[Event::Truncate("title".to_string())]);
    }
}
