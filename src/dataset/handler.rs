use crate::error::RowShapeError;
use crate::tsv::{Header, NamedRecord, Row};

/// A single write destined for the target store. Executed once, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOperation {
    Insert {
        table: &'static str,
        record: NamedRecord,
    },
    Update {
        table: &'static str,
        /// Key column and the value to match.
        key: (String, String),
        /// Columns to overwrite, in order.
        set: Vec<(String, String)>,
    },
}

impl WriteOperation {
    pub fn table(&self) -> &'static str {
        match self {
            WriteOperation::Insert { table, .. } | WriteOperation::Update { table, .. } => table,
        }
    }
}

/// Per-file-type strategy turning a data row into a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetHandler {
    /// Insert the full named record; only for rows as wide as the header.
    PrimaryRecord { table: &'static str },
    /// Update keyed by field 1 with fields 2 and 3, whatever the header says.
    MeasurementOverlay {
        table: &'static str,
        key_column: &'static str,
        columns: [&'static str; 2],
    },
}

impl DatasetHandler {
    pub fn emit(&self, header: &Header, row: &Row) -> Result<WriteOperation, RowShapeError> {
        match *self {
            DatasetHandler::PrimaryRecord { table } => {
                let record = header.name(row)?;
                Ok(WriteOperation::Insert { table, record })
            }
            DatasetHandler::MeasurementOverlay {
                table,
                key_column,
                columns,
            } => {
                let needed = 1 + columns.len();
                let field = |idx: usize| {
                    row.get(idx).ok_or(RowShapeError::TooShort {
                        needed,
                        found: row.len(),
                    })
                };
                let key = field(0)?.to_string();
                let set = columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| field(i + 1).map(|v| (col.to_string(), v.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(WriteOperation::Update {
                    table,
                    key: (key_column.to_string(), key),
                    set,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERLAY: DatasetHandler = DatasetHandler::MeasurementOverlay {
        table: "title",
        key_column: "tconst",
        columns: ["averageRating", "numVotes"],
    };

    fn header(fields: Vec<&str>) -> Header {
        Header::from_row(&Row::from(fields))
    }

    #[test]
    fn primary_record_inserts_full_rows_only() {
        let handler = DatasetHandler::PrimaryRecord { table: "title" };
        let h = header(vec!["a", "b", "c"]);

        let op = handler.emit(&h, &Row::from(vec!["1", "x", "y"])).unwrap();
        assert_eq!(
            op,
            WriteOperation::Insert {
                table: "title",
                record: NamedRecord::from_pairs([("a", "1"), ("b", "x"), ("c", "y")]),
            }
        );

        let err = handler.emit(&h, &Row::from(vec!["2", "z"])).unwrap_err();
        assert_eq!(
            err,
            RowShapeError::FieldCount {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn overlay_ignores_header_width() {
        let h = header(vec!["tconst", "averageRating", "numVotes", "extra"]);
        let op = OVERLAY.emit(&h, &Row::from(vec!["tt1", "8.5", "100"])).unwrap();
        assert_eq!(
            op,
            WriteOperation::Update {
                table: "title",
                key: ("tconst".to_string(), "tt1".to_string()),
                set: vec![
                    ("averageRating".to_string(), "8.5".to_string()),
                    ("numVotes".to_string(), "100".to_string()),
                ],
            }
        );
        assert_eq!(op.table(), "title");
    }

    #[test]
    fn overlay_uses_first_three_fields_of_wider_rows() {
        let h = header(vec!["tconst", "averageRating", "numVotes"]);
        let op = OVERLAY
            .emit(&h, &Row::from(vec!["tt9", "6.1", "12", "ignored"]))
            .unwrap();
        assert!(matches!(op, WriteOperation::Update { ref key, .. } if key.1 == "tt9"));
    }

    #[test]
    fn overlay_short_row_is_a_shape_error() {
        let h = header(vec!["tconst", "averageRating", "numVotes"]);
        assert_eq!(
            OVERLAY.emit(&h, &Row::from(vec!["tt1", "8.5"])),
            Err(RowShapeError::TooShort {
                needed: 3,
                found: 2
            })
        );
    }
}
