use chrono::{DateTime, Utc};
use import_model::Disposition;
use rusqlite::types::{Null, ToSqlOutput, Value};
use rusqlite::{Connection, ToSql};

use crate::error::TableError;

/// Output abstraction a per-table agent writes rows through (SPEC_FULL.md
/// §4.9.1), unchanged from the distilled spec's `TableWriter` interface:
/// cell-at-a-time writes, independent of what any one cell's source type
/// was, followed by one `write_end_of_line` per row.
pub trait TableWriter: Send {
    /// Fixes the column order for this table. Called exactly once,
    /// before the first row, with the column names in the order every
    /// subsequent `write_*` call will supply them.
    fn set_columns(&mut self, columns: &[String]) -> Result<(), TableError>;

    fn write_string(&mut self, value: &str) -> Result<(), TableError>;
    fn write_integer(&mut self, value: i64) -> Result<(), TableError>;
    fn write_file_time(&mut self, value: DateTime<Utc>) -> Result<(), TableError>;
    fn write_nothing(&mut self) -> Result<(), TableError>;
    fn write_end_of_line(&mut self) -> Result<(), TableError>;
    fn close(&mut self) -> Result<(), TableError>;
}

#[derive(Debug, Clone)]
enum Cell {
    Text(String),
    Integer(i64),
    FileTime(DateTime<Utc>),
    Null,
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            Cell::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Cell::FileTime(t) => ToSqlOutput::Owned(Value::Text(t.to_rfc3339())),
            Cell::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// Writes rows into one SQLite table over a dedicated connection — the
/// concrete `TableWriter` backend chosen for this implementation (see
/// DESIGN.md's open-question resolution). One `SqliteTableWriter` is
/// created per per-table-agent worker; `Concurrency` workers share the
/// same underlying database file in WAL mode.
pub struct SqliteTableWriter {
    conn: Connection,
    table_name: String,
    disposition: Disposition,
    columns: Option<Vec<String>>,
    insert_sql: Option<String>,
    current_row: Vec<Cell>,
}

impl SqliteTableWriter {
    pub fn open(
        db_path: &std::path::Path,
        table_name: impl Into<String>,
        disposition: Disposition,
    ) -> Result<Self, TableError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(SqliteTableWriter {
            conn,
            table_name: table_name.into(),
            disposition,
            columns: None,
            insert_sql: None,
            current_row: Vec::new(),
        })
    }

    fn quoted_table(&self) -> String {
        format!("\"{}\"", self.table_name.replace('"', "\"\""))
    }
}

impl TableWriter for SqliteTableWriter {
    fn set_columns(&mut self, columns: &[String]) -> Result<(), TableError> {
        // A single writer instance is shared across every item routed to
        // its table (SPEC_FULL.md §4.9); only the first item's call
        // actually prepares the table. Later items reuse the
        // already-built insert statement rather than re-running the
        // disposition check against a table this very writer created.
        if self.columns.is_some() {
            return Ok(());
        }

        let table = self.quoted_table();

        let exists: bool = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name = ?1",
            [&self.table_name],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;

        match self.disposition {
            Disposition::CreateNew if exists => {
                return Err(TableError::AlreadyExists(self.table_name.clone()));
            }
            Disposition::Truncate if exists => {
                self.conn
                    .execute(&format!("DELETE FROM {table}"), [])?;
            }
            _ => {}
        }

        if !exists {
            let column_defs = columns
                .iter()
                .map(|c| format!("\"{}\" BLOB", c.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(", ");
            self.conn.execute(
                &format!("CREATE TABLE {table} ({column_defs})"),
                [],
            )?;
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.insert_sql = Some(format!("INSERT INTO {table} VALUES ({placeholders})"));
        self.columns = Some(columns.to_vec());
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<(), TableError> {
        self.current_row.push(Cell::Text(value.to_string()));
        Ok(())
    }

    fn write_integer(&mut self, value: i64) -> Result<(), TableError> {
        self.current_row.push(Cell::Integer(value));
        Ok(())
    }

    fn write_file_time(&mut self, value: DateTime<Utc>) -> Result<(), TableError> {
        self.current_row.push(Cell::FileTime(value));
        Ok(())
    }

    fn write_nothing(&mut self) -> Result<(), TableError> {
        self.current_row.push(Cell::Null);
        Ok(())
    }

    fn write_end_of_line(&mut self) -> Result<(), TableError> {
        if self.current_row.is_empty() {
            return Err(TableError::EmptyRow);
        }
        let expected = self.columns.as_ref().map(Vec::len).unwrap_or(0);
        if self.current_row.len() != expected {
            let got = self.current_row.len();
            self.current_row.clear();
            return Err(TableError::ColumnCountMismatch { expected, got });
        }

        let sql = self.insert_sql.as_ref().expect("set_columns runs first");
        let params: Vec<&dyn ToSql> = self
            .current_row
            .iter()
            .map(|c| c as &dyn ToSql)
            .collect();
        self.conn.execute(sql, params.as_slice())?;
        self.current_row.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), TableError> {
        self.current_row.clear();
        Ok(())
    }
}

/// After-statements run once per table after every worker has finished
/// (SPEC_FULL.md §4.9: "after-statements... run in finalize").
pub fn finalize_table(conn: &Connection, table_name: &str) -> Result<(), TableError> {
    let table = format!("\"{}\"", table_name.replace('"', "\"\""));
    conn.execute(&format!("ANALYZE {table}"), [])?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let mut writer =
            SqliteTableWriter::open(&db_path, "events", Disposition::CreateNew).unwrap();
        writer
            .set_columns(&["name".into(), "count".into(), "seen_at".into()])
            .unwrap();

        writer.write_string("svchost.exe").unwrap();
        writer.write_integer(42).unwrap();
        writer.write_nothing().unwrap();
        writer.write_end_of_line().unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (name, count): (String, i64) = conn
            .query_row("SELECT name, count FROM events", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(name, "svchost.exe");
        assert_eq!(count, 42);
    }

    #[test]
    fn create_new_refuses_an_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        {
            let mut writer =
                SqliteTableWriter::open(&db_path, "t", Disposition::CreateNew).unwrap();
            writer.set_columns(&["a".into()]).unwrap();
        }
        let mut writer = SqliteTableWriter::open(&db_path, "t", Disposition::CreateNew).unwrap();
        let err = writer.set_columns(&["a".into()]).unwrap_err();
        assert!(matches!(err, TableError::AlreadyExists(_)));
    }

    #[test]
    fn truncate_empties_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        {
            let mut writer =
                SqliteTableWriter::open(&db_path, "t", Disposition::CreateNew).unwrap();
            writer.set_columns(&["a".into()]).unwrap();
            writer.write_string("x").unwrap();
            writer.write_end_of_line().unwrap();
        }
        let mut writer = SqliteTableWriter::open(&db_path, "t", Disposition::Truncate).unwrap();
        writer.set_columns(&["a".into()]).unwrap();
        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn column_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let mut writer = SqliteTableWriter::open(&db_path, "t", Disposition::AsIs).unwrap();
        writer.set_columns(&["a".into(), "b".into()]).unwrap();
        writer.write_string("only one").unwrap();
        let err = writer.write_end_of_line().unwrap_err();
        assert!(matches!(err, TableError::ColumnCountMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn set_columns_is_a_no_op_after_the_first_call() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let mut writer = SqliteTableWriter::open(&db_path, "t", Disposition::CreateNew).unwrap();
        writer.set_columns(&["a".into()]).unwrap();
        // A second item routed to the same writer must not re-trigger the
        // CreateNew-refuses-an-existing-table check against the table
        // this very writer just created.
        writer.set_columns(&["a".into()]).unwrap();
        writer.write_string("x").unwrap();
        writer.write_end_of_line().unwrap();
    }
}
