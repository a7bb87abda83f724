use import_stream::ByteStream;
use tracing::debug;

use crate::error::TableError;
use crate::table_writer::TableWriter;
use crate::util::read_all;

/// Parses `content` as CSV and appends every row to `writer`, reusing the
/// corpus's header-then-typed-cells idiom (`crates/parser`'s
/// character-separated format) but simplified to this pipeline's needs: a
/// target table's columns are exactly the CSV header row, and every cell
/// is written as a string — the table backend doesn't attempt the source
/// parser's JSON-typed-cell inference, since rows here are archival
/// records, not a schema the caller is trying to project into a stricter
/// type. Returns the number of data rows imported.
pub fn import_csv(content: &mut dyn ByteStream, writer: &mut dyn TableWriter) -> Result<u64, TableError> {
    let bytes = read_all(content).map_err(TableError::from_io)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let headers: Vec<String> = reader
        .headers()
        .map_err(TableError::from_csv)?
        .iter()
        .map(str::to_owned)
        .collect();
    writer.set_columns(&headers)?;

    let mut count = 0u64;
    for record in reader.records() {
        let record = record.map_err(TableError::from_csv)?;
        for field in record.iter() {
            writer.write_string(field)?;
        }
        // `flexible` csv rows may have fewer fields than the header; pad
        // with nulls so `write_end_of_line`'s column-count check passes.
        for _ in record.len()..headers.len() {
            writer.write_nothing()?;
        }
        writer.write_end_of_line()?;
        count += 1;
    }

    debug!(rows = count, "imported csv rows");
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::table_writer::SqliteTableWriter;
    use import_model::Disposition;
    use import_stream::MemoryStream;

    #[test]
    fn imports_well_formed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let mut writer = SqliteTableWriter::open(&db_path, "rows", Disposition::CreateNew).unwrap();

        let mut content = MemoryStream::from_vec(b"name,count\nalice,3\nbob,5\n".to_vec());
        let n = import_csv(&mut content, &mut writer).unwrap();
        assert_eq!(n, 2);

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        let total: i64 = conn
            .query_row("SELECT count(*) FROM rows", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("out.sqlite");
        let mut writer = SqliteTableWriter::open(&db_path, "rows", Disposition::CreateNew).unwrap();

        let mut content = MemoryStream::from_vec(b"a,b,c\n1,2\n".to_vec());
        let n = import_csv(&mut content, &mut writer).unwrap();
        assert_eq!(n, 1);
    }
}
