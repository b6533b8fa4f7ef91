//! Tabular file parsing
//!
//! Turns a raw delimited-text buffer into typed rows plus a column schema.
//! Ragged rows are normalized (short rows padded with null, long rows
//! truncated). A malformed buffer yields an empty table, never an error.

mod infer;

pub use infer::{
    canonical_timestamp, convert_value, infer_column, number_value, parse_bool, parse_date,
    parse_number, ColumnFormat, ColumnInfo, ColumnType, MATCH_THRESHOLD, SAMPLE_SIZE,
};

use chrono::Utc;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::source::TabularSource;
use crate::{Result, Row};

/// Rows kept as the sample on a tabular source
pub const SAMPLE_ROWS: usize = 5;

/// Text encodings accepted for uploaded files
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    #[serde(alias = "iso-8859-1", alias = "latin-1")]
    Latin1,
}

/// How to read a delimited buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub skip_rows: usize,
    #[serde(default)]
    pub encoding: TextEncoding,
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: true,
            skip_rows: 0,
            encoding: TextEncoding::Utf8,
        }
    }
}

/// Result of parsing a buffer
#[derive(Debug, Clone, Default)]
pub struct ParsedTable {
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Row>,
    pub row_count: usize,
    pub rows: Vec<Row>,
}

impl ParsedTable {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Parse a raw buffer into typed rows.
pub fn parse_buffer(buffer: &[u8], options: &ParseOptions) -> ParsedTable {
    let text = decode(buffer, options.encoding);

    let records = match read_records(&text, options) {
        Ok(records) => records,
        Err(e) => {
            tracing::debug!("Unreadable delimited buffer, treating as empty: {}", e);
            return ParsedTable::default();
        }
    };

    let mut records = records
        .into_iter()
        .filter(|r| !r.iter().all(|cell| cell.trim().is_empty()))
        .collect::<Vec<_>>()
        .into_iter();
    let names = if options.has_header {
        match records.next() {
            Some(header) => header_names(&header),
            None => return ParsedTable::default(),
        }
    } else {
        match records.as_slice().first() {
            Some(first) => (1..=first.len()).map(|i| format!("column_{}", i)).collect(),
            None => return ParsedTable::default(),
        }
    };

    if names.is_empty() {
        return ParsedTable::default();
    }

    let raw_rows: Vec<Vec<String>> = records
        .map(|mut r| {
            r.truncate(names.len());
            r
        })
        .collect();

    let columns: Vec<ColumnInfo> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let samples: Vec<&str> = raw_rows
                .iter()
                .take(SAMPLE_SIZE)
                .filter_map(|r| r.get(idx).map(String::as_str))
                .collect();
            infer_column(name, &samples)
        })
        .collect();

    let rows: Vec<Row> = raw_rows
        .iter()
        .map(|raw| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let value = raw
                        .get(idx)
                        .map(|cell| convert_value(cell, col.column_type))
                        .unwrap_or(Value::Null);
                    (col.name.clone(), value)
                })
                .collect()
        })
        .collect();

    ParsedTable {
        sample_rows: rows.iter().take(SAMPLE_ROWS).cloned().collect(),
        row_count: rows.len(),
        columns,
        rows,
    }
}

fn decode(buffer: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => {
            let bytes = buffer.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(buffer);
            String::from_utf8_lossy(bytes).into_owned()
        }
        // Latin-1 maps each byte to the code point of the same value
        TextEncoding::Latin1 => buffer.iter().map(|&b| b as char).collect(),
    }
}

fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(idx) => rest = &rest[idx + 1..],
            None => return "",
        }
    }
    rest
}

fn read_records(text: &str, options: &ParseOptions) -> std::result::Result<Vec<Vec<String>>, String> {
    if !options.delimiter.is_ascii() {
        return Err(format!("delimiter '{}' is not a single byte", options.delimiter));
    }

    let body = skip_lines(text, options.skip_rows);
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(|cell| cell.to_string()).collect())
                .map_err(|e| e.to_string())
        })
        .collect()
}

fn header_names(header: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    header
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let base = match raw.trim() {
                "" => format!("column_{}", idx + 1),
                name => name.to_string(),
            };
            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

/// Store an uploaded buffer and build the tabular source record for it.
///
/// The file is written to `upload_dir/<uuid>.<ext>`; it belongs to the
/// returned source and is deleted with it.
pub async fn ingest_file(
    upload_dir: &Path,
    original_filename: &str,
    buffer: &[u8],
    options: ParseOptions,
) -> Result<TabularSource> {
    let extension = Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv");

    tokio::fs::create_dir_all(upload_dir).await?;
    let file_path: PathBuf = upload_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension));
    tokio::fs::write(&file_path, buffer).await?;

    let table = parse_buffer(buffer, &options);
    tracing::info!(
        "Stored tabular upload '{}' ({} columns, {} rows) at {:?}",
        original_filename,
        table.columns.len(),
        table.row_count,
        file_path
    );

    Ok(TabularSource {
        file_path,
        original_filename: original_filename.to_string(),
        columns: table.columns,
        sample_rows: table.sample_rows,
        row_count: table.row_count,
        file_size: buffer.len() as u64,
        options,
        ingested_at: Some(Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_typed_rows() {
        let csv = b"name,premium,active,issued\nAlice,\"$1,200\",yes,2024-01-05\nBob,$300,no,2024-02-10\n";
        let table = parse_buffer(csv, &ParseOptions::default());

        assert_eq!(table.column_names(), vec!["name", "premium", "active", "issued"]);
        assert_eq!(table.columns[1].column_type, ColumnType::Number);
        assert_eq!(table.columns[1].format, Some(ColumnFormat::Currency));
        assert_eq!(table.columns[2].column_type, ColumnType::Boolean);
        assert_eq!(table.columns[3].column_type, ColumnType::Date);
        assert_eq!(table.row_count, 2);
        assert_eq!(table.rows[0]["premium"], json!(1200));
        assert_eq!(table.rows[1]["active"], json!(false));
        assert_eq!(table.rows[0]["issued"], json!("2024-01-05T00:00:00.000Z"));
    }

    #[test]
    fn test_ragged_rows_relaxed() {
        let csv = b"a,b,c\n1,2\n4,5,6,7\n";
        let table = parse_buffer(csv, &ParseOptions::default());

        assert_eq!(table.row_count, 2);
        assert_eq!(table.rows[0]["c"], Value::Null);
        assert_eq!(table.rows[1].len(), 3);
        assert_eq!(table.rows[1]["c"], json!(6));
    }

    #[test]
    fn test_headerless_and_skip_rows() {
        let csv = b"exported 2024-06-01\n\nx;10\ny;20\n";
        let options = ParseOptions {
            delimiter: ';',
            has_header: false,
            skip_rows: 1,
            ..Default::default()
        };
        let table = parse_buffer(csv, &options);

        assert_eq!(table.column_names(), vec!["column_1", "column_2"]);
        assert_eq!(table.row_count, 2);
        assert_eq!(table.rows[1]["column_2"], json!(20));
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let table = parse_buffer(b"id,id,\n1,2,3\n", &ParseOptions::default());
        assert_eq!(table.column_names(), vec!["id", "id_2", "column_3"]);
    }

    #[test]
    fn test_empty_buffer_yields_no_columns() {
        let table = parse_buffer(b"", &ParseOptions::default());
        assert!(table.is_empty());
        assert_eq!(table.row_count, 0);
    }

    #[test]
    fn test_non_ascii_delimiter_yields_empty() {
        let options = ParseOptions {
            delimiter: '→',
            ..Default::default()
        };
        let table = parse_buffer(b"a\xe2\x86\x92b\n1\xe2\x86\x922\n", &options);
        assert!(table.is_empty());
    }

    #[test]
    fn test_latin1_decoding() {
        let options = ParseOptions {
            encoding: TextEncoding::Latin1,
            ..Default::default()
        };
        let table = parse_buffer(b"city\nM\xfcnchen\n", &options);
        assert_eq!(table.rows[0]["city"], json!("München"));
    }

    #[test]
    fn test_sample_rows_capped() {
        let mut csv = String::from("n\n");
        for i in 0..12 {
            csv.push_str(&format!("{}\n", i + 10));
        }
        let table = parse_buffer(csv.as_bytes(), &ParseOptions::default());
        assert_eq!(table.sample_rows.len(), SAMPLE_ROWS);
        assert_eq!(table.row_count, 12);
    }

    #[tokio::test]
    async fn test_ingest_file_writes_and_describes() {
        let dir = tempfile::tempdir().unwrap();
        let source = ingest_file(dir.path(), "claims.csv", b"id,amount\n1,10\n2,20\n", ParseOptions::default())
            .await
            .unwrap();

        assert!(source.file_path.exists());
        assert_eq!(source.file_path.extension().unwrap(), "csv");
        assert_eq!(source.row_count, 2);
        assert_eq!(source.file_size, 20);
        assert_eq!(source.columns[1].column_type, ColumnType::Number);
    }
}
