use anyhow::{Context, Result};
use quarry::tabular::{parse_buffer, ColumnFormat, ParseOptions, ParsedTable};
use std::path::Path;

/// Parse a delimited file the way an upload would be parsed
pub fn inspect_file(path: &Path, options: &ParseOptions) -> Result<ParsedTable> {
    let buffer = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(parse_buffer(&buffer, options))
}

/// Run inspect command on a tabular file
pub fn run_inspect(path: &Path, options: &ParseOptions) -> Result<()> {
    let table = inspect_file(path, options)?;
    if table.is_empty() {
        anyhow::bail!("File {:?} contains no columns", path);
    }

    println!();
    println!("================================================================================");
    println!(
        "File: {} ({} columns, {} rows)",
        path.display(),
        table.columns.len(),
        table.row_count
    );
    println!("================================================================================");
    println!();
    println!("Columns");
    println!("--------------------------------------------------------------------------------");
    let width = table.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for column in &table.columns {
        let format = match column.format {
            Some(ColumnFormat::Currency) => " (currency)",
            Some(ColumnFormat::Percentage) => " (percentage)",
            None => "",
        };
        println!("  {:<width$}  {}{}", column.name, column.column_type, format, width = width);
    }

    if !table.sample_rows.is_empty() {
        println!();
        println!("Sample rows");
        println!("--------------------------------------------------------------------------------");
        for row in &table.sample_rows {
            println!("  {}", serde_json::to_string(row)?);
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry::tabular::ColumnType;

    #[test]
    fn test_inspect_semicolon_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.csv");
        std::fs::write(&path, "# export\ndept;amount\nhr;10\nit;25\n").unwrap();

        let options = ParseOptions {
            delimiter: ';',
            skip_rows: 1,
            ..ParseOptions::default()
        };
        let table = inspect_file(&path, &options).unwrap();
        assert_eq!(table.column_names(), vec!["dept", "amount"]);
        assert_eq!(table.columns[1].column_type, ColumnType::Number);
        assert_eq!(table.row_count, 2);
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_inspect(&dir.path().join("nope.csv"), &ParseOptions::default()).is_err());
    }
}
