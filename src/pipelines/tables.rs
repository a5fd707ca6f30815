//! Parquet table rendering.
//!
//! Converts a downloaded result table into a Markdown pipe table with a
//! leading row-index column. Reading is synchronous; callers run it on the
//! blocking pool.

use std::fs::File;
use std::path::Path;

use parquet::errors::ParquetError;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to read parquet data: {0}")]
    Parquet(#[from] ParquetError),
}

/// Render the parquet file at `path` as a Markdown table
pub fn render_markdown(path: &Path) -> Result<String, TableError> {
    let file = File::open(path).map_err(|source| TableError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let reader = SerializedFileReader::new(file)?;

    let header: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in reader.get_row_iter(None)? {
        let row = row?;
        rows.push(
            row.get_column_iter()
                .map(|(_, value)| cell(value))
                .collect::<Vec<_>>(),
        );
    }

    Ok(format_table(&header, &rows))
}

fn cell(value: &Field) -> String {
    let text = match value {
        Field::Null => String::new(),
        Field::Str(s) => s.clone(),
        other => other.to_string(),
    };
    escape(&text)
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Pipe table with an unnamed index column
pub fn format_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();

    out.push_str("|    |");
    for name in header {
        out.push_str(&format!(" {} |", escape(name)));
    }
    out.push('\n');

    out.push_str("|---:|");
    for _ in header {
        out.push_str(":---|");
    }

    for (index, row) in rows.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("| {} |", index));
        for value in row {
            out.push_str(&format!(" {} |", value));
        }
    }

    out
}
