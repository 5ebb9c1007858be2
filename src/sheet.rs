//! Sheet input/output
//!
//! Reads workbook sheets exported as CSV into ordered header/value records,
//! and writes records back out in the same shape.
//!
//! A workbook is either a single `.csv` file (one sheet) or a directory whose
//! `.csv` files, sorted by name, are its sheets.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Columns starting with this prefix are annotations added by a previous run
pub const ANNOTATION_PREFIX: char = '_';

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("sheet index {index} is out of range: {path} has {count} sheet(s)")]
    NoSuchSheet {
        path: PathBuf,
        index: usize,
        count: usize,
    },

    #[error("{0} has no header row")]
    NoHeader(PathBuf),
}

/// One data row, with its cells in column order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceRecord {
    /// 1-based line in the sheet (header = 1)
    pub line: usize,
    pub fields: Vec<(String, String)>,
}

impl SourceRecord {
    pub fn new(line: usize, fields: Vec<(String, String)>) -> Self {
        Self { line, fields }
    }

    /// Trimmed value of a column, `None` when absent or blank
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Raw (untrimmed) cell value, empty when the column is absent
    pub fn raw(&self, column: &str) -> &str {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }
}

/// A loaded sheet
#[derive(Debug, Clone)]
pub struct Sheet {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub records: Vec<SourceRecord>,
}

/// Resolve the file backing sheet `index` of a workbook
pub fn resolve_sheet(workbook: &Path, index: usize) -> Result<PathBuf, SheetError> {
    if !workbook.is_dir() {
        return if index == 0 {
            Ok(workbook.to_path_buf())
        } else {
            Err(SheetError::NoSuchSheet {
                path: workbook.to_path_buf(),
                index,
                count: 1,
            })
        };
    }

    let io_err = |source| SheetError::Io {
        path: workbook.to_path_buf(),
        source,
    };
    let mut sheets = Vec::new();
    for entry in std::fs::read_dir(workbook).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            sheets.push(path);
        }
    }
    sheets.sort();

    let count = sheets.len();
    sheets.into_iter().nth(index).ok_or(SheetError::NoSuchSheet {
        path: workbook.to_path_buf(),
        index,
        count,
    })
}

/// Read sheet `index` of a workbook
pub fn read_sheet(workbook: &Path, index: usize) -> Result<Sheet, SheetError> {
    let path = resolve_sheet(workbook, index)?;
    let data = std::fs::read(&path).map_err(|source| SheetError::Io {
        path: path.clone(),
        source,
    })?;
    parse_sheet(&path, &data)
}

/// Parse CSV bytes into a sheet; annotation columns are dropped
pub fn parse_sheet(path: &Path, data: &[u8]) -> Result<Sheet, SheetError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let csv_err = |source| SheetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let all_headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if all_headers.iter().all(String::is_empty) {
        return Err(SheetError::NoHeader(path.to_path_buf()));
    }

    let kept: Vec<usize> = all_headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_empty() && !h.starts_with(ANNOTATION_PREFIX))
        .map(|(i, _)| i)
        .collect();
    let headers: Vec<String> = kept.iter().map(|&i| all_headers[i].clone()).collect();

    let mut records = Vec::new();
    for (row_index, result) in reader.records().enumerate() {
        let record = result.map_err(csv_err)?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let fields = kept
            .iter()
            .map(|&i| {
                (
                    all_headers[i].clone(),
                    record.get(i).unwrap_or_default().to_string(),
                )
            })
            .collect();
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(row_index + 2);
        records.push(SourceRecord::new(line, fields));
    }

    Ok(Sheet {
        path: path.to_path_buf(),
        headers,
        records,
    })
}

/// Write a header row and data rows to `path`, replacing any existing file
pub fn write_sheet(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<(), SheetError> {
    let csv_err = |source| SheetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SheetError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(headers).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SheetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_annotations_and_blank_rows() {
        let data = b"\xEF\xBB\xBFAPIName,urlSuffix,_error\nOrders,/orders,boom\n,,\nBilling,,\n";
        let sheet = parse_sheet(Path::new("in.csv"), data).unwrap();

        assert_eq!(sheet.headers, vec!["APIName", "urlSuffix"]);
        assert_eq!(sheet.records.len(), 2);
        assert_eq!(sheet.records[0].get("APIName"), Some("Orders"));
        assert_eq!(sheet.records[0].get("_error"), None);
        assert_eq!(sheet.records[0].line, 2);
        assert_eq!(sheet.records[1].get("urlSuffix"), None);
        assert_eq!(sheet.records[1].line, 4);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let data = b"a,b,c\n1\n";
        let sheet = parse_sheet(Path::new("in.csv"), data).unwrap();
        assert_eq!(sheet.records[0].raw("c"), "");
        assert_eq!(sheet.records[0].fields.len(), 3);
    }

    #[test]
    fn test_resolve_directory_workbook() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "x\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "x\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x\n").unwrap();

        assert_eq!(resolve_sheet(dir.path(), 0).unwrap(), dir.path().join("a.csv"));
        assert_eq!(resolve_sheet(dir.path(), 1).unwrap(), dir.path().join("b.csv"));
        assert!(matches!(
            resolve_sheet(dir.path(), 2),
            Err(SheetError::NoSuchSheet { count: 2, .. })
        ));
    }

    #[test]
    fn test_single_file_has_one_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rows.csv");
        std::fs::write(&file, "x\n").unwrap();
        assert_eq!(resolve_sheet(&file, 0).unwrap(), file);
        assert!(resolve_sheet(&file, 1).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out").join("failed.csv");
        let headers = vec!["APIName".to_string(), "_error".to_string()];
        write_sheet(&file, &headers, &[vec!["Orders, Inc".to_string(), "bad".to_string()]]).unwrap();

        let sheet = read_sheet(&file, 0).unwrap();
        assert_eq!(sheet.headers, vec!["APIName"]);
        assert_eq!(sheet.records[0].get("APIName"), Some("Orders, Inc"));
    }
}
