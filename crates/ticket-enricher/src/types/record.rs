//! Table cell and ticket record types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Supported table formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// Comma separated values
    Csv,
    /// Excel workbook (.xlsx / .xlsm)
    Xlsx,
    /// Old Excel workbook (.xls), read only
    Xls,
    /// OpenDocument spreadsheet, read only
    Ods,
}

impl TableFormat {
    /// Detect table format from extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            _ => None,
        }
    }

    /// Detect table format from a file name or path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Format used when writing an enriched copy of a table in this format
    pub fn output_format(self) -> Self {
        match self {
            Self::Csv => Self::Csv,
            Self::Xlsx | Self::Xls | Self::Ods => Self::Xlsx,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Ods => "ods",
        }
    }

}

/// Text form of date cells in CSV output and prompts
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Spreadsheet date or date-time, written back as a date cell
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Text content, `None` for non-text cells
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

/// One ticket extracted from an input row.
///
/// Only the fields read by the enrichment are copied; every other column of
/// the row stays untouched in the source table.
#[derive(Debug, Clone)]
pub struct Record {
    /// 0-based position of the row in the input table
    pub index: usize,
    pub title: Cell,
    pub body: Cell,
    pub notes: Cell,
}

impl Record {
    pub fn new(index: usize, title: Cell, body: Cell, notes: Cell) -> Self {
        Self {
            index,
            title,
            body,
            notes,
        }
    }
}
