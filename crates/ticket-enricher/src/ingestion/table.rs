//! Reading and writing ticket tables (CSV and Excel)

use calamine::Reader;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Cell, TableFormat};

/// An in-memory table: ordered column names and ordered rows of cells.
///
/// Row positions are the stable 0-based indices used throughout a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table, trimming column names and fitting every row to the header width
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(|c| c.trim().to_string()).collect();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact (trimmed) name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (row, column), `Cell::Empty` when out of range
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&Cell::Empty)
    }

    /// Names from `required` that are not columns of this table
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Append a column; `values` must hold one cell per row
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(Error::internal(format!(
                "Column has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }

        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Read a table, choosing the parser from the file extension
    pub fn read(path: &Path) -> Result<Self> {
        let filename = display_name(path);
        let format = TableFormat::from_path(path)
            .ok_or_else(|| Error::UnsupportedFileType(filename.clone()))?;

        match format {
            TableFormat::Csv => Self::read_csv(path, &filename),
            TableFormat::Xlsx | TableFormat::Xls | TableFormat::Ods => {
                Self::read_workbook(path, &filename)
            }
        }
    }

    /// Fields are decoded lossily so Latin-1 exports still load.
    /// Trailing empty fields past the header are dropped; any other extra
    /// field rejects the file before a row is processed.
    fn read_csv(path: &Path, filename: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let columns: Vec<String> = reader
            .byte_headers()
            .map_err(|e| Error::file_parse(filename, e.to_string()))?
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        for (line, record) in reader.byte_records().enumerate() {
            let record = record.map_err(|e| Error::file_parse(filename, e.to_string()))?;
            if record.iter().skip(width).any(|field| !field.is_empty()) {
                return Err(Error::file_parse(
                    filename,
                    format!(
                        "row {} has {} fields but the header has {}",
                        line + 1,
                        record.len(),
                        width
                    ),
                ));
            }

            rows.push(
                record
                    .iter()
                    .take(width)
                    .map(|field| {
                        if field.is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(String::from_utf8_lossy(field).into_owned())
                        }
                    })
                    .collect(),
            );
        }

        Ok(Self::new(columns, rows))
    }

    /// First worksheet; the first row is the header
    fn read_workbook(path: &Path, filename: &str) -> Result<Self> {
        let mut workbook = calamine::open_workbook_auto(path)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::file_parse(filename, "workbook has no worksheets"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut rows = range.rows();
        let columns = match rows.next() {
            Some(header) => header.iter().map(|cell| convert_cell(cell).to_string()).collect(),
            None => return Ok(Self::default()),
        };

        let rows = rows
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        Ok(Self::new(columns, rows))
    }

    /// Write the table, choosing the format from the file extension
    pub fn write(&self, path: &Path) -> Result<()> {
        let filename = display_name(path);
        match TableFormat::from_path(path) {
            Some(TableFormat::Csv) => self.write_csv(path),
            Some(TableFormat::Xlsx) => self.write_xlsx(path),
            _ => Err(Error::write(format!(
                "cannot write table in the format of '{}'",
                filename
            ))),
        }
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| Error::write(e.to_string()))?;

        writer
            .write_record(&self.columns)
            .map_err(|e| Error::write(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|cell| cell.to_string()))
                .map_err(|e| Error::write(e.to_string()))?;
        }

        writer.flush().map_err(|e| Error::write(e.to_string()))
    }

    fn write_xlsx(&self, path: &Path) -> Result<()> {
        let date_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();

        for (col, name) in self.columns.iter().enumerate() {
            let col = xlsx_col(col)?;
            sheet
                .write_string(0, col, name.as_str())
                .map_err(|e| Error::write(e.to_string()))?;
        }

        for (row_idx, row) in self.rows.iter().enumerate() {
            let xlsx_row = u32::try_from(row_idx + 1)
                .map_err(|_| Error::write("too many rows for an xlsx worksheet"))?;
            for (col, cell) in row.iter().enumerate() {
                let col = xlsx_col(col)?;
                let written = match cell {
                    Cell::Empty => continue,
                    Cell::Text(s) => sheet.write_string(xlsx_row, col, s.as_str()),
                    Cell::Int(i) => sheet.write_number(xlsx_row, col, *i as f64),
                    Cell::Float(v) => sheet.write_number(xlsx_row, col, *v),
                    Cell::Bool(b) => sheet.write_boolean(xlsx_row, col, *b),
                    Cell::DateTime(dt) => {
                        let format = if dt.time() == NaiveTime::MIN {
                            &date_format
                        } else {
                            &datetime_format
                        };
                        sheet.write_datetime_with_format(xlsx_row, col, dt, format)
                    }
                };
                written.map_err(|e| Error::write(e.to_string()))?;
            }
        }

        workbook.save(path).map_err(|e| Error::write(e.to_string()))
    }
}

fn xlsx_col(col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| Error::write("too many columns for an xlsx worksheet"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn convert_cell(cell: &calamine::Data) -> Cell {
    match cell {
        calamine::Data::Empty => Cell::Empty,
        calamine::Data::String(s) if s.is_empty() => Cell::Empty,
        calamine::Data::String(s) => Cell::Text(s.clone()),
        calamine::Data::Float(f) => Cell::Float(*f),
        calamine::Data::Int(i) => Cell::Int(*i),
        calamine::Data::Bool(b) => Cell::Bool(*b),
        calamine::Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            Some(value) => Cell::DateTime(value),
            None => Cell::Text(cell.to_string()),
        },
        calamine::Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        // durations and cell errors keep their rendered form
        other => Cell::Text(other.to_string()),
    }
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    value
        .parse::<NaiveDateTime>()
        .ok()
        .or_else(|| value.parse::<NaiveDate>().ok().map(|d| d.and_time(NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec![" Number ".to_string(), "State".to_string()],
            vec![
                vec![Cell::text("INC1"), Cell::text("New")],
                vec![Cell::text("INC2")],
            ],
        )
    }

    #[test]
    fn test_column_names_trimmed_and_rows_padded() {
        let table = sample();
        assert_eq!(table.columns(), &["Number".to_string(), "State".to_string()]);
        assert_eq!(table.cell(1, 1), &Cell::Empty);
        assert_eq!(table.cell(9, 9), &Cell::Empty);
    }

    #[test]
    fn test_missing_columns() {
        let table = sample();
        assert_eq!(
            table.missing_columns(&["Number", "State", "Work notes"]),
            vec!["Work notes".to_string()]
        );
    }

    #[test]
    fn test_push_column_requires_one_value_per_row() {
        let mut table = sample();
        assert!(table.push_column("Extra", vec![Cell::Empty]).is_err());
        table
            .push_column("Extra", vec![Cell::text("a"), Cell::text("b")])
            .unwrap();
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.cell(1, 2), &Cell::text("b"));
    }

    #[test]
    fn test_csv_roundtrip_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        std::fs::write(&path, " Number ,State,Description\nINC1,New,\"Line, with comma\"\nINC2,,\n")
            .unwrap();

        let table = Table::read(&path).unwrap();
        assert_eq!(table.columns(), &["Number", "State", "Description"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 2), &Cell::text("Line, with comma"));
        assert_eq!(table.cell(1, 1), &Cell::Empty);

        let out = dir.path().join("out.csv");
        table.write(&out).unwrap();
        assert_eq!(Table::read(&out).unwrap(), table);
    }

    #[test]
    fn test_xlsx_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.xlsx");
        let table = Table::new(
            vec!["Number".to_string(), "Count".to_string(), "Open".to_string()],
            vec![
                vec![Cell::text("INC1"), Cell::Float(3.0), Cell::Bool(true)],
                vec![Cell::text("INC2"), Cell::Empty, Cell::Bool(false)],
            ],
        );

        table.write(&path).unwrap();
        let read = Table::read(&path).unwrap();

        assert_eq!(read.columns(), table.columns());
        assert_eq!(read.len(), 2);
        assert_eq!(read.cell(0, 0), &Cell::text("INC1"));
        assert_eq!(read.cell(0, 1), &Cell::Float(3.0));
        assert_eq!(read.cell(1, 1), &Cell::Empty);
        assert_eq!(read.cell(1, 2), &Cell::Bool(false));
    }

    #[test]
    fn test_trailing_comma_rows_fit_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        std::fs::write(&path, "Number,State\nINC1,New,\nINC2,Closed\n").unwrap();

        let mut table = Table::read(&path).unwrap();
        assert_eq!(table.cell(0, 1), &Cell::text("New"));

        table
            .push_column("Resumen", vec![Cell::text("a"), Cell::text("b")])
            .unwrap();
        assert_eq!(table.cell(0, 2), &Cell::text("a"));

        let out = dir.path().join("out.csv");
        table.write(&out).unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "Number,State,Resumen\nINC1,New,a\nINC2,Closed,b\n"
        );
    }

    #[test]
    fn test_extra_values_past_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        std::fs::write(&path, "Number,State\nINC1,New,stray\n").unwrap();

        let err = Table::read(&path).unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
    }

    #[test]
    fn test_latin1_csv_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.csv");
        // "Descripción" and "caída" encoded as Latin-1
        std::fs::write(&path, b"Descripci\xf3n,State\nVPN ca\xedda,New\n").unwrap();

        let table = Table::read(&path).unwrap();
        assert_eq!(table.columns(), &["Descripci\u{fffd}n", "State"]);
        assert_eq!(table.cell(0, 0), &Cell::text("VPN ca\u{fffd}da"));
    }

    #[test]
    fn test_xlsx_dates_survive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.xlsx");
        let opened = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let due = NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        let table = Table::new(
            vec!["Number".to_string(), "Opened".to_string(), "Due".to_string()],
            vec![vec![Cell::text("INC1"), Cell::DateTime(opened), Cell::DateTime(due)]],
        );

        table.write(&path).unwrap();
        let read = Table::read(&path).unwrap();
        assert_eq!(read.cell(0, 1), &Cell::DateTime(opened));
        assert_eq!(read.cell(0, 2), &Cell::DateTime(due));

        let again = dir.path().join("again.xlsx");
        read.write(&again).unwrap();
        assert_eq!(Table::read(&again).unwrap().cell(0, 1), &Cell::DateTime(opened));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Table::read(Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    #[test]
    fn test_corrupt_workbook_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();

        let err = Table::read(&path).unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
    }
}
