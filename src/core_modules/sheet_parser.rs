// THEORY:
// The `SheetParser` turns the bytes of one exported scan sheet into an oriented
// matrix of thickness readings. Scan exports put a free-form metadata block above
// a coordinate header, so the parser works heuristically:
//
// 1.  **Decode**: workbooks go through `calamine`, delimited text through `csv`.
//     Either way the result is a `Vec<Vec<Cell>>` anchored at cell A1.
// 2.  **Header detection**: the first row (within the first 100) whose cells from
//     column B onward are mostly numbers is the X-coordinate header.
// 3.  **Metadata**: every row above the header is a `key[=]value` pair. The
//     nominal thickness is read from here, with "max thickness" as a fallback.
// 4.  **Data**: rows below the header carry their Y coordinate in column A. Header
//     X values are snapped to grid columns with `round(x / step)`. A header whose
//     snapped columns spread far wider than its value count is rejected.
// 5.  **Orientation**: the matrix is flipped so that Y increases with row index.
//
// The parser is a pure function over the buffer.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core_modules::cell::{measured_or_void, Cell};
use crate::error::ParseError;

/// How many leading rows are searched for the coordinate header.
pub const HEADER_SCAN_ROWS: usize = 100;
/// A header needs strictly more filled cells than this after column A.
const HEADER_MIN_FILLED: usize = 5;
/// Fraction of those filled cells that must be numeric.
const HEADER_NUMERIC_RATIO: f64 = 0.8;
/// Above this fraction of unmeasured cells the sheet gets a warning.
const VOID_WARNING_FRACTION: f64 = 0.05;
/// Snapped header columns may spread over at most this many grid columns per
/// header value.
const MAX_COLUMN_SPREAD: usize = 4;
/// Non-empty lines inspected when guessing the delimiter of a text export.
const SNIFF_LINES: usize = 20;

/// Non-fatal findings about a sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SheetWarning {
    /// Share of unmeasured cells, in percent.
    HighVoidPercentage(f64),
}

/// One parsed scan sheet. `rows[y][x]` is a thickness reading, `0.0` when unmeasured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedSheet {
    pub file_name: String,
    pub rows: Vec<Vec<f64>>,
    pub detected_nominal: Option<f64>,
    /// Physical X coordinate of every grid column.
    pub x_coords: Vec<f64>,
    /// Physical Y coordinate of every grid row, ascending.
    pub y_coords: Vec<f64>,
    pub x_step: f64,
    pub y_step: f64,
    pub metadata: Vec<(String, String)>,
    pub warnings: Vec<SheetWarning>,
}

impl ParsedSheet {
    /// Wraps an already-oriented reading matrix with unit coordinate steps.
    /// Negative and non-finite readings are stored as unmeasured.
    pub fn from_readings(file_name: &str, rows: Vec<Vec<f64>>, detected_nominal: Option<f64>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows: Vec<Vec<f64>> = rows
            .into_iter()
            .map(|row| {
                let mut row: Vec<f64> = row.into_iter().map(measured_or_void).collect();
                row.resize(width, 0.0);
                row
            })
            .collect();
        let height = rows.len();
        Self {
            file_name: file_name.to_string(),
            rows,
            detected_nominal,
            x_coords: (0..width).map(|x| x as f64).collect(),
            y_coords: (0..height).map(|y| y as f64).collect(),
            x_step: 1.0,
            y_step: 1.0,
            metadata: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Share of unmeasured cells, in percent.
    pub fn void_percentage(&self) -> f64 {
        let total = self.width() * self.height();
        if total == 0 {
            return 0.0;
        }
        let voids = self.rows.iter().flatten().filter(|reading| **reading <= 0.0).count();
        voids as f64 / total as f64 * 100.0
    }
}

/// Parses a sheet from its raw bytes. The file extension picks the decoder.
pub fn parse_sheet(bytes: &[u8], file_name: &str) -> Result<ParsedSheet, ParseError> {
    let cells = read_cells(bytes, file_name)?;
    parse_rows(&cells, file_name)
}

/// Decodes the first worksheet (or the delimited text) into loosely-typed cells.
pub fn read_cells(bytes: &[u8], file_name: &str) -> Result<Vec<Vec<Cell>>, ParseError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" | "txt" | "tsv" => read_delimited(bytes),
        _ => read_workbook(bytes),
    }
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ParseError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| ParseError::Workbook(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheet)?
        .map_err(|err| ParseError::Workbook(err.to_string()))?;

    // calamine ranges start at the first used cell; re-anchor at A1.
    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(cell_from_data));
        rows.push(cells);
    }
    Ok(rows)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::String(text) => Cell::from_text(text),
        Data::Empty => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

fn read_delimited(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ParseError> {
    let delimiter = sniff_delimiter(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ParseError::Csv(err.to_string()))?;
        let cells = record
            .iter()
            .map(|field| {
                // Semicolon exports come from locales that write decimal commas.
                if delimiter == b';' {
                    Cell::from_text(&field.replace(',', "."))
                } else {
                    Cell::from_text(field)
                }
            })
            .collect();
        rows.push(cells);
    }
    Ok(rows)
}

/// Picks the delimiter that splits the most leading lines into the same number
/// of fields. Decimal commas inflate raw comma counts, so character counts alone
/// are not trusted.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
    let lines: Vec<&str> = head
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let consistency = |delimiter: u8| {
        let mut field_counts: HashMap<usize, usize> = HashMap::new();
        for line in &lines {
            let fields = line.matches(delimiter as char).count() + 1;
            if fields > 1 {
                *field_counts.entry(fields).or_default() += 1;
            }
        }
        field_counts.into_values().max().unwrap_or(0)
    };

    // Ties resolve to the last candidate, so comma wins.
    [b'\t', b';', b',']
        .into_iter()
        .max_by_key(|delimiter| consistency(*delimiter))
        .unwrap_or(b',')
}

/// Runs header detection, metadata extraction and grid construction over cells.
pub fn parse_rows(rows: &[Vec<Cell>], file_name: &str) -> Result<ParsedSheet, ParseError> {
    // --- 1. Header detection ---
    let header_index = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| is_header_row(row))
        .ok_or(ParseError::NoHeaderFound {
            scanned: rows.len().min(HEADER_SCAN_ROWS),
        })?;
    debug!(file_name, header_index, "located coordinate header");

    // --- 2. Metadata ---
    let metadata = read_metadata(&rows[..header_index]);
    let detected_nominal = detect_nominal(&metadata);

    // --- 3. Column mapping ---
    let columns: Vec<(usize, f64)> = rows[header_index]
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(col, cell)| cell.as_number().map(|x| (col, x)))
        .collect();
    let x_step = first_step(columns.iter().map(|(_, x)| *x));
    let span_error = || ParseError::CoordinateSpan {
        header_columns: columns.len(),
    };
    let max_width = columns.len().max(1) * MAX_COLUMN_SPREAD;
    let mut grid_columns: Vec<i64> = Vec::with_capacity(columns.len());
    for (_, x) in &columns {
        let snapped = (x / x_step).round();
        if !snapped.is_finite() || snapped.abs() > max_width as f64 {
            return Err(span_error());
        }
        grid_columns.push(snapped as i64);
    }
    let min_column = grid_columns.iter().copied().min().unwrap_or(0).min(0);
    let max_column = grid_columns.iter().copied().max().unwrap_or(0);
    let width = max_column
        .checked_sub(min_column)
        .and_then(|span| span.checked_add(1))
        .and_then(|span| usize::try_from(span).ok())
        .filter(|width| *width <= max_width)
        .ok_or_else(span_error)?;

    // --- 4. Data rows ---
    let mut data: Vec<(f64, Vec<f64>)> = Vec::new();
    for row in &rows[header_index + 1..] {
        let Some(y) = row.first().and_then(Cell::as_number) else {
            continue;
        };
        let mut readings = vec![0.0; width];
        for ((col, _), grid_x) in columns.iter().zip(&grid_columns) {
            let x = (grid_x - min_column) as usize;
            readings[x] = row.get(*col).map(Cell::thickness).unwrap_or(0.0);
        }
        data.push((y, readings));
    }
    if data.is_empty() {
        return Err(ParseError::EmptyDataGrid);
    }

    // --- 5. Orientation ---
    let descending = data
        .first()
        .zip(data.last())
        .is_some_and(|(first, last)| first.0 > last.0);
    if descending {
        data.reverse();
    }

    let y_coords: Vec<f64> = data.iter().map(|(y, _)| *y).collect();
    let y_step = first_step(y_coords.iter().copied());
    let mut sheet = ParsedSheet {
        file_name: file_name.to_string(),
        rows: data.into_iter().map(|(_, readings)| readings).collect(),
        detected_nominal,
        x_coords: (0..width)
            .map(|x| (x as i64 + min_column) as f64 * x_step)
            .collect(),
        y_coords,
        x_step,
        y_step,
        metadata,
        warnings: Vec::new(),
    };

    let void_percentage = sheet.void_percentage();
    if void_percentage > VOID_WARNING_FRACTION * 100.0 {
        warn!(file_name, void_percentage, "sheet has a large share of unmeasured cells");
        sheet.warnings.push(SheetWarning::HighVoidPercentage(void_percentage));
    }
    debug!(
        file_name,
        width = sheet.width(),
        height = sheet.height(),
        ?detected_nominal,
        "parsed sheet"
    );
    Ok(sheet)
}

fn is_header_row(row: &[Cell]) -> bool {
    let filled: Vec<&Cell> = row.iter().skip(1).filter(|cell| !cell.is_empty()).collect();
    if filled.len() <= HEADER_MIN_FILLED {
        return false;
    }
    let numeric = filled.iter().filter(|cell| cell.as_number().is_some()).count();
    numeric as f64 / filled.len() as f64 > HEADER_NUMERIC_RATIO
}

fn read_metadata(rows: &[Vec<Cell>]) -> Vec<(String, String)> {
    rows.iter()
        .filter_map(|row| {
            let mut filled = row.iter().filter(|cell| !cell.is_empty());
            let key = filled.next()?.as_text();
            if let Some((key, value)) = key.split_once(|c: char| c == '=' || c == ':') {
                return Some((key.trim().to_string(), value.trim().to_string()));
            }
            let value = filled.next().map(Cell::as_text).unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

fn detect_nominal(metadata: &[(String, String)]) -> Option<f64> {
    let lookup = |needle: &str| {
        metadata
            .iter()
            .filter(|(key, _)| key.to_ascii_lowercase().contains(needle))
            .find_map(|(_, value)| leading_number(value))
    };
    lookup("nominal thickness").or_else(|| lookup("max thickness"))
}

/// Reads the number at the start of a value such as `"12.5 mm"` or `"9,8mm"`.
fn leading_number(text: &str) -> Option<f64> {
    let normalized = text.trim().replace(',', ".");
    let end = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(normalized.len());
    normalized[..end]
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

/// First non-zero gap between consecutive coordinates, `1.0` if there is none.
fn first_step(coords: impl Iterator<Item = f64>) -> f64 {
    let mut previous: Option<f64> = None;
    for coord in coords {
        if let Some(prev) = previous {
            let gap = (coord - prev).abs();
            if gap > f64::EPSILON {
                return gap;
            }
        }
        previous = Some(coord);
    }
    1.0
}
