// THEORY:
// The `cell` module holds the smallest units of the engine: a spreadsheet cell as
// it comes out of a workbook, a raw reading placed in the master grid, and the
// derived reading produced by finalization. All three are plain data containers;
// none of them knows about its neighbors.
//
// A reading is "not measured" (ND) when its thickness is zero or when no plate
// ever covered the coordinate. `FinalCell` encodes ND as `None` in every derived
// field so consumers cannot accidentally treat a void as a 0 mm wall.

use serde::Serialize;

/// A loosely-typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl Cell {
    /// Builds a cell from delimited text, trimming whitespace and promoting
    /// numeric strings.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Cell::Number(value),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// The cell as a finite number, parsing text when needed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) if value.is_finite() => Some(*value),
            Cell::Number(_) => None,
            Cell::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Cell::Empty => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Cell::Number(value) => value.to_string(),
            Cell::Text(text) => text.trim().to_string(),
            Cell::Empty => String::new(),
        }
    }

    /// Interprets the cell as a thickness reading. Markers such as `---`, `ND`
    /// or anything mentioning `n/a` are unmeasured and read as `0.0`, as are
    /// negative and non-finite values.
    pub fn thickness(&self) -> f64 {
        let value = match self {
            Cell::Empty => return 0.0,
            Cell::Number(value) => *value,
            Cell::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty()
                    || trimmed == "---"
                    || trimmed.eq_ignore_ascii_case("nd")
                    || trimmed.to_ascii_lowercase().contains("n/a")
                {
                    return 0.0;
                }
                match trimmed.parse::<f64>() {
                    Ok(value) => value,
                    Err(_) => return 0.0,
                }
            }
        };
        measured_or_void(value)
    }
}

/// A thickness reading as stored in a grid: positive finite values, `0.0` otherwise.
pub fn measured_or_void(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

/// Index of a plate (one stitched sheet) in the master grid's plate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlateId(pub u32);

/// A reading as it sits in the master grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RawCell {
    pub plate_id: Option<PlateId>,
    pub raw_thickness: f64,
}

impl RawCell {
    /// The cell no sheet has covered.
    pub const VOID: RawCell = RawCell { plate_id: None, raw_thickness: 0.0 };

    pub fn is_measured(&self) -> bool {
        self.plate_id.is_some() && self.raw_thickness > 0.0
    }
}

/// A reading after finalization. `None` fields mark a non-inspected cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FinalCell {
    pub plate_id: Option<PlateId>,
    pub raw_thickness: Option<f64>,
    /// Raw thickness capped at nominal.
    pub effective_thickness: Option<f64>,
    /// Position of the effective thickness inside the observed grid range, 0..=100.
    pub percentage: Option<f64>,
}

impl FinalCell {
    pub const ND: FinalCell = FinalCell {
        plate_id: None,
        raw_thickness: None,
        effective_thickness: None,
        percentage: None,
    };

    pub fn is_nd(&self) -> bool {
        match (self.raw_thickness, self.effective_thickness) {
            (Some(raw), Some(_)) => raw == 0.0,
            _ => true,
        }
    }
}

/// A grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmeasured_markers_read_as_zero() {
        for marker in ["---", "ND", "nd", "", "  ", "N/A", "reading n/a", "garbage"] {
            assert_eq!(Cell::Text(marker.to_string()).thickness(), 0.0, "{marker:?}");
        }
        assert_eq!(Cell::Empty.thickness(), 0.0);
        assert_eq!(Cell::Number(-2.0).thickness(), 0.0);
        assert_eq!(Cell::Number(f64::NAN).thickness(), 0.0);
    }

    #[test]
    fn numeric_text_is_a_reading() {
        assert_eq!(Cell::Text(" 9.75 ".to_string()).thickness(), 9.75);
        assert_eq!(Cell::from_text("12"), Cell::Number(12.0));
        assert_eq!(Cell::from_text("x"), Cell::Text("x".to_string()));
        assert_eq!(Cell::from_text(" "), Cell::Empty);
    }

    #[test]
    fn final_cell_nd_follows_raw_reading() {
        assert!(FinalCell::ND.is_nd());
        let measured = FinalCell {
            plate_id: Some(PlateId(0)),
            raw_thickness: Some(8.0),
            effective_thickness: Some(8.0),
            percentage: Some(50.0),
        };
        assert!(!measured.is_nd());
        assert!(!RawCell::VOID.is_measured());
    }
}
