//! Error taxonomy of the engine.
//!
//! Parsing, merge and configuration failures are recoverable values: the caller
//! gets them back, the staged grid is left as it was, and the user can be
//! prompted (for example to resolve a thickness conflict) before retrying.

use serde::Serialize;

use crate::pipeline::SessionState;

/// Failures turning a spreadsheet buffer into a measurement matrix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no header row with numeric column coordinates found in the first {scanned} rows")]
    NoHeaderFound { scanned: usize },

    #[error("header found but no data rows follow it")]
    EmptyDataGrid,

    #[error("header coordinates span far more grid columns than the {header_columns} values it lists")]
    CoordinateSpan { header_columns: usize },

    #[error("workbook contains no worksheet")]
    NoWorksheet,

    #[error("workbook could not be read: {0}")]
    Workbook(String),

    #[error("delimited text could not be read: {0}")]
    Csv(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("nominal thickness must be a finite, non-negative value (got {0})")]
    InvalidNominalThickness(f64),
}

/// Surfaced when a sheet's nominal thickness disagrees with the master grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThicknessConflict {
    pub file_name: String,
    pub original_thickness: f64,
    pub conflicting_thickness: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error(
        "{} declares nominal thickness {} mm but the grid uses {} mm",
        .0.file_name, .0.conflicting_thickness, .0.original_thickness
    )]
    ThicknessMismatch(ThicknessConflict),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MergeError {
    /// The pending conflict, if this is one the user can resolve.
    pub fn conflict(&self) -> Option<&ThicknessConflict> {
        match self {
            MergeError::ThicknessMismatch(conflict) => Some(conflict),
            MergeError::Config(_) => None,
        }
    }
}

/// Everything a session operation can return.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot {operation} while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}
