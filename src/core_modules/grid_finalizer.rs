// THEORY:
// The `GridFinalizer` turns the raw master grid into the grid every consumer reads:
// one `FinalCell` per coordinate with its effective thickness and color
// percentage, plus the `InspectionStats` summary and the asset's condition.
//
// Two percentage bases coexist and must not be mixed:
// - `FinalCell::percentage` places a cell inside the *observed* min/max range of
//   the grid. It drives color scales and stays meaningful without a nominal.
// - The `area_below_*` and `min_percentage` statistics are relative to the
//   *nominal* thickness.
//
// Algorithm:
// 1.  **Range pass**: observed min/max of effective thickness over measured cells.
// 2.  **Cell pass**: build every `FinalCell` (rows in parallel, each row is
//     independent).
// 3.  **Aggregation**: a sequential sweep accumulates the statistics so that
//     repeated runs produce bit-identical results.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::core_modules::cell::{FinalCell, Point, RawCell};
use crate::core_modules::grid_merger::MasterGrid;

/// Finalized readings, `rows[y][x]`. Every coordinate of the grid is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalGrid {
    pub width: usize,
    pub height: usize,
    pub rows: Vec<Vec<FinalCell>>,
}

impl FinalGrid {
    pub fn get(&self, x: usize, y: usize) -> Option<&FinalCell> {
        self.rows.get(y).and_then(|row| row.get(x))
    }

    /// All cells in row-major order with their coordinates.
    pub fn cells(&self) -> impl Iterator<Item = (Point, &FinalCell)> {
        self.rows.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, cell)| (Point { x, y }, cell))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

/// A notable reading and where it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridLocation {
    pub x: usize,
    pub y: usize,
    pub value: f64,
}

/// Overall state of the asset, from its thinnest reading relative to nominal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Condition {
    Healthy,
    Moderate,
    Severe,
    Critical,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Condition {
    pub fn classify(min_percentage: f64, valid_points: usize) -> Self {
        if valid_points == 0 {
            Condition::NotApplicable
        } else if min_percentage >= 95.0 {
            Condition::Healthy
        } else if min_percentage >= 80.0 {
            Condition::Moderate
        } else if min_percentage >= 60.0 {
            Condition::Severe
        } else {
            Condition::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionStats {
    pub nominal_thickness: f64,
    pub min_thickness: f64,
    pub max_thickness: f64,
    pub avg_thickness: f64,
    /// Minimum thickness as a percentage of nominal.
    pub min_percentage: f64,
    /// Percent of scanned cells below 80 % of nominal.
    pub area_below_80: f64,
    pub area_below_70: f64,
    pub area_below_60: f64,
    pub count_nd: usize,
    pub valid_points: usize,
    pub total_points: usize,
    pub worst_location: Option<GridLocation>,
    pub best_location: Option<GridLocation>,
    pub grid_size: GridSize,
    /// Measured cell count times the cell footprint, in squared grid units.
    pub scanned_area: f64,
}

/// Everything `finalize` produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finalized {
    pub final_grid: FinalGrid,
    pub stats: InspectionStats,
    pub condition: Condition,
}

/// Raw thickness capped at nominal. Without a usable nominal there is no cap.
pub fn effective_thickness(raw: f64, nominal: f64) -> f64 {
    if nominal > 0.0 { raw.min(nominal) } else { raw }
}

/// `value / nominal * 100`, or `0` when the nominal is unusable.
pub fn percent_of_nominal(value: f64, nominal: f64) -> f64 {
    if nominal > 0.0 { value / nominal * 100.0 } else { 0.0 }
}

pub fn finalize(master: &MasterGrid, nominal: f64) -> Finalized {
    // --- 1. Observed range ---
    let (min_thick, max_thick) = master
        .points
        .iter()
        .flatten()
        .filter(|cell| cell.is_measured())
        .map(|cell| effective_thickness(cell.raw_thickness, nominal))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
            (lo.min(value), hi.max(value))
        });

    // --- 2. Final cells ---
    let rows: Vec<Vec<FinalCell>> = master
        .points
        .par_iter()
        .map(|row| {
            row.iter()
                .map(|cell| final_cell(cell, nominal, min_thick, max_thick))
                .collect()
        })
        .collect();
    let final_grid = FinalGrid {
        width: master.width,
        height: master.height,
        rows,
    };

    // --- 3. Statistics ---
    let stats = accumulate_stats(&final_grid, nominal, master.base_config.x_pitch * master.base_config.y_pitch);
    let condition = Condition::classify(stats.min_percentage, stats.valid_points);
    debug!(
        width = final_grid.width,
        height = final_grid.height,
        valid_points = stats.valid_points,
        ?condition,
        "finalized grid"
    );

    Finalized {
        final_grid,
        stats,
        condition,
    }
}

fn final_cell(cell: &RawCell, nominal: f64, min_thick: f64, max_thick: f64) -> FinalCell {
    if !cell.is_measured() {
        return FinalCell {
            plate_id: cell.plate_id,
            raw_thickness: cell.plate_id.map(|_| cell.raw_thickness),
            effective_thickness: None,
            percentage: None,
        };
    }
    let effective = effective_thickness(cell.raw_thickness, nominal);
    let range = max_thick - min_thick;
    let percentage = if range > 0.0 {
        (effective - min_thick) / range * 100.0
    } else {
        100.0
    };
    FinalCell {
        plate_id: cell.plate_id,
        raw_thickness: Some(cell.raw_thickness),
        effective_thickness: Some(effective),
        percentage: Some(percentage),
    }
}

fn accumulate_stats(grid: &FinalGrid, nominal: f64, cell_area: f64) -> InspectionStats {
    let mut valid_points = 0usize;
    let mut count_nd = 0usize;
    let mut sum = 0.0;
    let mut below = [0usize; 3];
    let mut worst: Option<GridLocation> = None;
    let mut best: Option<GridLocation> = None;

    for (point, cell) in grid.cells() {
        let Some(effective) = cell.effective_thickness.filter(|_| !cell.is_nd()) else {
            count_nd += 1;
            continue;
        };
        valid_points += 1;
        sum += effective;

        if worst.is_none_or(|loc| effective < loc.value) {
            worst = Some(GridLocation { x: point.x, y: point.y, value: effective });
        }
        if best.is_none_or(|loc| effective > loc.value) {
            best = Some(GridLocation { x: point.x, y: point.y, value: effective });
        }

        if nominal > 0.0 {
            let percent = percent_of_nominal(effective, nominal);
            for (slot, limit) in below.iter_mut().zip([80.0, 70.0, 60.0]) {
                if percent < limit {
                    *slot += 1;
                }
            }
        }
    }

    let share = |count: usize| {
        if valid_points > 0 {
            count as f64 / valid_points as f64 * 100.0
        } else {
            0.0
        }
    };
    let min_thickness = worst.map(|loc| loc.value).unwrap_or(0.0);

    InspectionStats {
        nominal_thickness: nominal,
        min_thickness,
        max_thickness: best.map(|loc| loc.value).unwrap_or(0.0),
        avg_thickness: if valid_points > 0 { sum / valid_points as f64 } else { 0.0 },
        min_percentage: if valid_points > 0 { percent_of_nominal(min_thickness, nominal) } else { 0.0 },
        area_below_80: share(below[0]),
        area_below_70: share(below[1]),
        area_below_60: share(below[2]),
        count_nd,
        valid_points,
        total_points: grid.width * grid.height,
        worst_location: worst,
        best_location: best,
        grid_size: GridSize {
            width: grid.width,
            height: grid.height,
        },
        scanned_area: valid_points as f64 * cell_area,
    }
}
