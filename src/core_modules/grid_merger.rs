// THEORY:
// The `GridMerger` is the owner of the master grid, the one mutable structure of a
// session. It starts from a single parsed sheet and grows as further sheets are
// stitched onto one of its edges.
//
// Key rules:
// 1.  **Ownership**: nothing else mutates the master grid. Finalization and
//     segmentation read it through `&MasterGrid` and build their own outputs.
// 2.  **Growth**: a stitch allocates a grid large enough for both sources and
//     copies them in. Width and height never decrease.
// 3.  **Overlap**: the newly placed sheet overwrites whatever was already at a
//     coordinate. No blending.
// 4.  **Conflicts**: when an incoming sheet declares a different nominal thickness,
//     the merge is refused with a `ThicknessConflict` and the grid is left as it
//     was, until the caller resubmits with a `ConflictResolution`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{
    validate_nominal, AssetType, ConflictResolution, MergeConfig, MergeDirection, ProcessConfig,
};
use crate::core_modules::cell::{PlateId, Point, RawCell};
use crate::core_modules::sheet_parser::ParsedSheet;
use crate::error::{ConfigError, MergeError, ThicknessConflict};

/// Nominal thickness differences at or below this are treated as equal.
pub const NOMINAL_TOLERANCE_MM: f64 = 0.01;

/// Where one stitched sheet sits in the master grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateRecord {
    pub id: PlateId,
    pub file_name: String,
    /// The nominal thickness the sheet itself declared, if any.
    pub nominal_thickness: Option<f64>,
    /// Grid coordinate of the sheet's first cell.
    pub origin: Point,
    pub width: usize,
    pub height: usize,
}

/// Settings fixed when the session starts (the nominal may change through
/// conflict resolution).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseConfig {
    pub nominal_thickness: f64,
    pub asset_type: AssetType,
    /// Physical distance between grid columns, taken from the first sheet.
    pub x_pitch: f64,
    /// Physical distance between grid rows, taken from the first sheet.
    pub y_pitch: f64,
}

/// The merged raw readings of every sheet in the session. `points[y][x]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterGrid {
    pub points: Vec<Vec<RawCell>>,
    pub width: usize,
    pub height: usize,
    pub plates: Vec<PlateRecord>,
    pub base_config: BaseConfig,
}

impl MasterGrid {
    pub fn get(&self, x: usize, y: usize) -> Option<&RawCell> {
        self.points.get(y).and_then(|row| row.get(x))
    }

    pub fn nominal_thickness(&self) -> f64 {
        self.base_config.nominal_thickness
    }

    pub fn plate(&self, id: PlateId) -> Option<&PlateRecord> {
        self.plates.iter().find(|plate| plate.id == id)
    }
}

/// Builds and grows the master grid.
#[derive(Debug, Clone)]
pub struct GridMerger {
    master: MasterGrid,
}

impl GridMerger {
    /// Starts a master grid from the first sheet. A configured nominal thickness
    /// wins over the one detected in the sheet.
    pub fn init(sheet: &ParsedSheet, config: &ProcessConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let nominal_thickness = config
            .nominal_thickness
            .or(sheet.detected_nominal)
            .unwrap_or(0.0);

        let id = PlateId(0);
        let (width, height) = (sheet.width(), sheet.height());
        let mut points = vec![vec![RawCell::VOID; width]; height];
        place_sheet(&mut points, sheet, id, Point { x: 0, y: 0 });

        info!(
            file_name = %sheet.file_name,
            width,
            height,
            nominal_thickness,
            "initialized master grid"
        );

        Ok(Self {
            master: MasterGrid {
                points,
                width,
                height,
                plates: vec![PlateRecord {
                    id,
                    file_name: sheet.file_name.clone(),
                    nominal_thickness: sheet.detected_nominal,
                    origin: Point { x: 0, y: 0 },
                    width,
                    height,
                }],
                base_config: BaseConfig {
                    nominal_thickness,
                    asset_type: config.asset_type,
                    x_pitch: sheet.x_step,
                    y_pitch: sheet.y_step,
                },
            },
        })
    }

    pub fn master(&self) -> &MasterGrid {
        &self.master
    }

    pub fn into_master(self) -> MasterGrid {
        self.master
    }

    /// Stitches `sheet` onto the configured edge of the master grid.
    ///
    /// Returns `MergeError::ThicknessMismatch` without touching the grid when the
    /// sheet's nominal thickness disagrees and no `resolution` was given.
    pub fn merge(
        &mut self,
        sheet: &ParsedSheet,
        merge_config: MergeConfig,
        resolution: Option<ConflictResolution>,
    ) -> Result<&MasterGrid, MergeError> {
        // --- 1. Nominal thickness reconciliation ---
        let nominal_thickness = self.reconcile_nominal(sheet, resolution)?;

        // --- 2. Layout of the grown grid ---
        let (width, height) = (self.master.width, self.master.height);
        let (sheet_width, sheet_height) = (sheet.width(), sheet.height());
        let start = merge_config.start;
        let (existing_origin, sheet_origin, new_width, new_height) = match merge_config.direction {
            MergeDirection::Right => (
                Point { x: 0, y: 0 },
                Point { x: start, y: 0 },
                width.max(start + sheet_width),
                height.max(sheet_height),
            ),
            MergeDirection::Bottom => (
                Point { x: 0, y: 0 },
                Point { x: 0, y: start },
                width.max(sheet_width),
                height.max(start + sheet_height),
            ),
            MergeDirection::Left => (
                Point { x: start, y: 0 },
                Point { x: 0, y: 0 },
                sheet_width.max(start + width),
                height.max(sheet_height),
            ),
            MergeDirection::Top => (
                Point { x: 0, y: start },
                Point { x: 0, y: 0 },
                width.max(sheet_width),
                sheet_height.max(start + height),
            ),
        };

        // --- 3. Copy existing cells, then the new sheet on top ---
        let mut points = vec![vec![RawCell::VOID; new_width]; new_height];
        for (y, row) in self.master.points.iter().enumerate() {
            let target = &mut points[existing_origin.y + y][existing_origin.x..existing_origin.x + row.len()];
            target.copy_from_slice(row);
        }
        let id = PlateId(self.master.plates.len() as u32);
        place_sheet(&mut points, sheet, id, sheet_origin);

        // --- 4. Bookkeeping ---
        for plate in &mut self.master.plates {
            plate.origin.x += existing_origin.x;
            plate.origin.y += existing_origin.y;
        }
        self.master.plates.push(PlateRecord {
            id,
            file_name: sheet.file_name.clone(),
            nominal_thickness: sheet.detected_nominal,
            origin: sheet_origin,
            width: sheet_width,
            height: sheet_height,
        });
        self.master.points = points;
        self.master.width = new_width;
        self.master.height = new_height;
        self.master.base_config.nominal_thickness = nominal_thickness;

        debug!(
            file_name = %sheet.file_name,
            direction = ?merge_config.direction,
            start,
            width = new_width,
            height = new_height,
            "stitched sheet into master grid"
        );
        Ok(&self.master)
    }

    fn reconcile_nominal(
        &self,
        sheet: &ParsedSheet,
        resolution: Option<ConflictResolution>,
    ) -> Result<f64, MergeError> {
        let current = self.master.base_config.nominal_thickness;
        let Some(incoming) = sheet.detected_nominal else {
            return Ok(current);
        };
        // An unknown nominal adopts the first one a sheet declares.
        if current <= 0.0 {
            return Ok(incoming);
        }
        if (incoming - current).abs() <= NOMINAL_TOLERANCE_MM {
            return Ok(current);
        }

        match resolution {
            None => {
                warn!(
                    file_name = %sheet.file_name,
                    current,
                    incoming,
                    "nominal thickness conflict, merge suspended"
                );
                Err(MergeError::ThicknessMismatch(ThicknessConflict {
                    file_name: sheet.file_name.clone(),
                    original_thickness: current,
                    conflicting_thickness: incoming,
                }))
            }
            Some(ConflictResolution::UseExisting) => Ok(current),
            Some(ConflictResolution::UseNew) => Ok(incoming),
            Some(ConflictResolution::UseCustom(value)) => Ok(validate_nominal(value)?),
        }
    }
}

/// Writes every cell of `sheet` into `points` starting at `origin`.
fn place_sheet(points: &mut [Vec<RawCell>], sheet: &ParsedSheet, id: PlateId, origin: Point) {
    for (y, row) in sheet.rows.iter().enumerate() {
        for (x, reading) in row.iter().enumerate() {
            points[origin.y + y][origin.x + x] = RawCell {
                plate_id: Some(id),
                raw_thickness: *reading,
            };
        }
    }
}
