// THEORY:
// The `pipeline` module is the top-level API of the engine. An `InspectionPipeline`
// is one inspection session: it owns the `GridMerger` (and through it the master
// grid) plus the latest finalized output, and walks a small state machine:
//
//     Idle --init--> Staged --finalize--> Finalized --reset--> Idle
//                    ^   |                   |
//                    +---+----merge----------+
//
// Merging after finalization drops the stale finalized output and returns to
// `Staged`. Segmentation and encoding only read the finalized output, so either
// can be re-run (new threshold, new color scheme) without re-finalizing.

use serde::Serialize;
use tracing::info;

use crate::config::{AssetType, ColorScheme, ConflictResolution, MergeConfig, ProcessConfig};
use crate::core_modules::buffer_encoder::{self, EncodedBuffers};
use crate::core_modules::grid_finalizer::{self, Condition, Finalized, InspectionStats};
use crate::core_modules::grid_merger::{GridMerger, MasterGrid, PlateRecord};
use crate::core_modules::segment::{SegmentBox, SegmentationResult};
use crate::core_modules::segmenter::segmenter;
use crate::core_modules::sheet_parser::{self, ParsedSheet};
use crate::error::SessionError;

// Re-export key data structures for the public API.
pub use crate::core_modules::cell::{FinalCell, PlateId, Point, RawCell};
pub use crate::core_modules::grid_finalizer::FinalGrid;
pub use crate::core_modules::segment::{BoundingBox, SegmentKind, SeverityTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Staged,
    Finalized,
}

/// Everything a report builder needs from a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionReport {
    pub asset_type: AssetType,
    pub condition: Condition,
    pub threshold_percent: f64,
    pub stats: InspectionStats,
    pub plates: Vec<PlateRecord>,
    pub corrosion_patches: Vec<SegmentBox>,
    pub nd_patches: Vec<SegmentBox>,
}

/// One inspection session.
#[derive(Debug, Clone)]
pub struct InspectionPipeline {
    config: ProcessConfig,
    merger: Option<GridMerger>,
    finalized: Option<Finalized>,
    segments: Option<SegmentationResult>,
}

impl InspectionPipeline {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            merger: None,
            finalized: None,
            segments: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.merger, &self.finalized) {
            (None, _) => SessionState::Idle,
            (Some(_), None) => SessionState::Staged,
            (Some(_), Some(_)) => SessionState::Finalized,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn master(&self) -> Option<&MasterGrid> {
        self.merger.as_ref().map(GridMerger::master)
    }

    pub fn finalized(&self) -> Option<&Finalized> {
        self.finalized.as_ref()
    }

    pub fn segments(&self) -> Option<&SegmentationResult> {
        self.segments.as_ref()
    }

    /// Starts the session from its first sheet.
    pub fn init(&mut self, sheet: &ParsedSheet) -> Result<&MasterGrid, SessionError> {
        self.require("init", &[SessionState::Idle])?;
        let merger = self.merger.insert(GridMerger::init(sheet, &self.config)?);
        info!(file_name = %sheet.file_name, "session staged");
        Ok(merger.master())
    }

    /// Parses raw spreadsheet bytes and starts the session from them.
    pub fn init_from_bytes(&mut self, bytes: &[u8], file_name: &str) -> Result<&MasterGrid, SessionError> {
        self.require("init", &[SessionState::Idle])?;
        let sheet = sheet_parser::parse_sheet(bytes, file_name)?;
        self.init(&sheet)
    }

    /// Stitches another sheet in. On a thickness conflict the session is left
    /// exactly as it was.
    pub fn merge(
        &mut self,
        sheet: &ParsedSheet,
        merge_config: MergeConfig,
        resolution: Option<ConflictResolution>,
    ) -> Result<&MasterGrid, SessionError> {
        self.require("merge", &[SessionState::Staged, SessionState::Finalized])?;
        let Some(merger) = self.merger.as_mut() else {
            return Err(SessionError::InvalidState {
                operation: "merge",
                state: SessionState::Idle,
            });
        };
        merger.merge(sheet, merge_config, resolution)?;
        self.finalized = None;
        self.segments = None;
        Ok(merger.master())
    }

    /// Derives the final grid, statistics and condition from the master grid.
    pub fn finalize(&mut self) -> Result<&Finalized, SessionError> {
        self.require("finalize", &[SessionState::Staged, SessionState::Finalized])?;
        let Some(master) = self.master() else {
            return Err(SessionError::InvalidState {
                operation: "finalize",
                state: SessionState::Idle,
            });
        };
        let finalized = grid_finalizer::finalize(master, master.nominal_thickness());
        info!(condition = ?finalized.condition, "session finalized");
        self.segments = None;
        Ok(self.finalized.insert(finalized))
    }

    /// Segments the finalized grid. `threshold_percent` replaces the configured
    /// threshold for this and later runs.
    pub fn segment(&mut self, threshold_percent: Option<f64>) -> Result<&SegmentationResult, SessionError> {
        let finalized = self.finalized_or_err("segment")?;
        let threshold = threshold_percent.unwrap_or(self.config.threshold_percent);
        let result = segmenter::segment_all(
            &finalized.final_grid,
            finalized.stats.nominal_thickness,
            threshold,
        );
        self.config.threshold_percent = threshold;
        Ok(self.segments.insert(result))
    }

    /// Encodes the finalized grid for renderers. `scheme` defaults to the
    /// configured color scheme.
    pub fn encode(&self, scheme: Option<ColorScheme>) -> Result<EncodedBuffers, SessionError> {
        let finalized = self.finalized_or_err("encode")?;
        Ok(buffer_encoder::encode(
            &finalized.final_grid,
            scheme.unwrap_or(self.config.color_scheme),
        ))
    }

    /// Collects the finalized output and the latest segmentation, segmenting
    /// with the configured threshold if that has not happened yet.
    pub fn report(&mut self) -> Result<InspectionReport, SessionError> {
        if self.segments.is_none() {
            self.segment(None)?;
        }
        let finalized = self.finalized_or_err("report")?;
        let segments = self.segments.clone().unwrap_or(SegmentationResult {
            corrosion_patches: Vec::new(),
            nd_patches: Vec::new(),
        });
        Ok(InspectionReport {
            asset_type: self.config.asset_type,
            condition: finalized.condition,
            threshold_percent: self.config.threshold_percent,
            stats: finalized.stats.clone(),
            plates: self.master().map(|master| master.plates.clone()).unwrap_or_default(),
            corrosion_patches: segments.corrosion_patches,
            nd_patches: segments.nd_patches,
        })
    }

    /// Drops all session data and returns to `Idle`.
    pub fn reset(&mut self) {
        self.merger = None;
        self.finalized = None;
        self.segments = None;
        info!("session reset");
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState { operation, state })
        }
    }

    fn finalized_or_err(&self, operation: &'static str) -> Result<&Finalized, SessionError> {
        self.finalized.as_ref().ok_or(SessionError::InvalidState {
            operation,
            state: self.state(),
        })
    }
}
