// THEORY:
// This file is the entry point of the `corroscan` library crate. It exposes the
// `InspectionPipeline` session (and the `EngineWorker` that runs one in the
// background) as the high-level interface, while the stage implementations live
// in `core_modules`:
//
//     sheet_parser -> grid_merger -> grid_finalizer -> { buffer_encoder, segmenter }
//
// Every stage after the merger is a pure function of the finalized grid, so a
// host can re-run segmentation or encoding in isolation.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod worker;

pub use config::{
    AssetType, ColorScheme, ConflictResolution, MergeConfig, MergeDirection, ProcessConfig,
};
pub use core_modules::sheet_parser::{parse_sheet, ParsedSheet};
pub use error::{ConfigError, MergeError, ParseError, SessionError, ThicknessConflict};
pub use pipeline::{InspectionPipeline, InspectionReport, SessionState};
pub use worker::EngineWorker;
