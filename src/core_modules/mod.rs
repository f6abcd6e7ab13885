pub mod buffer_encoder;
pub mod cell;
pub mod grid_finalizer;
pub mod grid_merger;
pub mod segment;
pub mod segmenter;
pub mod sheet_parser;
pub mod utils;
