#![allow(dead_code)]

use corroscan::{InspectionPipeline, ParsedSheet, ProcessConfig};

/// Builds a parsed sheet straight from a thickness matrix.
pub fn sheet(name: &str, rows: &[&[f64]], nominal: Option<f64>) -> ParsedSheet {
    ParsedSheet::from_readings(name, rows.iter().map(|row| row.to_vec()).collect(), nominal)
}

/// A pipeline already staged with `rows` as its first plate.
pub fn staged(rows: &[&[f64]], nominal: Option<f64>) -> InspectionPipeline {
    let mut pipeline = InspectionPipeline::new(ProcessConfig::default());
    pipeline
        .init(&sheet("plate_a.csv", rows, nominal))
        .expect("first sheet stages");
    pipeline
}

/// Deterministic pseudo-random plate with a few voids, for property checks.
pub fn noisy_plate(width: usize, height: usize, nominal: f64, seed: u64) -> Vec<Vec<f64>> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..height)
        .map(|_| {
            (0..width)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
                    if unit < 0.07 { 0.0 } else { nominal * (0.3 + unit) }
                })
                .collect()
        })
        .collect()
}

pub const CSV_PLATE: &str = "\
Client,Harbor Tank Farm
Nominal Thickness,12.0 mm
Y/X,0,50,100,150,200,250
0,11.9,11.8,11.7,11.9,12.2,11.9
50,11.6,---,11.5,11.4,11.8,11.7
100,11.7,11.6,7.4,7.3,11.9,11.8
150,11.8,11.7,7.5,11.6,11.8,11.9
";
