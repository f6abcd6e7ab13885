//! Session and merge configuration.
//!
//! The host supplies these from its setup and merge dialogs; the CLI reads a
//! `ProcessConfig` from a JSON file and lets flags override individual fields.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default corrosion threshold, in percent of nominal thickness.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;

/// The kind of asset the scan was taken on. Carried through to reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[default]
    Plate,
    Tank,
    Pipe,
    Vessel,
    ShipHull,
    Other,
}

/// Color ramp applied by the buffer encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    /// Hue ramp from blue (thinnest) to red (thickest).
    #[default]
    Spectrum,
    Grayscale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Overrides the nominal thickness detected in the first sheet.
    pub nominal_thickness: Option<f64>,
    pub asset_type: AssetType,
    pub threshold_percent: f64,
    pub color_scheme: ColorScheme,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            nominal_thickness: None,
            asset_type: AssetType::default(),
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            color_scheme: ColorScheme::default(),
        }
    }
}

impl ProcessConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(nominal) = self.nominal_thickness {
            validate_nominal(nominal)?;
        }
        Ok(())
    }
}

/// Rejects nominal thickness values the finalizer cannot interpret. Zero is
/// accepted; it degrades percentages to 0 instead of failing.
pub fn validate_nominal(nominal: f64) -> Result<f64, ConfigError> {
    if nominal.is_finite() && nominal >= 0.0 {
        Ok(nominal)
    } else {
        Err(ConfigError::InvalidNominalThickness(nominal))
    }
}

/// The edge of the existing grid a new sheet is stitched onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDirection {
    Right,
    Left,
    Top,
    Bottom,
}

impl std::str::FromStr for MergeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "right" => Ok(MergeDirection::Right),
            "left" => Ok(MergeDirection::Left),
            "top" => Ok(MergeDirection::Top),
            "bottom" => Ok(MergeDirection::Bottom),
            other => Err(format!("unknown merge direction `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub direction: MergeDirection,
    /// For `right`/`bottom`: column/row where the new sheet's origin lands.
    /// For `left`/`top`: column/row the existing grid is shifted to.
    pub start: usize,
}

/// How the caller settles a `ThicknessConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    UseExisting,
    UseNew,
    UseCustom(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = ProcessConfig::from_json(r#"{ "nominal_thickness": 12.5, "asset_type": "ship_hull" }"#)
            .expect("valid config");
        assert_eq!(config.nominal_thickness, Some(12.5));
        assert_eq!(config.asset_type, AssetType::ShipHull);
        assert_eq!(config.threshold_percent, DEFAULT_THRESHOLD_PERCENT);
        assert_eq!(config.color_scheme, ColorScheme::Spectrum);
    }

    #[test]
    fn negative_nominal_is_rejected() {
        let config = ProcessConfig {
            nominal_thickness: Some(-1.0),
            ..ProcessConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidNominalThickness(-1.0)));
        assert!(validate_nominal(0.0).is_ok());
        assert!(validate_nominal(f64::INFINITY).is_err());
    }

    #[test]
    fn merge_direction_parses_case_insensitively() {
        assert_eq!("Right".parse::<MergeDirection>(), Ok(MergeDirection::Right));
        assert!("diagonal".parse::<MergeDirection>().is_err());
    }
}
