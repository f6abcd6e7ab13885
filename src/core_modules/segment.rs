// THEORY:
// A `SegmentBox` is one spatially connected region of the finalized grid: either a
// corrosion patch (cells thinner than the threshold) or a non-inspected void. It
// is a plain data container summarizing the region (bounding box, size, and for
// corrosion the thickness statistics and severity) so report builders and patch
// tables never need to walk the grid themselves.
//
// Segments are snapshots of one segmentation run. Their ids are assigned in
// row-major discovery order and mean nothing across runs.

use serde::Serialize;

use crate::core_modules::cell::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentKind {
    Corrosion,
    NonInspected,
}

/// Severity of a corrosion segment, from its worst reading relative to nominal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SeverityTier {
    Moderate,
    Severe,
    Critical,
}

impl SeverityTier {
    pub fn from_worst_percentage(worst_percentage: f64) -> Self {
        if worst_percentage < 60.0 {
            SeverityTier::Critical
        } else if worst_percentage < 70.0 {
            SeverityTier::Severe
        } else {
            SeverityTier::Moderate
        }
    }
}

/// Inclusive grid bounds of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl BoundingBox {
    pub fn around(point: Point) -> Self {
        Self {
            x_min: point.x,
            x_max: point.x,
            y_min: point.y,
            y_max: point.y,
        }
    }

    pub fn include(&mut self, point: Point) {
        self.x_min = self.x_min.min(point.x);
        self.x_max = self.x_max.max(point.x);
        self.y_min = self.y_min.min(point.y);
        self.y_max = self.y_max.max(point.y);
    }

    /// Midpoint, rounded half away from zero.
    pub fn center(&self) -> Point {
        Point {
            x: ((self.x_min + self.x_max) as f64 / 2.0).round() as usize,
            y: ((self.y_min + self.y_max) as f64 / 2.0).round() as usize,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        (self.x_min..=self.x_max).contains(&point.x) && (self.y_min..=self.y_max).contains(&point.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentBox {
    /// Discovery order within a single segmentation run.
    pub id: u32,
    pub kind: SegmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<SeverityTier>,
    pub point_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_thickness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_thickness: Option<f64>,
    /// `(1 - worst / nominal) * point_count`: larger and deeper patches score higher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_score: Option<f64>,
    pub coordinates: BoundingBox,
    pub center: Point,
    /// Member cells in discovery order.
    #[serde(skip)]
    pub points: Vec<Point>,
}

/// Both segment lists of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationResult {
    pub corrosion_patches: Vec<SegmentBox>,
    pub nd_patches: Vec<SegmentBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_worst_percentage() {
        assert_eq!(SeverityTier::from_worst_percentage(40.0), SeverityTier::Critical);
        assert_eq!(SeverityTier::from_worst_percentage(60.0), SeverityTier::Severe);
        assert_eq!(SeverityTier::from_worst_percentage(69.9), SeverityTier::Severe);
        assert_eq!(SeverityTier::from_worst_percentage(70.0), SeverityTier::Moderate);
    }

    #[test]
    fn bounding_box_grows_and_centers() {
        let mut bbox = BoundingBox::around(Point { x: 2, y: 5 });
        bbox.include(Point { x: 5, y: 4 });
        assert_eq!(bbox, BoundingBox { x_min: 2, x_max: 5, y_min: 4, y_max: 5 });
        assert_eq!(bbox.center(), Point { x: 4, y: 5 });
        assert!(bbox.contains(Point { x: 3, y: 4 }));
        assert!(!bbox.contains(Point { x: 6, y: 4 }));
    }
}
