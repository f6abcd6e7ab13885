// THEORY:
// The `Segmenter` is the spatial grouping layer. It runs a binary connected-
// component analysis over the finalized grid and reports each component as a
// `SegmentBox`.
//
// Algorithm:
// 1.  **Seeding**: cells are visited in row-major order. Any unvisited cell that
//     passes the qualification test starts a new component.
// 2.  **Region growing**: a breadth-first flood fill (FIFO queue) over the 4 direct
//     neighbors. A neighbor joins when it is unvisited and passes the same test.
// 3.  **Aggregation**: the member list is reduced into bounding box, center and, for
//     corrosion, thickness statistics and severity.
//
// Two tests are used: "thinner than `threshold` percent of nominal" for corrosion
// and "not inspected" for voids. The `visited` matrix is allocated per call, so a
// new threshold always means a fresh run over the grid.

use crate::core_modules::cell::{FinalCell, Point};
use crate::core_modules::grid_finalizer::{percent_of_nominal, FinalGrid};
use crate::core_modules::segment::{
    BoundingBox, SegmentBox, SegmentKind, SegmentationResult, SeverityTier,
};

pub mod segmenter {
    use super::*; // Make the data types from the parent module available.
    use std::collections::VecDeque;
    use tracing::debug;

    /// Finds every connected region thinner than `threshold_percent` of nominal,
    /// most severe (thinnest worst reading) first.
    pub fn segment_corrosion(final_grid: &FinalGrid, nominal: f64, threshold_percent: f64) -> Vec<SegmentBox> {
        if nominal <= 0.0 {
            return Vec::new();
        }
        let qualifies = |cell: &FinalCell| match cell.effective_thickness {
            Some(effective) if !cell.is_nd() => percent_of_nominal(effective, nominal) < threshold_percent,
            _ => false,
        };

        let mut segments: Vec<SegmentBox> = find_components(final_grid, qualifies)
            .into_iter()
            .enumerate()
            .map(|(id, points)| corrosion_segment(id as u32, points, final_grid, nominal))
            .collect();

        // Stable sort keeps discovery order among equally thin patches.
        segments.sort_by(|a, b| {
            let worst_a = a.worst_thickness.unwrap_or(f64::INFINITY);
            let worst_b = b.worst_thickness.unwrap_or(f64::INFINITY);
            worst_a.total_cmp(&worst_b)
        });
        debug!(threshold_percent, count = segments.len(), "segmented corrosion");
        segments
    }

    /// Finds every connected region of non-inspected cells, in discovery order.
    pub fn segment_non_inspected(final_grid: &FinalGrid) -> Vec<SegmentBox> {
        let segments: Vec<SegmentBox> = find_components(final_grid, FinalCell::is_nd)
            .into_iter()
            .enumerate()
            .map(|(id, points)| {
                let coordinates = bounding_box(&points);
                SegmentBox {
                    id: id as u32,
                    kind: SegmentKind::NonInspected,
                    tier: None,
                    point_count: points.len(),
                    worst_thickness: None,
                    avg_thickness: None,
                    severity_score: None,
                    coordinates,
                    center: coordinates.center(),
                    points,
                }
            })
            .collect();
        debug!(count = segments.len(), "segmented non-inspected areas");
        segments
    }

    /// Both segmentations over the same grid.
    pub fn segment_all(final_grid: &FinalGrid, nominal: f64, threshold_percent: f64) -> SegmentationResult {
        SegmentationResult {
            corrosion_patches: segment_corrosion(final_grid, nominal, threshold_percent),
            nd_patches: segment_non_inspected(final_grid),
        }
    }

    /// Labels the 4-connected components of cells satisfying `qualifies`.
    fn find_components(final_grid: &FinalGrid, qualifies: impl Fn(&FinalCell) -> bool) -> Vec<Vec<Point>> {
        let mut visited = vec![vec![false; final_grid.width]; final_grid.height];
        let mut components = Vec::new();

        for (seed, cell) in final_grid.cells() {
            if visited[seed.y][seed.x] || !qualifies(cell) {
                continue;
            }
            components.push(grow_region(seed, final_grid, &mut visited, &qualifies));
        }
        components
    }

    /// Breadth-first flood fill from `seed`.
    fn grow_region(
        seed: Point,
        final_grid: &FinalGrid,
        visited: &mut [Vec<bool>],
        qualifies: &impl Fn(&FinalCell) -> bool,
    ) -> Vec<Point> {
        let mut members: Vec<Point> = Vec::new();
        let mut queue: VecDeque<Point> = VecDeque::from([seed]);
        visited[seed.y][seed.x] = true;

        while let Some(current) = queue.pop_front() {
            members.push(current);

            // Check all 4 direct neighbors (not diagonals).
            let neighbors = [
                current.y.checked_sub(1).map(|y| Point { x: current.x, y }),
                Some(Point { x: current.x, y: current.y + 1 }),
                current.x.checked_sub(1).map(|x| Point { x, y: current.y }),
                Some(Point { x: current.x + 1, y: current.y }),
            ];
            for next in neighbors.into_iter().flatten() {
                let Some(cell) = final_grid.get(next.x, next.y) else {
                    continue;
                };
                if !visited[next.y][next.x] && qualifies(cell) {
                    visited[next.y][next.x] = true;
                    queue.push_back(next);
                }
            }
        }
        members
    }

    fn bounding_box(points: &[Point]) -> BoundingBox {
        let mut bbox = BoundingBox::around(points[0]);
        for point in &points[1..] {
            bbox.include(*point);
        }
        bbox
    }

    fn corrosion_segment(id: u32, points: Vec<Point>, final_grid: &FinalGrid, nominal: f64) -> SegmentBox {
        let thicknesses: Vec<f64> = points
            .iter()
            .filter_map(|p| final_grid.get(p.x, p.y).and_then(|cell| cell.effective_thickness))
            .collect();
        let worst = thicknesses.iter().copied().fold(f64::INFINITY, f64::min);
        let avg = thicknesses.iter().sum::<f64>() / thicknesses.len() as f64;
        let coordinates = bounding_box(&points);

        SegmentBox {
            id,
            kind: SegmentKind::Corrosion,
            tier: Some(SeverityTier::from_worst_percentage(percent_of_nominal(worst, nominal))),
            point_count: points.len(),
            worst_thickness: Some(worst),
            avg_thickness: Some(avg),
            severity_score: Some((1.0 - worst / nominal) * points.len() as f64),
            coordinates,
            center: coordinates.center(),
            points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::segmenter::*;
    use super::*;
    use crate::core_modules::cell::PlateId;
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn grid(rows: &[&[f64]]) -> FinalGrid {
        let rows: Vec<Vec<FinalCell>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&value| {
                        if value > 0.0 {
                            FinalCell {
                                plate_id: Some(PlateId(0)),
                                raw_thickness: Some(value),
                                effective_thickness: Some(value),
                                percentage: Some(0.0),
                            }
                        } else {
                            FinalCell::ND
                        }
                    })
                    .collect()
            })
            .collect();
        FinalGrid {
            width: rows[0].len(),
            height: rows.len(),
            rows,
        }
    }

    #[test]
    fn single_pit_is_one_critical_segment() {
        let grid = grid(&[&[10.0, 10.0, 10.0], &[10.0, 4.0, 10.0], &[10.0, 10.0, 10.0]]);
        let segments = segment_corrosion(&grid, 10.0, 80.0);

        assert_eq!(segments.len(), 1);
        let pit = &segments[0];
        assert_eq!(pit.point_count, 1);
        assert_eq!(pit.worst_thickness, Some(4.0));
        assert_eq!(pit.tier, Some(SeverityTier::Critical));
        assert_eq!(pit.center, Point { x: 1, y: 1 });
        assert_relative_eq!(pit.severity_score.unwrap_or_default(), 0.6);
    }

    #[test]
    fn diagonal_cells_are_separate_and_sorted_by_worst() {
        let grid = grid(&[&[7.5, 10.0, 10.0], &[10.0, 6.5, 6.8], &[10.0, 10.0, 10.0]]);
        let segments = segment_corrosion(&grid, 10.0, 80.0);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].worst_thickness, Some(6.5));
        assert_eq!(segments[0].point_count, 2);
        assert_eq!(segments[0].id, 1);
        assert_eq!(segments[0].tier, Some(SeverityTier::Severe));
        assert_eq!(segments[0].coordinates, BoundingBox { x_min: 1, x_max: 2, y_min: 1, y_max: 1 });
        assert_relative_eq!(segments[0].avg_thickness.unwrap_or_default(), 6.65);
        assert_eq!(segments[1].id, 0);
        assert_eq!(segments[1].tier, Some(SeverityTier::Moderate));
    }

    #[test]
    fn flood_fill_is_breadth_first() {
        let grid = grid(&[&[5.0, 5.0, 5.0], &[5.0, 5.0, 5.0]]);
        let segments = segment_corrosion(&grid, 10.0, 80.0);
        let order: Vec<(usize, usize)> = segments[0].points.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]);
    }

    #[test]
    fn thresholds_rerun_from_scratch() {
        let grid = grid(&[&[7.0, 9.0, 7.0]]);
        assert_eq!(segment_corrosion(&grid, 10.0, 80.0).len(), 2);
        assert_eq!(segment_corrosion(&grid, 10.0, 95.0).len(), 1);
        assert_eq!(segment_corrosion(&grid, 10.0, 80.0), segment_corrosion(&grid, 10.0, 80.0));
        assert!(segment_corrosion(&grid, 0.0, 80.0).is_empty());
    }

    #[test]
    fn nd_row_becomes_one_void_segment() {
        let grid = grid(&[
            &[9.0, 9.0, 9.0, 9.0],
            &[0.0, 0.0, 0.0, 0.0],
            &[9.0, 9.0, 9.0, 9.0],
        ]);
        let voids = segment_non_inspected(&grid);

        assert_eq!(voids.len(), 1);
        let void = &voids[0];
        assert_eq!(void.kind, SegmentKind::NonInspected);
        assert_eq!(void.tier, None);
        assert_eq!(void.worst_thickness, None);
        assert_eq!(void.point_count, 4);
        assert_eq!(void.coordinates, BoundingBox { x_min: 0, x_max: 3, y_min: 1, y_max: 1 });
        assert!(segment_corrosion(&grid, 10.0, 80.0).is_empty());
    }

    #[test]
    fn every_cell_is_accounted_for_once() {
        let grid = grid(&[
            &[5.0, 9.0, 0.0, 5.0],
            &[5.0, 0.0, 0.0, 5.0],
            &[9.0, 7.9, 5.5, 9.5],
        ]);
        let result = segment_all(&grid, 10.0, 80.0);

        let mut seen: HashSet<Point> = HashSet::new();
        for segment in &result.corrosion_patches {
            for point in &segment.points {
                assert!(seen.insert(*point), "{point:?} in two segments");
            }
        }
        let corrosion_cells = seen.len();
        let nd_cells: usize = result.nd_patches.iter().map(|s| s.point_count).sum();
        let sound_cells = grid
            .cells()
            .filter(|(_, cell)| !cell.is_nd() && cell.effective_thickness.is_some_and(|t| t >= 8.0))
            .count();

        assert_eq!(corrosion_cells + nd_cells + sound_cells, 12);
        assert_eq!(result.nd_patches.len(), 1);
    }
}
