mod common;

use approx::assert_relative_eq;
use common::{noisy_plate, sheet, staged, CSV_PLATE};
use corroscan::core_modules::grid_finalizer::Condition;
use corroscan::core_modules::segmenter::segmenter;
use corroscan::pipeline::{Point, SegmentKind, SeverityTier};
use corroscan::{
    ConflictResolution, InspectionPipeline, MergeConfig, MergeDirection, MergeError, ProcessConfig,
    SessionError, SessionState,
};

#[test]
fn single_thin_cell_becomes_one_critical_patch() {
    let mut pipeline = staged(
        &[&[10.0, 10.0, 10.0], &[10.0, 4.0, 10.0], &[10.0, 10.0, 10.0]],
        Some(10.0),
    );
    pipeline.finalize().expect("finalize");
    let segments = pipeline.segment(Some(80.0)).expect("segment");

    assert_eq!(segments.corrosion_patches.len(), 1);
    let patch = &segments.corrosion_patches[0];
    assert_eq!(patch.point_count, 1);
    assert_eq!(patch.worst_thickness, Some(4.0));
    assert_eq!(patch.tier, Some(SeverityTier::Critical));
    assert_eq!(patch.center, Point { x: 1, y: 1 });
    assert!(segments.nd_patches.is_empty());
}

#[test]
fn right_merge_places_new_columns_after_the_original() {
    let mut pipeline = staged(&[&[1.0, 2.0], &[3.0, 4.0]], Some(10.0));
    let master = pipeline
        .merge(
            &sheet("plate_b.csv", &[&[5.0, 6.0], &[7.0, 8.0]], Some(10.0)),
            MergeConfig { direction: MergeDirection::Right, start: 2 },
            None,
        )
        .expect("merge");

    assert_eq!((master.width, master.height), (4, 2));
    let row0: Vec<f64> = (0..4).map(|x| master.get(x, 0).map(|c| c.raw_thickness).unwrap_or(-1.0)).collect();
    let row1: Vec<f64> = (0..4).map(|x| master.get(x, 1).map(|c| c.raw_thickness).unwrap_or(-1.0)).collect();
    assert_eq!(row0, vec![1.0, 2.0, 5.0, 6.0]);
    assert_eq!(row1, vec![3.0, 4.0, 7.0, 8.0]);
    assert_eq!(master.plates.len(), 2);
}

#[test]
fn zero_nominal_degrades_without_dividing() {
    let mut pipeline = staged(&[&[5.0, 6.0], &[7.0, 8.0]], None);
    let finalized = pipeline.finalize().expect("finalize");

    assert_eq!(finalized.stats.nominal_thickness, 0.0);
    assert_eq!(finalized.stats.min_percentage, 0.0);
    assert_eq!(finalized.stats.area_below_80, 0.0);
    assert!(finalized.stats.avg_thickness.is_finite());
    assert_eq!(finalized.condition, Condition::Critical);

    let segments = pipeline.segment(None).expect("segment");
    assert!(segments.corrosion_patches.is_empty());
}

#[test]
fn empty_plate_is_not_applicable() {
    let mut pipeline = staged(&[&[0.0, 0.0], &[0.0, 0.0]], Some(10.0));
    let finalized = pipeline.finalize().expect("finalize");
    assert_eq!(finalized.stats.valid_points, 0);
    assert_eq!(finalized.condition, Condition::NotApplicable);
}

#[test]
fn void_row_is_one_non_inspected_patch() {
    let mut pipeline = staged(
        &[&[9.0, 9.0, 9.0, 9.0], &[0.0, 0.0, 0.0, 0.0], &[9.0, 9.0, 9.0, 9.0]],
        Some(10.0),
    );
    pipeline.finalize().expect("finalize");
    let segments = pipeline.segment(None).expect("segment");

    assert_eq!(segments.nd_patches.len(), 1);
    let patch = &segments.nd_patches[0];
    assert_eq!(patch.kind, SegmentKind::NonInspected);
    assert_eq!(patch.point_count, 4);
    assert_eq!(
        (patch.coordinates.x_min, patch.coordinates.x_max, patch.coordinates.y_min, patch.coordinates.y_max),
        (0, 3, 1, 1)
    );
}

#[test]
fn finalize_is_repeatable() {
    let rows = noisy_plate(40, 25, 12.0, 7);
    let rows: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    let mut pipeline = staged(&rows, Some(12.0));

    let first = pipeline.finalize().expect("finalize").clone();
    let second = pipeline.finalize().expect("finalize").clone();
    assert_eq!(first, second);
}

#[test]
fn finalized_grid_covers_every_coordinate_and_stays_in_range() {
    let rows = noisy_plate(31, 17, 8.0, 42);
    let rows: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    let mut pipeline = staged(&rows, Some(8.0));
    let finalized = pipeline.finalize().expect("finalize");
    let grid = &finalized.final_grid;

    for y in 0..grid.height {
        for x in 0..grid.width {
            let cell = grid.get(x, y).expect("every coordinate is present");
            let raw_zero = cell.raw_thickness.is_none_or(|raw| raw == 0.0);
            assert_eq!(cell.effective_thickness.is_none(), raw_zero, "cell ({x}, {y})");
            if let Some(percentage) = cell.percentage {
                assert!((-1e-9..=100.0 + 1e-9).contains(&percentage), "cell ({x}, {y}) at {percentage}");
            }
        }
    }
    assert_eq!(
        finalized.stats.valid_points + finalized.stats.count_nd,
        finalized.stats.total_points
    );
}

#[test]
fn corrosion_patches_never_share_cells() {
    let rows = noisy_plate(30, 30, 10.0, 3);
    let rows: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    let mut pipeline = staged(&rows, Some(10.0));
    let finalized = pipeline.finalize().expect("finalize").clone();

    let patches = segmenter::segment_corrosion(&finalized.final_grid, 10.0, 80.0);
    let mut seen = vec![false; 30 * 30];
    let thin_cells = finalized
        .final_grid
        .cells()
        .filter(|(_, cell)| cell.effective_thickness.is_some_and(|t| t < 8.0))
        .count();
    for patch in &patches {
        for point in &patch.points {
            let slot = &mut seen[point.y * 30 + point.x];
            assert!(!*slot, "cell {point:?} counted twice");
            *slot = true;
        }
    }
    assert_eq!(seen.iter().filter(|s| **s).count(), thin_cells);
}

#[test]
fn merges_never_shrink_the_grid() {
    let mut pipeline = staged(&[&[10.0; 4], &[10.0; 4], &[10.0; 4]], Some(10.0));
    let placements = [
        (MergeDirection::Right, 1, 2usize, 2usize),
        (MergeDirection::Bottom, 0, 1, 6),
        (MergeDirection::Left, 1, 2, 1),
        (MergeDirection::Top, 2, 3, 3),
    ];
    let (mut width, mut height) = (4, 3);
    for (i, (direction, start, rows, cols)) in placements.into_iter().enumerate() {
        let readings = vec![vec![9.5; cols]; rows];
        let readings: Vec<&[f64]> = readings.iter().map(Vec::as_slice).collect();
        let master = pipeline
            .merge(
                &sheet(&format!("patch_{i}.csv"), &readings, Some(10.0)),
                MergeConfig { direction, start },
                None,
            )
            .expect("merge");
        assert!(master.width >= width && master.height >= height, "{direction:?} shrank the grid");
        width = master.width;
        height = master.height;
    }
}

#[test]
fn conflict_waits_for_a_resolution() {
    let mut pipeline = staged(&[&[10.0, 9.0]], Some(10.0));
    let incoming = sheet("plate_b.csv", &[&[11.0, 12.0]], Some(12.0));
    let placement = MergeConfig { direction: MergeDirection::Right, start: 2 };

    let Err(SessionError::Merge(MergeError::ThicknessMismatch(conflict))) =
        pipeline.merge(&incoming, placement, None)
    else {
        panic!("expected a thickness conflict");
    };
    assert_eq!(conflict.file_name, "plate_b.csv");
    assert_eq!(conflict.original_thickness, 10.0);
    assert_eq!(conflict.conflicting_thickness, 12.0);
    assert_eq!(pipeline.master().map(|m| m.width), Some(2));

    let master = pipeline
        .merge(&incoming, placement, Some(ConflictResolution::UseNew))
        .expect("resolved merge");
    assert_eq!(master.width, 4);
    assert_eq!(master.nominal_thickness(), 12.0);
}

#[test]
fn csv_report_runs_end_to_end() {
    let mut pipeline = InspectionPipeline::new(ProcessConfig::default());
    pipeline
        .init_from_bytes(CSV_PLATE.as_bytes(), "tank_shell.csv")
        .expect("csv stages");
    assert_eq!(pipeline.state(), SessionState::Staged);

    pipeline.finalize().expect("finalize");
    let report = pipeline.report().expect("report");

    assert_eq!(report.stats.nominal_thickness, 12.0);
    assert_eq!(report.stats.grid_size.width, 6);
    assert_eq!(report.stats.grid_size.height, 4);
    assert_eq!(report.stats.count_nd, 1);
    assert_relative_eq!(report.stats.min_thickness, 7.3);
    assert_relative_eq!(report.stats.scanned_area, 23.0 * 50.0 * 50.0);

    assert_eq!(report.corrosion_patches.len(), 1);
    assert_eq!(report.corrosion_patches[0].point_count, 3);
    assert_eq!(report.corrosion_patches[0].tier, Some(SeverityTier::Severe));
    assert_eq!(report.nd_patches.len(), 1);

    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["corrosion_patches"][0]["kind"], "CORROSION");
    assert!(json["corrosion_patches"][0].get("points").is_none());

    let buffers = pipeline.encode(None).expect("encode");
    assert_eq!(buffers.displacement.len(), 24);
    assert_eq!(buffers.color.len(), 96);
}

#[test]
fn invalid_direct_readings_finalize_as_voids() {
    let mut pipeline = staged(&[&[-2.0, f64::NAN, 5.0], &[6.0, 7.0, 8.0]], Some(10.0));
    let finalized = pipeline.finalize().expect("finalize");

    for x in 0..2 {
        let cell = finalized.final_grid.get(x, 0).expect("in bounds");
        assert_eq!(cell.raw_thickness, Some(0.0));
        assert_eq!(cell.effective_thickness, None);
        assert!(cell.is_nd());
    }
    assert_eq!(finalized.stats.count_nd, 2);
    assert_eq!(finalized.stats.min_thickness, 5.0);
}
