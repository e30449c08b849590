use std::collections::HashSet;

use super::*;
use crate::config::{Connectivity, SegmentationConfig};
use crate::image::DetectionFrame;
use crate::math::PixelCoordinate;
use crate::testing::{empty_registry, mask_frame};

fn segment(rows: &[&str], connectivity: Connectivity) -> (Vec<Source>, Vec<usize>) {
    let config = SegmentationConfig { connectivity };
    let segmentation = Segmentation::new(&config, empty_registry()).unwrap();
    let frame = mask_frame(rows);
    let mut outbox = Outbox::new();
    segmentation.process_frame(&frame, &mut outbox);

    let mut sources = Vec::new();
    let mut lines = Vec::new();
    for event in outbox.drain() {
        match event {
            SegmentationEvent::Source(source) => sources.push(source),
            SegmentationEvent::SafeLine(line) => lines.push(line),
        }
    }
    (sources, lines)
}

fn on_pixels(rows: &[&str]) -> HashSet<PixelCoordinate> {
    rows.iter()
        .enumerate()
        .flat_map(|(y, row)| {
            row.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'#')
                .map(move |(x, _)| PixelCoordinate::new(x, y))
        })
        .collect()
}

#[test]
fn two_disjoint_blobs() {
    let rows = [
        "##......",
        "##......",
        ".....###",
        ".....###",
        ".......#",
    ];
    let (sources, _) = segment(&rows, Connectivity::Eight);

    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].area(), 4);
    assert_eq!(sources[1].area(), 7);

    let mut covered = HashSet::new();
    for source in &sources {
        for pixel in source.pixels() {
            assert!(covered.insert(*pixel), "pixel {pixel:?} emitted twice");
        }
    }
    assert_eq!(covered, on_pixels(&rows));
}

#[test]
fn diagonal_staircase_is_one_region_with_eight_connectivity() {
    let rows = ["#....", ".#...", "..#..", "...#.", "....#"];
    let (sources, _) = segment(&rows, Connectivity::Eight);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].area(), 5);
}

#[test]
fn diagonal_staircase_splits_with_four_connectivity() {
    let rows = ["#....", ".#...", "..#..", "...#.", "....#"];
    let (sources, _) = segment(&rows, Connectivity::Four);
    assert_eq!(sources.len(), 5);
}

#[test]
fn u_shape_merges_into_one_region() {
    let rows = [
        "#...#..#",
        "#...#..#",
        "#...#..#",
        "#####..#",
    ];
    let (sources, _) = segment(&rows, Connectivity::Eight);
    assert_eq!(sources.len(), 2);
    // Both close at frame end; the U was discovered first.
    assert_eq!(sources[0].area(), 11);
    assert_eq!(sources[1].area(), 4);
}

#[test]
fn transitive_merge_through_one_run() {
    // Three columns joined by a single bottom run.
    let rows = ["#.#.#", "#.#.#", "#####"];
    let (sources, _) = segment(&rows, Connectivity::Eight);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].area(), 11);
}

#[test]
fn regions_are_emitted_in_discovery_order_when_closing_together() {
    let rows = ["#.#.#", "#.#.#"];
    let (sources, _) = segment(&rows, Connectivity::Eight);
    let xs: Vec<usize> = sources.iter().map(|s| s.pixels().as_slice()[0].x).collect();
    assert_eq!(xs, vec![0, 2, 4]);
}

#[test]
fn region_closes_before_frame_end() {
    let config = SegmentationConfig::default();
    let segmentation = Segmentation::new(&config, empty_registry()).unwrap();
    let frame = mask_frame(&["##..", "....", "....", "...."]);
    let mut scan = segmentation.scan(&frame);
    let mut outbox = Outbox::new();

    assert!(scan.next_row(&mut outbox));
    assert!(!outbox.drain().any(|e| matches!(e, SegmentationEvent::Source(_))));

    assert!(scan.next_row(&mut outbox));
    let sources = outbox
        .drain()
        .filter(|e| matches!(e, SegmentationEvent::Source(_)))
        .count();
    assert_eq!(sources, 1);
}

#[test]
fn safe_line_tracks_open_regions() {
    let rows = ["#...", "#...", "....", "..#."];
    let (_, lines) = segment(&rows, Connectivity::Eight);
    // The region opened on row 0 holds the line until it closes on row 2.
    assert_eq!(lines, vec![0, 3]);
}

#[test]
fn sources_carry_detection_frame_and_fresh_ids() {
    let (sources, _) = segment(&["#.#"], Connectivity::Eight);
    assert_eq!(sources.len(), 2);
    assert!(sources[0].cached_property::<DetectionFrame>().is_ok());
    assert_ne!(sources[0].id(), sources[1].id());
    assert_eq!(sources[0].id().id, sources[0].id().detection_id);
}

#[test]
fn empty_frame_emits_nothing() {
    let (sources, _) = segment(&["....", "...."], Connectivity::Eight);
    assert!(sources.is_empty());
}

#[test]
fn threshold_map_must_match_the_image() {
    use common::Buffer2;

    use crate::config::ConfigError;
    use crate::image::Threshold;

    let image = Arc::new(Buffer2::new_filled(20, 20, 1.0f32));
    let small_map = Threshold::Map(Arc::new(Buffer2::new_filled(10, 10, 0.5f32)));
    assert!(matches!(
        Frame::new(image.clone(), small_map),
        Err(ConfigError::Invalid { field: "threshold", .. })
    ));

    // A matching map thresholds per pixel: only the left half is below 1.0.
    let map = Buffer2::from_fn(20, 20, |x, _| if x < 10 { 0.5f32 } else { 2.0 });
    let frame = Frame::new(image, Threshold::Map(Arc::new(map))).unwrap();
    let segmentation = Segmentation::new(&SegmentationConfig::default(), empty_registry()).unwrap();
    let mut outbox = Outbox::new();
    segmentation.process_frame(&frame, &mut outbox);

    let sources: Vec<Source> = outbox
        .drain()
        .filter_map(|event| match event {
            SegmentationEvent::Source(source) => Some(source),
            SegmentationEvent::SafeLine(_) => None,
        })
        .collect();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].area(), 200);
    assert!(sources[0].pixels().iter().all(|p| p.x < 10));
}
