use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::source::{SourceArena, SourceGroup, SourceHandle};
use crate::testing::{empty_registry, rect, source, star_frame};
use crate::task::TaskRegistry;

struct NoSplitStep(Arc<AtomicUsize>);

impl DeblendStep for NoSplitStep {
    fn name(&self) -> &str {
        "no_split"
    }

    fn deblend(&self, _group: &mut GroupView<'_>) -> anyhow::Result<bool> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(false)
    }
}

/// Removes the first member while at least two remain.
struct RemoveFirstStep;

impl DeblendStep for RemoveFirstStep {
    fn name(&self) -> &str {
        "remove_first"
    }

    fn deblend(&self, group: &mut GroupView<'_>) -> anyhow::Result<bool> {
        if group.len() < 2 {
            return Ok(false);
        }
        let first = group.members()[0];
        group.remove_source(first);
        Ok(true)
    }
}

/// Always claims to modify the group.
struct RestlessStep;

impl DeblendStep for RestlessStep {
    fn name(&self) -> &str {
        "restless"
    }

    fn deblend(&self, _group: &mut GroupView<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }
}

fn group_of(
    sizes: &[usize],
    registry: &Arc<TaskRegistry>,
    arena: &mut SourceArena,
) -> (SourceGroup, Vec<SourceHandle>) {
    let mut group = SourceGroup::new(Arc::clone(registry));
    let mut view = GroupView::new(&mut group, arena);
    let handles = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| view.insert_source(source(rect(0, i * 2, size - 1, i * 2), registry)))
        .collect();
    (group, handles)
}

fn config(mode: DeblendMode) -> DeblendConfig {
    DeblendConfig {
        mode,
        max_iterations: 5,
        ..Default::default()
    }
}

#[test]
fn single_source_without_split_runs_one_pass() {
    for mode in [DeblendMode::SinglePass, DeblendMode::FixedPoint] {
        let registry = empty_registry();
        let mut arena = SourceArena::new();
        let (mut group, handles) = group_of(&[4], &registry, &mut arena);
        let calls = Arc::new(AtomicUsize::new(0));
        let deblending =
            Deblending::new(&config(mode), vec![Box::new(NoSplitStep(Arc::clone(&calls)))]).unwrap();

        let status = deblending
            .deblend(&mut GroupView::new(&mut group, &mut arena))
            .unwrap();

        assert_eq!(status, DeblendStatus::Converged { passes: 1 });
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(group.members(), handles.as_slice());
    }
}

#[test]
fn single_pass_applies_each_step_once() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let (mut group, handles) = group_of(&[3, 3, 3], &registry, &mut arena);
    let deblending = Deblending::new(
        &config(DeblendMode::SinglePass),
        vec![Box::new(RemoveFirstStep)],
    )
    .unwrap();

    deblending
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert_eq!(group.members(), &handles[1..]);
    assert!(!arena.contains(handles[0]));
}

#[test]
fn steps_run_in_order_within_a_pass() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let (mut group, handles) = group_of(&[3, 3, 3], &registry, &mut arena);
    let deblending = Deblending::new(
        &config(DeblendMode::SinglePass),
        vec![Box::new(RemoveFirstStep), Box::new(RemoveFirstStep)],
    )
    .unwrap();

    deblending
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert_eq!(group.members(), &handles[2..]);
}

#[test]
fn fixed_point_repeats_until_unmodified() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let (mut group, _) = group_of(&[3, 3, 3], &registry, &mut arena);
    let deblending = Deblending::new(
        &config(DeblendMode::FixedPoint),
        vec![Box::new(RemoveFirstStep)],
    )
    .unwrap();

    let status = deblending
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert_eq!(status, DeblendStatus::Converged { passes: 3 });
    assert_eq!(group.len(), 1);
    assert_eq!(group.cached_property::<DeblendStatus>().unwrap(), &status);
}

#[test]
fn iteration_cap_reports_non_convergence() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let (mut group, _) = group_of(&[3], &registry, &mut arena);
    let deblending =
        Deblending::new(&config(DeblendMode::FixedPoint), vec![Box::new(RestlessStep)]).unwrap();

    let status = deblending
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert_eq!(status, DeblendStatus::NotConverged { passes: 5 });
    assert!(!status.converged());
    assert_eq!(group.len(), 1);
}

#[test]
fn min_area_step_removes_small_members() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let (mut group, handles) = group_of(&[2, 5, 1], &registry, &mut arena);
    let step = MinAreaDeblendStep::new(3).unwrap();

    let modified = step
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert!(modified);
    assert_eq!(group.members(), &[handles[1]]);
    assert_eq!(arena.len(), 1);
}

#[test]
fn invalid_config_is_rejected() {
    let config = DeblendConfig {
        max_iterations: 0,
        ..Default::default()
    };
    assert!(Deblending::new(&config, Vec::new()).is_err());
    assert!(MinAreaDeblendStep::new(0).is_err());
    assert!(PeakSplitDeblendStep::new(0, 0.3).is_err());
}

fn segmented_group(
    frame: &crate::image::Frame,
    registry: &Arc<TaskRegistry>,
    arena: &mut SourceArena,
) -> SourceGroup {
    let mut pixels = Vec::new();
    let image = frame.detection.image();
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            if frame.threshold.is_above(image.value(x, y), x, y) {
                pixels.push(crate::math::PixelCoordinate::new(x, y));
            }
        }
    }
    let mut blended = source(pixels, registry);
    blended.set_property(frame.detection.clone());

    let mut group = SourceGroup::new(Arc::clone(registry));
    GroupView::new(&mut group, arena).insert_source(blended);
    group
}

#[test]
fn peak_split_separates_two_stars() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let frame = star_frame(30, 20, &[(9.0, 10.0, 10.0, 2.0), (19.0, 10.0, 8.0, 2.0)], 0.5);
    let mut group = segmented_group(&frame, &registry, &mut arena);
    let original_area = arena.get(group.members()[0]).unwrap().area();
    let detection_id = arena.get(group.members()[0]).unwrap().id().detection_id;

    let step = PeakSplitDeblendStep::new(3, 0.3).unwrap();
    let modified = step
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();

    assert!(modified);
    assert_eq!(group.len(), 2);
    let areas: usize = group
        .members()
        .iter()
        .map(|&h| arena.get(h).unwrap().area())
        .sum();
    assert_eq!(areas, original_area);
    for &handle in group.members() {
        let child = arena.get(handle).unwrap();
        assert_eq!(child.id().detection_id, detection_id);
        assert!(child.detection_frame().is_ok());
    }

    // Children hold one peak each, so a second run leaves them alone.
    let modified = step
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert!(!modified);
}

#[test]
fn peak_split_ignores_faint_secondary() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let frame = star_frame(30, 20, &[(9.0, 10.0, 10.0, 2.0), (17.0, 10.0, 1.2, 1.0)], 0.5);
    let mut group = segmented_group(&frame, &registry, &mut arena);

    let step = PeakSplitDeblendStep::new(3, 0.3).unwrap();
    let modified = step
        .deblend(&mut GroupView::new(&mut group, &mut arena))
        .unwrap();
    assert!(!modified);
    assert_eq!(group.len(), 1);
}
