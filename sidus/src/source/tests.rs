use std::sync::Arc;

use super::*;
use crate::image::DetectionFrame;
use crate::testing::{empty_registry, mask_frame, rect, source};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tag(u32);
impl Property for Tag {}

#[test]
fn source_is_born_with_footprint_and_id() {
    let registry = empty_registry();
    let source = source(rect(1, 2, 3, 2), &registry);

    assert_eq!(source.area(), 3);
    assert_eq!(
        source.cached_property::<PixelCoordinateList>().unwrap().len(),
        3
    );
    assert_eq!(source.cached_property::<SourceId>(), Ok(&source.id()));
    let bbox = source.pixels().bounding_box().unwrap();
    assert_eq!((bbox.x_min, bbox.x_max, bbox.y_min, bbox.y_max), (1, 3, 2, 2));
}

#[test]
fn derive_inherits_frame_and_detection_id() {
    let registry = empty_registry();
    let frame = mask_frame(&["###"]);
    let mut parent = source(rect(0, 0, 2, 0), &registry);
    parent.set_property(frame.detection.clone());
    parent.set_property(Tag(7));

    let child = parent.derive(rect(0, 0, 0, 0));
    assert_eq!(child.area(), 1);
    assert_eq!(child.id().detection_id, parent.id().detection_id);
    assert_ne!(child.id().id, parent.id().id);
    assert!(child.cached_property::<DetectionFrame>().is_ok());
    // Measurements are not inherited.
    assert!(child.cached_property::<Tag>().is_err());
}

#[test]
fn arena_handles_are_not_reused() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let a = arena.insert(source(rect(0, 0, 0, 0), &registry));
    arena.remove(a);
    let b = arena.insert(source(rect(0, 0, 0, 0), &registry));

    assert_ne!(a, b);
    assert!(arena.get(a).is_none());
    assert_eq!(arena.len(), 1);
}

#[test]
fn detach_moves_sources_with_their_handles() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let a = arena.insert(source(rect(0, 0, 0, 0), &registry));
    let b = arena.insert(source(rect(1, 0, 1, 0), &registry));

    let mut detached = arena.detach(&[b]);
    assert!(arena.contains(a));
    assert!(!arena.contains(b));
    assert!(detached.contains(b));

    let c = detached.insert(source(rect(2, 0, 2, 0), &registry));
    assert_ne!(c, a);
    assert_ne!(c, b);
}

#[test]
fn group_scoped_member_property_is_cleared_on_membership_change() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);

    let a = view.insert_source(source(rect(0, 0, 0, 0), &registry));
    assert!(view.set_member_property(a, 0, Tag(1)));
    view.set_property(Tag(10));
    assert_eq!(view.source(a).unwrap().cached_property::<Tag>(), Ok(&Tag(1)));

    view.insert_source(source(rect(1, 0, 1, 0), &registry));
    assert!(view.source(a).unwrap().cached_property::<Tag>().is_err());
    assert!(view.cached_property::<Tag>().is_err());
}

#[test]
fn own_properties_survive_membership_change() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);

    let a = view.insert_source(source(rect(0, 0, 0, 0), &registry));
    view.source_mut(a).unwrap().set_property(Tag(3));
    view.insert_source(source(rect(1, 0, 1, 0), &registry));

    assert_eq!(view.source(a).unwrap().cached_property::<Tag>(), Ok(&Tag(3)));
}

#[test]
fn removed_member_loses_group_scoped_properties() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);

    let a = view.insert_source(source(rect(0, 0, 0, 0), &registry));
    let b = view.insert_source(source(rect(1, 0, 1, 0), &registry));
    view.set_member_property(a, 0, Tag(1));

    let removed = view.remove_source(a).unwrap();
    assert!(removed.cached_property::<Tag>().is_err());
    assert_eq!(view.members(), &[b]);
    assert!(view.remove_source(a).is_none());
}

#[test]
fn replace_keeps_member_order() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);

    let a = view.insert_source(source(rect(0, 0, 0, 0), &registry));
    let b = view.insert_source(source(rect(1, 0, 2, 0), &registry));
    let c = view.insert_source(source(rect(4, 0, 4, 0), &registry));

    let parent = view.source(b).unwrap();
    let children = vec![parent.derive(rect(1, 0, 1, 0)), parent.derive(rect(2, 0, 2, 0))];
    let new_handles = view.replace_source(b, children).unwrap();

    let mut expected = vec![a];
    expected.extend(&new_handles);
    expected.push(c);
    assert_eq!(view.members(), expected.as_slice());
    assert!(view.source(b).is_none());
}

#[test]
fn merge_appends_members_of_other_group() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();

    let mut other = SourceGroup::new(Arc::clone(&registry));
    let b = GroupView::new(&mut other, &mut arena).insert_source(source(rect(1, 0, 1, 0), &registry));

    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);
    let a = view.insert_source(source(rect(0, 0, 0, 0), &registry));
    view.merge(other);

    assert_eq!(view.members(), &[a, b]);
}

#[test]
fn non_member_is_not_reachable_through_view() {
    let registry = empty_registry();
    let mut arena = SourceArena::new();
    let outsider = arena.insert(source(rect(0, 0, 0, 0), &registry));

    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);
    assert!(view.source(outsider).is_none());
    assert!(view.source_mut(outsider).is_none());
    assert!(!view.set_member_property(outsider, 0, Tag(1)));
    assert!(view.member_property::<Tag>(outsider).is_err());
}
