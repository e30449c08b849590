use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::property::Property;
use crate::source::{SourceArena, SourceGroup};
use crate::testing::{rect, source};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Doubled(usize);
impl Property for Doubled {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tripled(usize);
impl Property for Tripled {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ping;
impl Property for Ping {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pong;
impl Property for Pong {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Members(usize);
impl Property for Members {}

fn counting_registry(calls: &Arc<AtomicUsize>) -> Arc<TaskRegistry> {
    let calls = Arc::clone(calls);
    let mut registry = TaskRegistry::new();
    registry
        .register_task_factory(
            [PropertyId::of::<Doubled>(), PropertyId::of::<Tripled>()],
            SharedTaskFactory::new(TaskHandle::source(move |source: &mut Source| {
                calls.fetch_add(1, Ordering::Relaxed);
                let area = source.area();
                source.set_property(Doubled(area * 2));
                source.set_property(Tripled(area * 3));
                Ok(())
            })),
        )
        .unwrap();
    Arc::new(registry)
}

#[test]
fn property_is_computed_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&calls);
    let mut source = source(rect(0, 0, 1, 1), &registry);

    for _ in 0..5 {
        assert_eq!(source.property::<Doubled>(), Ok(&Doubled(8)));
    }
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn byproduct_is_served_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&calls);
    let mut source = source(rect(0, 0, 2, 0), &registry);

    assert_eq!(source.property::<Doubled>(), Ok(&Doubled(6)));
    assert_eq!(source.property::<Tripled>(), Ok(&Tripled(9)));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn sources_have_independent_caches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&calls);
    let mut a = source(rect(0, 0, 0, 0), &registry);
    let mut b = source(rect(0, 0, 1, 0), &registry);

    assert_eq!(a.property::<Doubled>(), Ok(&Doubled(2)));
    assert_eq!(b.property::<Doubled>(), Ok(&Doubled(4)));
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn cached_lookup_never_computes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&calls);
    let source = source(rect(0, 0, 0, 0), &registry);

    assert_eq!(
        source.cached_property::<Doubled>(),
        Err(PropertyError::NotFound(PropertyId::of::<Doubled>()))
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn duplicate_producer_is_rejected() {
    let mut registry = TaskRegistry::new();
    let task = TaskHandle::source(|_: &mut Source| Ok(()));
    registry
        .register_task_factory([PropertyId::of::<Ping>()], SharedTaskFactory::new(task.clone()))
        .unwrap();

    let err = registry
        .register_task_factory(
            [PropertyId::of::<Pong>(), PropertyId::of::<Ping>()],
            SharedTaskFactory::new(task),
        )
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateProducer(PropertyId::of::<Ping>()));
    // Nothing from the failed registration is kept.
    assert!(!registry.produces(&PropertyId::of::<Pong>()));
}

#[test]
fn missing_producer_is_reported() {
    let registry = Arc::new(TaskRegistry::new());
    let mut source = source(rect(0, 0, 0, 0), &registry);
    assert_eq!(
        source.property::<Ping>(),
        Err(PropertyError::NoProducer(PropertyId::of::<Ping>()))
    );
}

#[test]
fn task_that_does_not_set_its_property_is_not_found() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task_factory(
            [PropertyId::of::<Ping>()],
            SharedTaskFactory::new(TaskHandle::source(|_: &mut Source| Ok(()))),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let mut source = source(rect(0, 0, 0, 0), &registry);

    assert_eq!(
        source.property::<Ping>(),
        Err(PropertyError::NotFound(PropertyId::of::<Ping>()))
    );
}

#[test]
fn dependency_cycle_is_detected() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task_factory(
            [PropertyId::of::<Ping>()],
            SharedTaskFactory::new(TaskHandle::source(|source: &mut Source| {
                source.property::<Pong>()?;
                source.set_property(Ping);
                Ok(())
            })),
        )
        .unwrap();
    registry
        .register_task_factory(
            [PropertyId::of::<Pong>()],
            SharedTaskFactory::new(TaskHandle::source(|source: &mut Source| {
                source.property::<Ping>()?;
                source.set_property(Pong);
                Ok(())
            })),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let mut source = source(rect(0, 0, 0, 0), &registry);

    assert_eq!(
        source.property::<Ping>(),
        Err(PropertyError::Cycle(PropertyId::of::<Ping>()))
    );
    // The failed attempt leaves nothing behind.
    assert!(!source.is_property_set(&PropertyId::of::<Pong>()));
}

#[test]
fn task_failure_carries_message() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task_factory(
            [PropertyId::of::<Ping>()],
            SharedTaskFactory::new(TaskHandle::source(|_: &mut Source| {
                anyhow::bail!("fit diverged")
            })),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let mut source = source(rect(0, 0, 0, 0), &registry);

    match source.property::<Ping>() {
        Err(PropertyError::TaskFailed { id, message }) => {
            assert_eq!(id, PropertyId::of::<Ping>());
            assert_eq!(message, "fit diverged");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn nested_missing_producer_propagates_unchanged() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task_factory(
            [PropertyId::of::<Ping>()],
            SharedTaskFactory::new(TaskHandle::source(|source: &mut Source| {
                source.property::<Pong>()?;
                source.set_property(Ping);
                Ok(())
            })),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let mut source = source(rect(0, 0, 0, 0), &registry);

    assert_eq!(
        source.property::<Ping>(),
        Err(PropertyError::NoProducer(PropertyId::of::<Pong>()))
    );
}

#[test]
fn group_property_requested_from_source_is_wrong_kind() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task_factory(
            [PropertyId::of::<Members>()],
            SharedTaskFactory::new(TaskHandle::group(|group: &mut GroupView<'_>| {
                let count = group.len();
                group.set_property(Members(count));
                Ok(())
            })),
        )
        .unwrap();
    let registry = Arc::new(registry);
    assert!(registry.is_group_property(&PropertyId::of::<Members>()));

    let mut lone = source(rect(0, 0, 0, 0), &registry);
    assert!(matches!(
        lone.property::<Members>(),
        Err(PropertyError::WrongTaskKind { registered: "group", requested: "source", .. })
    ));

    let mut arena = SourceArena::new();
    let mut group = SourceGroup::new(Arc::clone(&registry));
    let mut view = GroupView::new(&mut group, &mut arena);
    view.insert_source(source(rect(0, 0, 0, 0), &registry));
    view.insert_source(source(rect(2, 0, 2, 0), &registry));
    assert_eq!(view.property::<Members>(), Ok(&Members(2)));

    // Membership changes drop group properties; the next request recomputes.
    view.insert_source(source(rect(4, 0, 4, 0), &registry));
    assert!(view.cached_property::<Members>().is_err());
    assert_eq!(view.property::<Members>(), Ok(&Members(3)));
}

#[test]
fn instance_factory_serves_prebuilt_tasks() {
    let factory = InstanceTaskFactory::new((0..2u32).map(|index| {
        let task = TaskHandle::source(move |source: &mut Source| {
            source.set_property_instance(index, Doubled(index as usize));
            Ok(())
        });
        (PropertyId::with_index::<Doubled>(index), task)
    }));

    let ids = factory.property_ids();
    assert_eq!(
        ids,
        vec![
            PropertyId::with_index::<Doubled>(0),
            PropertyId::with_index::<Doubled>(1),
        ]
    );
    // Every request hands out the same task.
    let first = factory.task(&ids[1]);
    let second = factory.task(&ids[1]);
    assert!(matches!(
        (first, second),
        (Some(TaskHandle::Source(a)), Some(TaskHandle::Source(b))) if Arc::ptr_eq(&a, &b)
    ));

    let mut registry = TaskRegistry::new();
    registry.register_task_factory(ids, factory).unwrap();
    let registry = Arc::new(registry);

    let mut a = source(rect(0, 0, 0, 0), &registry);
    let mut b = source(rect(0, 0, 0, 0), &registry);
    assert_eq!(a.property_instance::<Doubled>(1), Ok(&Doubled(1)));
    assert_eq!(b.property_instance::<Doubled>(1), Ok(&Doubled(1)));
    assert_eq!(b.property_instance::<Doubled>(0), Ok(&Doubled(0)));

    // Registered instances only.
    assert_eq!(
        a.property_instance::<Doubled>(2),
        Err(PropertyError::NoProducer(PropertyId::with_index::<Doubled>(2)))
    );
}
