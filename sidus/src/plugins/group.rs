use common::Buffer2;

use crate::math::Aabb;
use crate::plugin::{Plugin, PluginRegistrar};
use crate::property::{Property, PropertyId};
use crate::source::GroupView;
use crate::task::{SharedTaskFactory, TaskHandle};

use super::pixel_boundaries::PixelBoundaries;

/// Detection cutout covering the union of the members' bounding boxes.
#[derive(Debug, Clone)]
pub struct GroupStamp {
    pub bbox: Aabb,
    pub stamp: Buffer2<f32>,
}

impl Property for GroupStamp {}

/// Group id and size, stored on every member while membership is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupInfo {
    pub group_id: u64,
    pub group_size: usize,
}

impl Property for GroupInfo {}

fn compute_stamp(group: &mut GroupView<'_>) -> anyhow::Result<()> {
    let handles = group.members().to_vec();
    let first = *handles
        .first()
        .ok_or_else(|| anyhow::anyhow!("group {} has no members", group.group().id().value()))?;

    let mut bbox = Aabb::empty();
    for &handle in &handles {
        bbox = bbox.union(&group.member_property::<PixelBoundaries>(handle)?.bbox);
    }

    let frame = group
        .source(first)
        .ok_or_else(|| anyhow::anyhow!("group member {first:?} is missing"))?
        .detection_frame()?
        .clone();
    let stamp = Buffer2::from_fn(bbox.width(), bbox.height(), |x, y| {
        frame.value(bbox.x_min + x, bbox.y_min + y)
    });

    group.set_property(GroupStamp { bbox, stamp });
    Ok(())
}

fn compute_info(group: &mut GroupView<'_>) -> anyhow::Result<()> {
    let info = GroupInfo {
        group_id: group.group().id().value(),
        group_size: group.len(),
    };
    for handle in group.members().to_vec() {
        group.set_member_property(handle, 0, info);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct GroupPlugin;

impl Plugin for GroupPlugin {
    fn id(&self) -> &str {
        "group"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        registrar.register_task_factory(
            [PropertyId::of::<GroupStamp>()],
            SharedTaskFactory::new(TaskHandle::group(compute_stamp)),
        )?;
        registrar.register_task_factory(
            [PropertyId::of::<GroupInfo>()],
            SharedTaskFactory::new(TaskHandle::group(compute_info)),
        )?;
        registrar.register_column_converter("group_id", |p: &GroupInfo| p.group_id.into())?;
        registrar.register_column_converter("group_size", |p: &GroupInfo| p.group_size.into())?;
        Ok(())
    }
}
