use crate::math::Aabb;
use crate::plugin::{Plugin, PluginRegistrar};
use crate::property::{Property, PropertyId};
use crate::source::Source;
use crate::task::{SharedTaskFactory, TaskHandle};

/// Inclusive pixel bounding box of a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBoundaries {
    pub bbox: Aabb,
}

impl Property for PixelBoundaries {}

/// Number of pixels in a footprint; computed in the same pass as
/// [`PixelBoundaries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelArea(pub usize);

impl Property for PixelArea {}

fn compute(source: &mut Source) -> anyhow::Result<()> {
    let bbox = source
        .pixels()
        .bounding_box()
        .ok_or_else(|| anyhow::anyhow!("source {} has an empty footprint", source.id().id))?;
    let area = source.area();
    source.set_property(PixelBoundaries { bbox });
    source.set_property(PixelArea(area));
    Ok(())
}

#[derive(Debug, Default)]
pub struct PixelBoundariesPlugin;

impl Plugin for PixelBoundariesPlugin {
    fn id(&self) -> &str {
        "pixel_boundaries"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        registrar.register_task_factory(
            [PropertyId::of::<PixelBoundaries>(), PropertyId::of::<PixelArea>()],
            SharedTaskFactory::new(TaskHandle::source(compute)),
        )?;

        registrar.register_column_converter("pixel_x_min", |p: &PixelBoundaries| p.bbox.x_min.into())?;
        registrar.register_column_converter("pixel_x_max", |p: &PixelBoundaries| p.bbox.x_max.into())?;
        registrar.register_column_converter("pixel_y_min", |p: &PixelBoundaries| p.bbox.y_min.into())?;
        registrar.register_column_converter("pixel_y_max", |p: &PixelBoundaries| p.bbox.y_max.into())?;
        registrar.register_column_converter("pixel_area", |p: &PixelArea| p.0.into())?;
        Ok(())
    }
}
