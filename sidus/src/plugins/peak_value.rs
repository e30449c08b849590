use crate::math::PixelCoordinate;
use crate::plugin::{Plugin, PluginRegistrar};
use crate::property::{Property, PropertyId};
use crate::source::Source;
use crate::task::{SharedTaskFactory, TaskHandle};

/// Extreme detection values inside the footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakValue {
    pub max: f32,
    pub min: f32,
    pub peak: PixelCoordinate,
}

impl Property for PeakValue {}

fn compute(source: &mut Source) -> anyhow::Result<()> {
    let frame = source.detection_frame()?.clone();
    let mut peak = None;
    let mut min = f32::INFINITY;
    for &pixel in source.pixels() {
        let value = frame.value(pixel.x, pixel.y);
        min = min.min(value);
        match peak {
            Some((best, _)) if value <= best => {}
            _ => peak = Some((value, pixel)),
        }
    }

    let (max, peak) =
        peak.ok_or_else(|| anyhow::anyhow!("source {} has an empty footprint", source.id().id))?;
    source.set_property(PeakValue { max, min, peak });
    Ok(())
}

#[derive(Debug, Default)]
pub struct PeakValuePlugin;

impl Plugin for PeakValuePlugin {
    fn id(&self) -> &str {
        "peak_value"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        registrar.register_task_factory(
            [PropertyId::of::<PeakValue>()],
            SharedTaskFactory::new(TaskHandle::source(compute)),
        )?;
        registrar.register_column_converter("peak_value", |p: &PeakValue| p.max.into())?;
        registrar.register_column_converter("peak_x", |p: &PeakValue| p.peak.x.into())?;
        registrar.register_column_converter("peak_y", |p: &PeakValue| p.peak.y.into())?;
        Ok(())
    }
}
