use crate::plugin::{Plugin, PluginRegistrar};
use crate::property::{Property, PropertyId};
use crate::source::Source;
use crate::task::{SharedTaskFactory, TaskHandle};

/// Flux-weighted centroid of the footprint, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCentroid {
    pub x: f64,
    pub y: f64,
}

impl Property for PixelCentroid {}

/// Sum of detection values over the footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsophotalFlux {
    pub flux: f64,
}

impl Property for IsophotalFlux {}

/// One pass over the footprint yields both the centroid and the flux.
/// Footprints with no positive flux fall back to the geometric center.
fn compute(source: &mut Source) -> anyhow::Result<()> {
    let frame = source.detection_frame()?.clone();
    anyhow::ensure!(
        !source.pixels().is_empty(),
        "source {} has an empty footprint",
        source.id().id
    );

    let mut flux = 0.0f64;
    let mut weight_sum = 0.0f64;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut geometric_x = 0.0f64;
    let mut geometric_y = 0.0f64;

    for pixel in source.pixels() {
        let value = frame.value(pixel.x, pixel.y) as f64;
        flux += value;
        geometric_x += pixel.x as f64;
        geometric_y += pixel.y as f64;
        if value > 0.0 {
            weight_sum += value;
            sum_x += value * pixel.x as f64;
            sum_y += value * pixel.y as f64;
        }
    }

    let centroid = if weight_sum > 0.0 {
        PixelCentroid {
            x: sum_x / weight_sum,
            y: sum_y / weight_sum,
        }
    } else {
        let n = source.area() as f64;
        PixelCentroid {
            x: geometric_x / n,
            y: geometric_y / n,
        }
    };

    source.set_property(centroid);
    source.set_property(IsophotalFlux { flux });
    Ok(())
}

#[derive(Debug, Default)]
pub struct CentroidPlugin;

impl Plugin for CentroidPlugin {
    fn id(&self) -> &str {
        "pixel_centroid"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        registrar.register_task_factory(
            [PropertyId::of::<PixelCentroid>(), PropertyId::of::<IsophotalFlux>()],
            SharedTaskFactory::new(TaskHandle::source(compute)),
        )?;
        registrar.register_column_converter("pixel_centroid_x", |p: &PixelCentroid| p.x.into())?;
        registrar.register_column_converter("pixel_centroid_y", |p: &PixelCentroid| p.y.into())?;
        registrar.register_column_converter("isophotal_flux", |p: &IsophotalFlux| p.flux.into())?;
        Ok(())
    }
}
