use crate::plugin::{Plugin, PluginRegistrar};
use crate::property::{Property, PropertyId};
use crate::source::Source;
use crate::task::{SharedTaskFactory, TaskHandle};

use super::centroid::PixelCentroid;

/// Ellipse parameters from flux-weighted second moments around the centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParameters {
    /// Semi-major axis (RMS along the major direction), pixels.
    pub a: f64,
    /// Semi-minor axis, pixels.
    pub b: f64,
    /// Position angle of the major axis, radians counter-clockwise from +x.
    pub theta: f64,
    /// `a / b`, 1 for a round source.
    pub elongation: f64,
}

impl Property for ShapeParameters {}

/// Variance of a uniform unit pixel; floor for both axes so single-row or
/// single-column footprints get a finite elongation.
const MIN_VARIANCE: f64 = 1.0 / 12.0;

fn compute(source: &mut Source) -> anyhow::Result<()> {
    let centroid = *source.property::<PixelCentroid>()?;
    let frame = source.detection_frame()?.clone();

    let mut weight_sum = 0.0f64;
    let mut xx = 0.0f64;
    let mut yy = 0.0f64;
    let mut xy = 0.0f64;
    for pixel in source.pixels() {
        let value = frame.value(pixel.x, pixel.y) as f64;
        let weight = if value > 0.0 { value } else { 0.0 };
        let dx = pixel.x as f64 - centroid.x;
        let dy = pixel.y as f64 - centroid.y;
        weight_sum += weight;
        xx += weight * dx * dx;
        yy += weight * dy * dy;
        xy += weight * dx * dy;
    }

    // Unit weights when the footprint has no positive flux.
    if weight_sum <= 0.0 {
        xx = 0.0;
        yy = 0.0;
        xy = 0.0;
        for pixel in source.pixels() {
            let dx = pixel.x as f64 - centroid.x;
            let dy = pixel.y as f64 - centroid.y;
            xx += dx * dx;
            yy += dy * dy;
            xy += dx * dy;
        }
        weight_sum = source.area() as f64;
    }

    let (xx, yy, xy) = (xx / weight_sum, yy / weight_sum, xy / weight_sum);
    let half_trace = (xx + yy) / 2.0;
    let root = (((xx - yy) / 2.0).powi(2) + xy * xy).sqrt();
    let a = (half_trace + root).max(MIN_VARIANCE).sqrt();
    let b = (half_trace - root).max(MIN_VARIANCE).sqrt();
    let theta = 0.5 * (2.0 * xy).atan2(xx - yy);

    source.set_property(ShapeParameters {
        a,
        b,
        theta,
        elongation: a / b,
    });
    Ok(())
}

#[derive(Debug, Default)]
pub struct ShapePlugin;

impl Plugin for ShapePlugin {
    fn id(&self) -> &str {
        "shape_parameters"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        registrar.register_task_factory(
            [PropertyId::of::<ShapeParameters>()],
            SharedTaskFactory::new(TaskHandle::source(compute)),
        )?;
        registrar.register_column_converter("shape_a", |p: &ShapeParameters| p.a.into())?;
        registrar.register_column_converter("shape_b", |p: &ShapeParameters| p.b.into())?;
        registrar.register_column_converter("shape_theta", |p: &ShapeParameters| p.theta.into())?;
        registrar.register_column_converter("elongation", |p: &ShapeParameters| {
            p.elongation.into()
        })?;
        Ok(())
    }
}
