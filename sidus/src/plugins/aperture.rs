use std::sync::Arc;

use crate::plugin::{Plugin, PluginRegistrar};
use crate::property::{Property, PropertyId};
use crate::source::Source;
use crate::task::{InstanceTaskFactory, SourceTask, TaskHandle};

use super::centroid::PixelCentroid;

/// Flux inside a circular aperture centered on the [`PixelCentroid`].
///
/// One instance per configured radius; instance `i` uses radius `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AperturePhotometry {
    pub radius: f32,
    pub flux: f64,
    /// Pixels whose centers fall inside the aperture and the image.
    pub pixel_count: usize,
}

impl Property for AperturePhotometry {}

struct ApertureTask {
    index: u32,
    radius: f32,
}

impl SourceTask for ApertureTask {
    fn compute_properties(&self, source: &mut Source) -> anyhow::Result<()> {
        let centroid = *source.property::<PixelCentroid>()?;
        let frame = source.detection_frame()?.clone();
        let image = frame.image();

        let radius = self.radius as f64;
        let radius_sq = radius * radius;
        let x_lo = (centroid.x - radius).floor().max(0.0) as usize;
        let y_lo = (centroid.y - radius).floor().max(0.0) as usize;
        let x_hi = ((centroid.x + radius).ceil().max(0.0) as usize).min(image.width().saturating_sub(1));
        let y_hi = ((centroid.y + radius).ceil().max(0.0) as usize).min(image.height().saturating_sub(1));

        let mut flux = 0.0f64;
        let mut pixel_count = 0usize;
        if image.width() > 0 && image.height() > 0 {
            for y in y_lo..=y_hi {
                let dy = y as f64 - centroid.y;
                for x in x_lo..=x_hi {
                    let dx = x as f64 - centroid.x;
                    if dx * dx + dy * dy <= radius_sq {
                        flux += image.value(x, y) as f64;
                        pixel_count += 1;
                    }
                }
            }
        }

        source.set_property_instance(
            self.index,
            AperturePhotometry {
                radius: self.radius,
                flux,
                pixel_count,
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AperturePlugin {
    radii: Vec<f32>,
}

impl AperturePlugin {
    pub fn new(radii: Vec<f32>) -> Self {
        Self { radii }
    }
}

impl Plugin for AperturePlugin {
    fn id(&self) -> &str {
        "aperture_photometry"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        if self.radii.is_empty() {
            return Ok(());
        }

        let factory = InstanceTaskFactory::new(self.radii.iter().enumerate().map(|(i, &radius)| {
            let index = i as u32;
            let task = TaskHandle::Source(Arc::new(ApertureTask { index, radius }));
            (PropertyId::with_index::<AperturePhotometry>(index), task)
        }));
        registrar.register_task_factory(factory.property_ids(), factory)?;

        registrar.register_column_converter("aperture_flux", |p: &AperturePhotometry| {
            p.flux.into()
        })?;
        registrar.register_column_converter("aperture_pixels", |p: &AperturePhotometry| {
            p.pixel_count.into()
        })?;

        let postfixes: Vec<String> = (0..self.radii.len()).map(|i| i.to_string()).collect();
        let instances: Vec<(&str, u32)> = postfixes
            .iter()
            .enumerate()
            .map(|(i, postfix)| (postfix.as_str(), i as u32))
            .collect();
        registrar.register_property_instances::<AperturePhotometry>(&instances)?;
        Ok(())
    }
}
