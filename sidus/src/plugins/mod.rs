//! Built-in measurement plugins.
//!
//! Each plugin registers the task producing its properties plus the output
//! columns reading them. [`register_builtin_plugins`] adds all of them to a
//! [`PluginManager`]; third-party plugins are added the same way.

mod aperture;
mod centroid;
mod group;
mod peak_value;
mod pixel_boundaries;
mod shape;


pub use aperture::{AperturePhotometry, AperturePlugin};
pub use centroid::{CentroidPlugin, IsophotalFlux, PixelCentroid};
pub use group::{GroupInfo, GroupPlugin, GroupStamp};
pub use peak_value::{PeakValue, PeakValuePlugin};
pub use pixel_boundaries::{PixelArea, PixelBoundaries, PixelBoundariesPlugin};
pub use shape::{ShapeParameters, ShapePlugin};

use crate::config::MeasurementConfig;
use crate::plugin::{Plugin, PluginManager, PluginRegistrar};
use crate::source::SourceId;

/// Output columns for the identity every source carries from birth.
#[derive(Debug, Default)]
pub struct SourceIdPlugin;

impl Plugin for SourceIdPlugin {
    fn id(&self) -> &str {
        "source_id"
    }

    fn register(&self, registrar: &mut PluginRegistrar) -> anyhow::Result<()> {
        registrar.register_column_converter("source_id", |p: &SourceId| p.id.into())?;
        registrar.register_column_converter("detection_id", |p: &SourceId| p.detection_id.into())?;
        Ok(())
    }
}

pub fn register_builtin_plugins(manager: &mut PluginManager, config: &MeasurementConfig) {
    manager
        .add_plugin(SourceIdPlugin)
        .add_plugin(PixelBoundariesPlugin)
        .add_plugin(PeakValuePlugin)
        .add_plugin(CentroidPlugin)
        .add_plugin(ShapePlugin)
        .add_plugin(AperturePlugin::new(config.aperture_radii.clone()))
        .add_plugin(GroupPlugin);
}
