//! Source extraction: segmentation, partition, grouping and deblending of
//! astronomical images, with plugin-provided measurements computed on demand.
//!
//! Properties of sources and groups are produced lazily by tasks that plugins
//! register once at startup ([`plugin::PluginManager`]). The [`pipeline`]
//! module drives one frame at a time through the stages and hands measured
//! groups to an [`pipeline::OutputSink`].

pub mod config;
pub mod deblend;
pub mod grouping;
pub mod image;
pub mod math;
pub mod partition;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod property;
pub mod segmentation;
pub mod source;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, PipelineConfig};
pub use image::{DetectionFrame, Frame, Image, Threshold};
pub use pipeline::{FrameDiagnostics, MemorySink, OutputSink, Pipeline, PipelineError};
pub use plugin::{Plugin, PluginManager, Registries, RegistryError};
pub use property::{Property, PropertyError, PropertyHolder, PropertyId};
pub use source::{Source, SourceGroup, SourceId};
