//! Stage configuration.
//!
//! Plain serde structs with defaults, one per stage, collected in
//! [`PipelineConfig`]. Stage constructors validate the part they consume, so
//! out-of-range values fail before any frame is processed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Pixel connectivity for connected component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Only horizontal and vertical neighbors.
    Four,
    /// Diagonal neighbors too.
    #[default]
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupingAlgorithm {
    /// Sources whose pixel bounding boxes overlap end in one group.
    #[default]
    Overlap,
    /// Sources split from the same detection end in one group.
    SplitSources,
    /// Every source is its own group.
    NoGrouping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeblendMode {
    /// Every step runs exactly once.
    #[default]
    SinglePass,
    /// Steps repeat until none modifies the group, up to `max_iterations`.
    FixedPoint,
}

// ============================================================================
// Stage configs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub connectivity: Connectivity,
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Sources with fewer pixels are rejected.
    pub min_area: usize,
    /// Split sources at the junctions of a threshold tree before the area cut.
    pub multi_threshold: bool,
    /// Number of levels of the threshold tree.
    pub threshold_count: usize,
    /// Branches with fewer pixels are ignored while building the tree.
    pub min_branch_area: usize,
    /// Fraction of the parent's flux above the tree root a branch must carry
    /// to become a source.
    pub min_contrast: f32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            min_area: 3,
            multi_threshold: false,
            threshold_count: 32,
            min_branch_area: 3,
            min_contrast: 0.005,
        }
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_area == 0 {
            return Err(invalid("partition.min_area", "must be at least 1"));
        }
        if self.threshold_count == 0 {
            return Err(invalid("partition.threshold_count", "must be at least 1"));
        }
        if self.min_branch_area == 0 {
            return Err(invalid("partition.min_branch_area", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_contrast) {
            return Err(invalid(
                "partition.min_contrast",
                format!("must lie in [0, 1], got {}", self.min_contrast),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub algorithm: GroupingAlgorithm,
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeblendConfig {
    pub mode: DeblendMode,
    /// Upper bound on passes in [`DeblendMode::FixedPoint`].
    pub max_iterations: usize,
    /// Peak splitting: minimum distance between accepted peaks, in pixels.
    pub min_separation: usize,
    /// Peak splitting: minimum peak height above the footprint minimum, as a
    /// fraction of the primary peak height above it.
    pub min_prominence: f32,
    /// Members below this area are dropped after splitting.
    pub min_area: usize,
}

impl Default for DeblendConfig {
    fn default() -> Self {
        Self {
            mode: DeblendMode::SinglePass,
            max_iterations: 16,
            min_separation: 3,
            min_prominence: 0.3,
            min_area: 3,
        }
    }
}

impl DeblendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(invalid("deblend.max_iterations", "must be at least 1"));
        }
        if self.min_separation == 0 {
            return Err(invalid("deblend.min_separation", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_prominence) {
            return Err(invalid(
                "deblend.min_prominence",
                format!("must be in [0, 1], got {}", self.min_prominence),
            ));
        }
        if self.min_area == 0 {
            return Err(invalid("deblend.min_area", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Upper bound on groups measured concurrently.
    pub max_concurrent_groups: usize,
    /// One aperture photometry instance per radius, in pixels.
    pub aperture_radii: Vec<f32>,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            max_concurrent_groups: 64,
            aperture_radii: vec![3.0, 5.0],
        }
    }
}

impl MeasurementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_groups == 0 {
            return Err(invalid(
                "measurement.max_concurrent_groups",
                "must be at least 1",
            ));
        }
        if let Some(radius) = self
            .aperture_radii
            .iter()
            .find(|radius| !radius.is_finite() || **radius <= 0.0)
        {
            return Err(invalid(
                "measurement.aperture_radii",
                format!("radii must be positive, got {radius}"),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Pipeline config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmentation: SegmentationConfig,
    pub partition: PartitionConfig,
    pub grouping: GroupingConfig,
    pub deblend: DeblendConfig,
    pub measurement: MeasurementConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segmentation.validate()?;
        self.partition.validate()?;
        self.grouping.validate()?;
        self.deblend.validate()?;
        self.measurement.validate()
    }
}
