//! Deblending stage: iterative re-separation of closed groups.
//!
//! Steps run in order on a [`GroupView`], each free to compute properties of
//! the group or its members and to replace members by children covering the
//! same pixels. In [`DeblendMode::FixedPoint`] the whole step list repeats
//! until a pass leaves the group unmodified or `max_iterations` passes ran.

mod peak_split;

#[cfg(test)]
mod tests;

pub use peak_split::{PeakSplitDeblendStep, MAX_PEAKS};

use crate::config::{ConfigError, DeblendConfig, DeblendMode};
use crate::property::Property;
use crate::source::GroupView;

pub trait DeblendStep: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `true` when the group was modified.
    fn deblend(&self, group: &mut GroupView<'_>) -> anyhow::Result<bool>;
}

/// Drops members smaller than `min_area`.
#[derive(Debug, Clone)]
pub struct MinAreaDeblendStep {
    min_area: usize,
}

impl MinAreaDeblendStep {
    pub fn new(min_area: usize) -> Result<Self, ConfigError> {
        DeblendConfig {
            min_area,
            ..Default::default()
        }
        .validate()?;
        Ok(Self { min_area })
    }
}

impl DeblendStep for MinAreaDeblendStep {
    fn name(&self) -> &str {
        "min_area"
    }

    fn deblend(&self, group: &mut GroupView<'_>) -> anyhow::Result<bool> {
        let small: Vec<_> = group
            .sources()
            .filter(|(_, source)| source.area() < self.min_area)
            .map(|(handle, _)| handle)
            .collect();
        for &handle in &small {
            group.remove_source(handle);
        }
        Ok(!small.is_empty())
    }
}

/// How the last deblend of a group ended; stored as a group property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeblendStatus {
    Converged { passes: usize },
    NotConverged { passes: usize },
}

impl DeblendStatus {
    pub fn passes(&self) -> usize {
        match self {
            DeblendStatus::Converged { passes } | DeblendStatus::NotConverged { passes } => *passes,
        }
    }

    pub fn converged(&self) -> bool {
        matches!(self, DeblendStatus::Converged { .. })
    }
}

impl Property for DeblendStatus {}

pub struct Deblending {
    steps: Vec<Box<dyn DeblendStep>>,
    mode: DeblendMode,
    max_iterations: usize,
}

impl Deblending {
    pub fn new(config: &DeblendConfig, steps: Vec<Box<dyn DeblendStep>>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            steps,
            mode: config.mode,
            max_iterations: config.max_iterations,
        })
    }

    /// Peak splitting followed by the minimum area cut.
    pub fn from_config(config: &DeblendConfig) -> Result<Self, ConfigError> {
        let steps: Vec<Box<dyn DeblendStep>> = vec![
            Box::new(PeakSplitDeblendStep::new(config.min_separation, config.min_prominence)?),
            Box::new(MinAreaDeblendStep::new(config.min_area)?),
        ];
        Self::new(config, steps)
    }

    pub fn mode(&self) -> DeblendMode {
        self.mode
    }

    /// Run the steps on `group` and record the outcome as [`DeblendStatus`].
    /// A failing step aborts the group.
    pub fn deblend(&self, group: &mut GroupView<'_>) -> anyhow::Result<DeblendStatus> {
        let status = match self.mode {
            DeblendMode::SinglePass => {
                self.run_pass(group)?;
                DeblendStatus::Converged { passes: 1 }
            }
            DeblendMode::FixedPoint => self.run_to_fixed_point(group)?,
        };

        if let DeblendStatus::NotConverged { passes } = status {
            tracing::warn!(
                "Deblending of group {:?} did not converge after {passes} passes",
                group.group().id()
            );
        }
        group.set_property(status);
        Ok(status)
    }

    fn run_to_fixed_point(&self, group: &mut GroupView<'_>) -> anyhow::Result<DeblendStatus> {
        for pass in 1..=self.max_iterations {
            if !self.run_pass(group)? {
                return Ok(DeblendStatus::Converged { passes: pass });
            }
        }
        Ok(DeblendStatus::NotConverged {
            passes: self.max_iterations,
        })
    }

    fn run_pass(&self, group: &mut GroupView<'_>) -> anyhow::Result<bool> {
        let mut modified = false;
        for step in &self.steps {
            if group.is_empty() {
                break;
            }
            let changed = step
                .deblend(group)
                .map_err(|err| err.context(format!("deblend step '{}'", step.name())))?;
            modified |= changed;
        }
        Ok(modified)
    }
}

impl std::fmt::Debug for Deblending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deblending")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("mode", &self.mode)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
