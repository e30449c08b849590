//! Partition stage: per-source filtering and splitting before grouping.
//!
//! Steps run in configured order. Each step is applied to every output of
//! the previous step; a source rejected by a step never reaches later steps.

mod multi_threshold;


pub use multi_threshold::MultiThresholdPartitionStep;

use crate::config::{ConfigError, PartitionConfig};
use crate::pipeline::Outbox;
use crate::source::Source;

/// Consumes one source and returns zero (reject), one (pass) or many (split)
/// sources.
pub trait PartitionStep: Send + Sync {
    fn name(&self) -> &str;
    fn partition(&self, source: Source) -> anyhow::Result<Vec<Source>>;
}

/// Rejects sources with fewer than `min_area` pixels.
#[derive(Debug, Clone)]
pub struct MinAreaPartitionStep {
    min_area: usize,
}

impl MinAreaPartitionStep {
    pub fn new(min_area: usize) -> Result<Self, ConfigError> {
        PartitionConfig {
            min_area,
            ..Default::default()
        }
        .validate()?;
        Ok(Self { min_area })
    }

    pub fn min_area(&self) -> usize {
        self.min_area
    }
}

impl PartitionStep for MinAreaPartitionStep {
    fn name(&self) -> &str {
        "min_area"
    }

    fn partition(&self, source: Source) -> anyhow::Result<Vec<Source>> {
        if source.area() < self.min_area {
            Ok(Vec::new())
        } else {
            Ok(vec![source])
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub emitted: usize,
    pub rejected: usize,
    /// One message per source dropped because a step failed on it.
    pub failures: Vec<String>,
}

#[derive(Default)]
pub struct Partition {
    steps: Vec<Box<dyn PartitionStep>>,
}

impl Partition {
    pub fn new(steps: Vec<Box<dyn PartitionStep>>) -> Self {
        Self { steps }
    }

    /// Multi-threshold splitting when enabled, then the minimum area cut.
    pub fn from_config(config: &PartitionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut steps: Vec<Box<dyn PartitionStep>> = Vec::new();
        if config.multi_threshold {
            steps.push(Box::new(MultiThresholdPartitionStep::from_config(config)?));
        }
        steps.push(Box::new(MinAreaPartitionStep::new(config.min_area)?));
        Ok(Self::new(steps))
    }

    pub fn add_step<S: PartitionStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn process(&self, source: Source, outbox: &mut Outbox<Source>) -> PartitionReport {
        let mut report = PartitionReport::default();
        let mut current = vec![source];

        for step in &self.steps {
            let mut next = Vec::with_capacity(current.len());
            for source in current {
                let id = source.id();
                match step.partition(source) {
                    Ok(outputs) if outputs.is_empty() => report.rejected += 1,
                    Ok(outputs) => next.extend(outputs),
                    Err(err) => {
                        let message = format!("step '{}' failed on source {}: {err:#}", step.name(), id.id);
                        tracing::warn!("Partition {message}");
                        report.failures.push(message);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        report.emitted = current.len();
        for source in current {
            outbox.push(source);
        }
        report
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|step| step.name()))
            .finish()
    }
}
