//! Frame driver: segmentation → partition → grouping → deblending →
//! measurement.
//!
//! Stages exchange units through [`Outbox`] queues. The driver scans the
//! frame row by row; after each row it drains the queues stage by stage, so
//! groups lying above the segmentation safe line are deblended and measured
//! while the scan continues. Finished groups are measured in parallel batches
//! of at most `max_concurrent_groups` and handed to the [`OutputSink`] in
//! emission order.

mod measure;
mod outbox;


use std::sync::Arc;

use thiserror::Error;

pub use measure::{MeasuredGroup, MemorySink, OutputSink};
pub use outbox::Outbox;

use crate::config::{ConfigError, PipelineConfig};
use crate::deblend::{DeblendStatus, Deblending};
use crate::grouping::{LineSelectionCriteria, SelectAllCriteria, SourceGrouping};
use crate::image::Frame;
use crate::partition::Partition;
use crate::plugin::{Registries, RegistryError};
use crate::property::PropertyError;
use crate::segmentation::{Segmentation, SegmentationEvent};
use crate::source::{GroupId, GroupView, Source, SourceArena, SourceGroup};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("{stage} failed: {message}")]
    StageFailed { stage: &'static str, message: String },
    #[error("deblending of group {group:?} did not converge after {passes} passes")]
    DeblendNotConverged { group: GroupId, passes: usize },
}

/// Counters for one processed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDiagnostics {
    pub regions_segmented: usize,
    pub sources_rejected: usize,
    pub groups_formed: usize,
    pub deblend_passes: usize,
    pub groups_not_converged: usize,
    pub sources_output: usize,
    pub groups_output: usize,
    /// Per-entity failures; the affected source or group was dropped, except
    /// for [`PipelineError::DeblendNotConverged`], which is reported only.
    pub errors: Vec<PipelineError>,
}

pub struct Pipeline {
    config: PipelineConfig,
    registries: Registries,
    segmentation: Segmentation,
    partition: Partition,
    grouping: SourceGrouping,
    deblending: Deblending,
}

impl Pipeline {
    /// Default stages built from `config`.
    pub fn new(config: PipelineConfig, registries: Registries) -> Result<Self, PipelineError> {
        config.validate()?;
        let partition = Partition::from_config(&config.partition)?;
        let grouping = SourceGrouping::from_config(&config.grouping, Arc::clone(&registries.tasks))?;
        let deblending = Deblending::from_config(&config.deblend)?;
        Self::with_stages(config, registries, partition, grouping, deblending)
    }

    /// Custom partition steps, grouping criteria or deblend steps.
    pub fn with_stages(
        config: PipelineConfig,
        registries: Registries,
        partition: Partition,
        grouping: SourceGrouping,
        deblending: Deblending,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let segmentation = Segmentation::new(&config.segmentation, Arc::clone(&registries.tasks))?;
        Ok(Self {
            config,
            registries,
            segmentation,
            partition,
            grouping,
            deblending,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn process_frame(&mut self, frame: &Frame, sink: &mut dyn OutputSink) -> FrameDiagnostics {
        let mut run = FrameRun {
            partition: &self.partition,
            grouping: &mut self.grouping,
            deblending: &self.deblending,
            registries: &self.registries,
            max_concurrent: self.config.measurement.max_concurrent_groups,
            arena: SourceArena::new(),
            diagnostics: FrameDiagnostics::default(),
            partitioned: Outbox::new(),
            closed: Outbox::new(),
            finished: Vec::new(),
        };

        let mut scan = self.segmentation.scan(frame);
        let mut segmented = Outbox::new();
        loop {
            let more = scan.next_row(&mut segmented);
            for event in segmented.drain() {
                run.handle_segmentation(event);
            }
            run.deblend_closed();
            if run.finished.len() >= run.max_concurrent {
                run.measure(sink);
            }
            if !more {
                break;
            }
        }

        run.grouping
            .process_sources(&SelectAllCriteria, &run.arena, &mut run.closed);
        run.deblend_closed();
        run.measure(sink);

        let diagnostics = run.diagnostics;
        tracing::info!(
            "Frame done: {} regions, {} rejected, {} groups, {} sources output, {} errors",
            diagnostics.regions_segmented,
            diagnostics.sources_rejected,
            diagnostics.groups_formed,
            diagnostics.sources_output,
            diagnostics.errors.len()
        );
        diagnostics
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("partition", &self.partition)
            .field("grouping", &self.grouping)
            .field("deblending", &self.deblending)
            .finish()
    }
}

/// Per-frame state of [`Pipeline::process_frame`].
struct FrameRun<'p> {
    partition: &'p Partition,
    grouping: &'p mut SourceGrouping,
    deblending: &'p Deblending,
    registries: &'p Registries,
    max_concurrent: usize,
    arena: SourceArena,
    diagnostics: FrameDiagnostics,
    partitioned: Outbox<Source>,
    closed: Outbox<SourceGroup>,
    finished: Vec<(SourceGroup, SourceArena)>,
}

impl FrameRun<'_> {
    fn handle_segmentation(&mut self, event: SegmentationEvent) {
        match event {
            SegmentationEvent::Source(source) => {
                self.diagnostics.regions_segmented += 1;
                let report = self.partition.process(source, &mut self.partitioned);
                self.diagnostics.sources_rejected += report.rejected;
                self.diagnostics
                    .errors
                    .extend(report.failures.into_iter().map(|message| PipelineError::StageFailed {
                        stage: "partition",
                        message,
                    }));

                for source in self.partitioned.drain() {
                    let id = source.id();
                    if let Err(err) = self.grouping.add_source(source, &mut self.arena) {
                        tracing::warn!("Dropping source {}: {err}", id.id);
                        self.diagnostics.errors.push(err.into());
                    }
                }
            }
            SegmentationEvent::SafeLine(line) => {
                if self.grouping.criteria().is_vertically_local() {
                    self.grouping.process_sources(
                        &LineSelectionCriteria { line },
                        &self.arena,
                        &mut self.closed,
                    );
                }
            }
        }
    }

    fn deblend_closed(&mut self) {
        while let Some(mut group) = self.closed.pop() {
            self.diagnostics.groups_formed += 1;
            let result = self
                .deblending
                .deblend(&mut GroupView::new(&mut group, &mut self.arena));

            match result {
                Ok(status) => {
                    self.diagnostics.deblend_passes += status.passes();
                    if let DeblendStatus::NotConverged { passes } = status {
                        self.diagnostics.groups_not_converged += 1;
                        self.diagnostics
                            .errors
                            .push(PipelineError::DeblendNotConverged {
                                group: group.id(),
                                passes,
                            });
                    }
                    let members = self.arena.detach(group.members());
                    if !group.is_empty() {
                        self.finished.push((group, members));
                    }
                }
                Err(err) => {
                    tracing::warn!("Dropping group {:?}: {err:#}", group.id());
                    self.diagnostics.errors.push(PipelineError::StageFailed {
                        stage: "deblending",
                        message: format!("{err:#}"),
                    });
                    self.arena.detach(group.members());
                }
            }
        }
    }

    fn measure(&mut self, sink: &mut dyn OutputSink) {
        if self.finished.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.finished);
        let outputs = self.registries.outputs.as_ref();
        let outcomes = common::parallel::par_map_limited(batch, self.max_concurrent, |(group, sources)| {
            measure::measure_group(group, sources, outputs)
        });

        for outcome in outcomes {
            self.diagnostics.errors.extend(outcome.errors);
            if let Some(measured) = outcome.measured {
                self.diagnostics.groups_output += 1;
                self.diagnostics.sources_output += measured.rows.len();
                sink.output_group(measured);
            }
        }
    }
}
