//! Measurement of finished groups and hand-off to the output collaborator.

use crate::deblend::DeblendStatus;
use crate::plugin::{OutputRegistry, Row};
use crate::source::{GroupView, SourceArena, SourceGroup, SourceHandle};

use super::PipelineError;

/// A deblended group with its members detached from the frame arena, plus
/// one output row per measured member in group order.
#[derive(Debug)]
pub struct MeasuredGroup {
    pub group: SourceGroup,
    pub sources: SourceArena,
    pub rows: Vec<Row>,
}

impl MeasuredGroup {
    pub fn view(&mut self) -> GroupView<'_> {
        GroupView::new(&mut self.group, &mut self.sources)
    }
}

/// Receives finished groups, in frame order.
pub trait OutputSink {
    fn output_group(&mut self, group: MeasuredGroup);
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub groups: Vec<MeasuredGroup>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.groups.iter().flat_map(|group| group.rows.iter())
    }

    pub fn source_count(&self) -> usize {
        self.groups.iter().map(|group| group.group.len()).sum()
    }
}

impl OutputSink for MemorySink {
    fn output_group(&mut self, group: MeasuredGroup) {
        self.groups.push(group);
    }
}

pub(crate) struct MeasureOutcome {
    pub measured: Option<MeasuredGroup>,
    pub errors: Vec<PipelineError>,
}

/// Compute every property the enabled columns read and convert the members
/// into rows. Members whose properties fail are dropped from the group; a
/// group left empty is discarded.
///
/// Source-level properties are settled first. Group-level properties depend
/// on the whole membership, so every drop at that stage recomputes them for
/// the remaining members. The group's [`DeblendStatus`] outlives the drops.
pub(crate) fn measure_group(
    mut group: SourceGroup,
    mut sources: SourceArena,
    outputs: &OutputRegistry,
) -> MeasureOutcome {
    let required = outputs.required_properties();
    let registry = std::sync::Arc::clone(group.registry());
    let (group_scoped, source_scoped): (Vec<_>, Vec<_>) = required
        .into_iter()
        .partition(|id| registry.is_group_property(id));

    let mut errors = Vec::new();
    let mut view = GroupView::new(&mut group, &mut sources);
    let status = view.cached_property::<DeblendStatus>().ok().copied();

    let failed: Vec<SourceHandle> = view
        .members()
        .to_vec()
        .into_iter()
        .filter(|&handle| {
            match source_scoped.iter().try_for_each(|id| view.ensure_member(handle, *id)) {
                Ok(()) => false,
                Err(err) => {
                    tracing::warn!("Dropping source {handle:?}: {err}");
                    errors.push(PipelineError::Property(err));
                    true
                }
            }
        })
        .collect();
    drop_members(&mut view, &failed, status);

    let rows = loop {
        if view.is_empty() {
            return MeasureOutcome {
                measured: None,
                errors,
            };
        }

        let mut rows = Vec::with_capacity(view.len());
        let mut failed = Vec::new();
        for handle in view.members().to_vec() {
            let row = group_scoped
                .iter()
                .try_for_each(|id| view.ensure_member(handle, *id))
                .and_then(|()| match view.source_mut(handle) {
                    Some(source) => outputs.source_to_row(source),
                    None => Ok(Row::default()),
                });
            match row {
                Ok(row) => rows.push(row),
                Err(err) => {
                    tracing::warn!("Dropping source {handle:?}: {err}");
                    errors.push(PipelineError::Property(err));
                    failed.push(handle);
                }
            }
        }

        if failed.is_empty() {
            break rows;
        }
        drop_members(&mut view, &failed, status);
    };

    MeasureOutcome {
        measured: Some(MeasuredGroup {
            group,
            sources,
            rows,
        }),
        errors,
    }
}

/// Remove `handles` from the group, keeping the deblend outcome that the
/// membership edit would otherwise clear.
fn drop_members(view: &mut GroupView<'_>, handles: &[SourceHandle], status: Option<DeblendStatus>) {
    if handles.is_empty() {
        return;
    }
    for &handle in handles {
        view.remove_source(handle);
    }
    if let Some(status) = status {
        view.set_property(status);
    }
}
