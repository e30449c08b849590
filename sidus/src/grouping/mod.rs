//! Grouping stage: merges related sources into groups.
//!
//! Every incoming source is compared against the members of all open groups.
//! A source matching no group opens a new one; a source matching several
//! groups joins the oldest and merges the others into it. The result is the
//! connected components of the pairwise criteria, so for a symmetric criteria
//! the final partition does not depend on arrival order, even when the
//! criteria is not transitive.
//!
//! Open groups are closed by [`ProcessSources`] events: a group whose members
//! are all selected is emitted, in group creation order.

mod criteria;
mod selection;


use std::sync::Arc;

pub use criteria::{
    GroupingCriteria, NoGroupingCriteria, OverlappingBoundariesCriteria, SplitSourcesCriteria,
};
pub use selection::{LineSelectionCriteria, ProcessSources, SelectAllCriteria, SelectionCriteria};

use crate::config::{ConfigError, GroupingAlgorithm, GroupingConfig};
use crate::pipeline::Outbox;
use crate::property::PropertyResult;
use crate::source::{GroupView, Source, SourceArena, SourceGroup, SourceHandle};
use crate::task::TaskRegistry;

#[derive(Debug)]
pub enum GroupingEvent {
    Source(Source),
    ProcessSources(ProcessSources),
}

pub struct SourceGrouping {
    criteria: Box<dyn GroupingCriteria>,
    registry: Arc<TaskRegistry>,
    open: Vec<SourceGroup>,
}

impl SourceGrouping {
    pub fn new(criteria: Box<dyn GroupingCriteria>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            criteria,
            registry,
            open: Vec::new(),
        }
    }

    pub fn from_config(config: &GroupingConfig, registry: Arc<TaskRegistry>) -> Result<Self, ConfigError> {
        config.validate()?;
        let criteria: Box<dyn GroupingCriteria> = match config.algorithm {
            GroupingAlgorithm::Overlap => Box::new(OverlappingBoundariesCriteria),
            GroupingAlgorithm::SplitSources => Box::new(SplitSourcesCriteria),
            GroupingAlgorithm::NoGrouping => Box::new(NoGroupingCriteria),
        };
        Ok(Self::new(criteria, registry))
    }

    pub fn criteria(&self) -> &dyn GroupingCriteria {
        self.criteria.as_ref()
    }

    pub fn open_groups(&self) -> usize {
        self.open.len()
    }

    pub fn handle(
        &mut self,
        event: GroupingEvent,
        arena: &mut SourceArena,
        outbox: &mut Outbox<SourceGroup>,
    ) -> PropertyResult<()> {
        match event {
            GroupingEvent::Source(source) => self.add_source(source, arena).map(|_| ()),
            GroupingEvent::ProcessSources(event) => {
                self.process_sources(event.selection.as_ref(), arena, outbox);
                Ok(())
            }
        }
    }

    /// Move `source` into the arena and into a group. If the criteria cannot
    /// prepare the source it is dropped and the error returned.
    pub fn add_source(
        &mut self,
        mut source: Source,
        arena: &mut SourceArena,
    ) -> PropertyResult<SourceHandle> {
        self.criteria.prepare(&mut source)?;
        let handle = arena.insert(source);

        let matched: Vec<usize> = match arena.get(handle) {
            Some(incoming) => self
                .open
                .iter()
                .enumerate()
                .filter(|(_, group)| {
                    group.members().iter().any(|&member| {
                        arena
                            .get(member)
                            .is_some_and(|member| self.criteria.should_group(member, incoming))
                    })
                })
                .map(|(index, _)| index)
                .collect(),
            None => Vec::new(),
        };

        let Some((&first, rest)) = matched.split_first() else {
            let mut group = SourceGroup::new(Arc::clone(&self.registry));
            GroupView::new(&mut group, arena).add_source(handle);
            self.open.push(group);
            return Ok(handle);
        };

        // Remove from the back so earlier indices stay valid.
        let mut absorbed: Vec<SourceGroup> =
            rest.iter().rev().map(|&index| self.open.remove(index)).collect();
        absorbed.reverse();

        let mut view = GroupView::new(&mut self.open[first], arena);
        view.add_source(handle);
        for group in absorbed {
            tracing::debug!(
                "Source bridges groups {:?} and {:?}",
                view.group().id(),
                group.id()
            );
            view.merge(group);
        }
        Ok(handle)
    }

    /// Emit every open group whose members are all selected. Returns the
    /// number of groups emitted.
    pub fn process_sources(
        &mut self,
        selection: &dyn SelectionCriteria,
        arena: &SourceArena,
        outbox: &mut Outbox<SourceGroup>,
    ) -> usize {
        let mut emitted = 0;
        let mut still_open = Vec::with_capacity(self.open.len());
        for group in self.open.drain(..) {
            let done = group.members().iter().all(|&member| {
                arena
                    .get(member)
                    .is_some_and(|source| selection.must_process(source))
            });
            if !done {
                still_open.push(group);
            } else if !group.is_empty() {
                outbox.push(group);
                emitted += 1;
            }
        }
        self.open = still_open;
        emitted
    }
}

impl std::fmt::Debug for SourceGrouping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceGrouping")
            .field("criteria", &self.criteria.name())
            .field("open", &self.open.len())
            .finish()
    }
}
