//! Segmentation stage: detection frame to a stream of sources.
//!
//! A [`FrameScan`] walks the frame one row at a time through a
//! [`LutzLabeler`], turning every closed region into a [`Source`] with its
//! footprint and the detection frame attached. After each row it also reports
//! the safe line: no source emitted later can occupy a row above it.

mod lutz;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use lutz::LutzLabeler;

use crate::config::{ConfigError, Connectivity, SegmentationConfig};
use crate::image::Frame;
use crate::math::PixelCoordinate;
use crate::pipeline::Outbox;
use crate::source::Source;
use crate::task::TaskRegistry;

#[derive(Debug)]
pub enum SegmentationEvent {
    Source(Source),
    /// Every source emitted from now on lies at or below this row.
    SafeLine(usize),
}

#[derive(Debug)]
pub struct Segmentation {
    connectivity: Connectivity,
    registry: Arc<TaskRegistry>,
}

impl Segmentation {
    pub fn new(config: &SegmentationConfig, registry: Arc<TaskRegistry>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            connectivity: config.connectivity,
            registry,
        })
    }

    pub fn scan<'f>(&self, frame: &'f Frame) -> FrameScan<'f> {
        FrameScan {
            frame,
            registry: Arc::clone(&self.registry),
            labeler: LutzLabeler::new(frame.width(), self.connectivity),
            row_mask: vec![false; frame.width()],
            closed: Vec::new(),
            last_line: None,
            done: false,
        }
    }

    /// Segment a whole frame at once.
    pub fn process_frame(&self, frame: &Frame, outbox: &mut Outbox<SegmentationEvent>) {
        let mut scan = self.scan(frame);
        while scan.next_row(outbox) {}
    }
}

/// Row-by-row segmentation of one frame.
pub struct FrameScan<'f> {
    frame: &'f Frame,
    registry: Arc<TaskRegistry>,
    labeler: LutzLabeler,
    row_mask: Vec<bool>,
    closed: Vec<Vec<PixelCoordinate>>,
    last_line: Option<usize>,
    done: bool,
}

impl FrameScan<'_> {
    /// Process the next row. Returns `false` once the frame is exhausted and
    /// every remaining region has been emitted.
    pub fn next_row(&mut self, outbox: &mut Outbox<SegmentationEvent>) -> bool {
        if self.done {
            return false;
        }

        let y = self.labeler.row();
        if y < self.frame.height() {
            let image = self.frame.detection.image();
            for (x, on) in self.row_mask.iter_mut().enumerate() {
                *on = self.frame.threshold.is_above(image.value(x, y), x, y);
            }
            self.labeler.process_row(&self.row_mask, &mut self.closed);
            self.emit_closed(outbox);

            let line = self.labeler.safe_line();
            if self.last_line != Some(line) {
                self.last_line = Some(line);
                outbox.push(SegmentationEvent::SafeLine(line));
            }
            true
        } else {
            self.labeler.finish(&mut self.closed);
            self.emit_closed(outbox);
            tracing::debug!("Segmentation finished at row {y}");
            self.done = true;
            false
        }
    }

    fn emit_closed(&mut self, outbox: &mut Outbox<SegmentationEvent>) {
        for pixels in self.closed.drain(..) {
            let mut source = Source::new(pixels, Arc::clone(&self.registry));
            source.set_property(self.frame.detection.clone());
            outbox.push(SegmentationEvent::Source(source));
        }
    }
}
