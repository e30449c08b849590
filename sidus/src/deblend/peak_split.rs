//! Splitting blended members at local maxima.
//!
//! 1. Find local maxima of the detection image inside the footprint
//! 2. Keep peaks that are prominent enough and far enough apart
//! 3. Assign every footprint pixel to its nearest peak
//!
//! Peak lists use `ArrayVec`; footprints with more than [`MAX_PEAKS`] peaks
//! keep the first ones found and drop the rest.

use arrayvec::ArrayVec;

use super::DeblendStep;
use crate::config::{ConfigError, DeblendConfig};
use crate::image::{DetectionFrame, Image};
use crate::math::PixelCoordinate;
use crate::source::{GroupView, Source};

/// Maximum number of peaks per footprint.
pub const MAX_PEAKS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Peak {
    pixel: PixelCoordinate,
    value: f32,
}

#[derive(Debug, Clone)]
pub struct PeakSplitDeblendStep {
    min_separation: usize,
    min_prominence: f32,
}

impl PeakSplitDeblendStep {
    pub fn new(min_separation: usize, min_prominence: f32) -> Result<Self, ConfigError> {
        DeblendConfig {
            min_separation,
            min_prominence,
            ..Default::default()
        }
        .validate()?;
        Ok(Self {
            min_separation,
            min_prominence,
        })
    }

    /// Children of `source`, one per accepted peak, or `None` when the source
    /// holds fewer than two peaks.
    fn split(&self, source: &Source) -> anyhow::Result<Option<Vec<Source>>> {
        let frame = source.detection_frame()?;
        let peaks = self.find_peaks(source, frame);
        if peaks.len() < 2 {
            return Ok(None);
        }

        let mut parts: ArrayVec<Vec<PixelCoordinate>, MAX_PEAKS> =
            peaks.iter().map(|_| Vec::new()).collect();
        for &pixel in source.pixels() {
            parts[find_nearest_peak(pixel, &peaks)].push(pixel);
        }

        let children = parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| source.derive(part))
            .collect();
        Ok(Some(children))
    }

    fn find_peaks(&self, source: &Source, frame: &DetectionFrame) -> ArrayVec<Peak, MAX_PEAKS> {
        let image = frame.image();
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for pixel in source.pixels() {
            let value = frame.value(pixel.x, pixel.y);
            min = min.min(value);
            max = max.max(value);
        }
        let min_peak_value = min + (max - min) * self.min_prominence;
        let min_sep_sq = self.min_separation * self.min_separation;

        let mut peaks: ArrayVec<Peak, MAX_PEAKS> = ArrayVec::new();
        for &pixel in source.pixels() {
            let value = frame.value(pixel.x, pixel.y);
            if value < min_peak_value || !is_local_maximum(pixel, value, image) {
                continue;
            }
            add_or_replace_peak(&mut peaks, Peak { pixel, value }, min_sep_sq);
        }

        // Brightest first
        peaks.sort_by(|a, b| b.value.total_cmp(&a.value));
        peaks
    }
}

impl DeblendStep for PeakSplitDeblendStep {
    fn name(&self) -> &str {
        "peak_split"
    }

    fn deblend(&self, group: &mut GroupView<'_>) -> anyhow::Result<bool> {
        let mut modified = false;
        for handle in group.members().to_vec() {
            let Some(source) = group.source(handle) else {
                continue;
            };
            if let Some(children) = self.split(source)? {
                tracing::debug!(
                    "Split source {} into {} children",
                    source.id().id,
                    children.len()
                );
                group.replace_source(handle, children);
                modified = true;
            }
        }
        Ok(modified)
    }
}

/// Strictly greater than all 8 neighbors inside the image.
#[inline]
fn is_local_maximum(pixel: PixelCoordinate, value: f32, image: &dyn Image) -> bool {
    let (x, y) = (pixel.x, pixel.y);
    let width = image.width();
    let height = image.height();

    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            if (nx, ny) != (x, y) && image.value(nx, ny) >= value {
                return false;
            }
        }
    }
    true
}

/// Add a peak, or replace a nearby weaker one.
#[inline]
fn add_or_replace_peak(peaks: &mut ArrayVec<Peak, MAX_PEAKS>, peak: Peak, min_sep_sq: usize) {
    let well_separated = peaks
        .iter()
        .all(|other| other.pixel.distance_sq(&peak.pixel) >= min_sep_sq);

    if well_separated {
        if !peaks.is_full() {
            peaks.push(peak);
        }
    } else if let Some(other) = peaks.iter_mut().find(|other| {
        other.pixel.distance_sq(&peak.pixel) < min_sep_sq && peak.value > other.value
    }) {
        *other = peak;
    }
}

#[inline]
fn find_nearest_peak(pixel: PixelCoordinate, peaks: &[Peak]) -> usize {
    let mut min_dist_sq = usize::MAX;
    let mut nearest = 0;
    for (i, peak) in peaks.iter().enumerate() {
        let dist_sq = pixel.distance_sq(&peak.pixel);
        if dist_sq < min_dist_sq {
            min_dist_sq = dist_sq;
            nearest = i;
        }
    }
    nearest
}
