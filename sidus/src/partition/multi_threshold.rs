//! Splitting sources at the junctions of a threshold tree.
//!
//! 1. Re-label the footprint at `threshold_count` levels spaced geometrically
//!    between 0.8x its faintest pixel and its peak
//! 2. A branch holding two or more branches of the next level is a junction
//! 3. Resolve junctions deepest first: when at least two children carry more
//!    than `min_contrast` of the footprint flux, they become sources
//! 4. Hand every remaining footprint pixel to the source whose elliptical
//!    profile is brightest there
//!
//! All work happens on a cutout of the footprint's bounding box, in local
//! coordinates.

use common::Buffer2;

use super::PartitionStep;
use crate::config::{ConfigError, Connectivity, PartitionConfig};
use crate::math::PixelCoordinate;
use crate::segmentation::LutzLabeler;
use crate::source::Source;

// ============================================================================
// Constants
// ============================================================================

/// Profiles fainter than `exp(-MAX_EXPONENT)` count as zero.
const MAX_EXPONENT: f64 = 70.0;

// ============================================================================
// Tree building
// ============================================================================

#[derive(Debug)]
struct Node {
    pixels: Vec<PixelCoordinate>,
    threshold: f32,
    parent: Option<usize>,
    children: Vec<usize>,
    split: bool,
}

#[derive(Debug, Clone)]
pub struct MultiThresholdPartitionStep {
    threshold_count: usize,
    min_branch_area: usize,
    min_contrast: f32,
}

impl MultiThresholdPartitionStep {
    pub fn new(threshold_count: usize, min_branch_area: usize, min_contrast: f32) -> Result<Self, ConfigError> {
        PartitionConfig {
            threshold_count,
            min_branch_area,
            min_contrast,
            ..Default::default()
        }
        .validate()?;
        Ok(Self {
            threshold_count,
            min_branch_area,
            min_contrast,
        })
    }

    pub fn from_config(config: &PartitionConfig) -> Result<Self, ConfigError> {
        Self::new(config.threshold_count, config.min_branch_area, config.min_contrast)
    }

    /// Local pixel lists of the sources `source` splits into, or `None` when
    /// it stays whole.
    fn split(&self, source: &Source) -> anyhow::Result<Option<Vec<Vec<PixelCoordinate>>>> {
        let Some(bbox) = source.pixels().bounding_box() else {
            return Ok(None);
        };
        let frame = source.detection_frame()?;

        let footprint: Vec<PixelCoordinate> = source
            .pixels()
            .iter()
            .map(|p| PixelCoordinate::new(p.x - bbox.x_min, p.y - bbox.y_min))
            .collect();
        let mut stamp = Buffer2::new_filled(bbox.width(), bbox.height(), 0.0f32);
        let (mut min_value, mut peak) = (f32::INFINITY, f32::NEG_INFINITY);
        for (local, global) in footprint.iter().zip(source.pixels()) {
            let value = frame.value(global.x, global.y);
            stamp[(local.x, local.y)] = value;
            min_value = min_value.min(value);
            peak = peak.max(value);
        }

        let base = 0.8 * min_value;
        if !(base > 0.0 && peak > base) {
            return Ok(None);
        }

        let (mut nodes, mut junctions) = self.build_tree(&stamp, footprint.clone(), base, peak);

        let intensity = |node: &Node| -> f64 {
            node.pixels
                .iter()
                .map(|p| (stamp[(p.x, p.y)] - node.threshold) as f64)
                .sum()
        };
        let min_intensity = intensity(&nodes[0]) * self.min_contrast as f64;

        let mut kept = Vec::new();
        while let Some(junction) = junctions.pop() {
            let bright: Vec<usize> = nodes[junction]
                .children
                .iter()
                .copied()
                .filter(|&child| intensity(&nodes[child]) > min_intensity)
                .collect();
            if bright.len() < 2 {
                continue;
            }
            let mut current = Some(junction);
            while let Some(index) = current {
                nodes[index].split = true;
                current = nodes[index].parent;
            }
            kept.extend(bright.into_iter().filter(|&child| !nodes[child].split));
        }
        if kept.is_empty() {
            return Ok(None);
        }
        kept.sort_unstable();

        let mut parts: Vec<Vec<PixelCoordinate>> = kept
            .iter()
            .map(|&index| std::mem::take(&mut nodes[index].pixels))
            .collect();
        reassign_pixels(&mut parts, &footprint, &stamp);

        let parts = parts
            .into_iter()
            .map(|part| {
                part.into_iter()
                    .map(|p| PixelCoordinate::new(p.x + bbox.x_min, p.y + bbox.y_min))
                    .collect()
            })
            .collect();
        Ok(Some(parts))
    }

    /// Returns the nodes (root first) and the junction indices in the order
    /// they were found.
    fn build_tree(
        &self,
        stamp: &Buffer2<f32>,
        footprint: Vec<PixelCoordinate>,
        base: f32,
        peak: f32,
    ) -> (Vec<Node>, Vec<usize>) {
        let (width, height) = (stamp.width(), stamp.height());
        // Deepest node holding each pixel; the root holds the whole footprint.
        let mut owner = Buffer2::new_filled(width, height, 0usize);
        let mut nodes = vec![Node {
            pixels: footprint,
            threshold: 0.0,
            parent: None,
            children: Vec::new(),
            split: false,
        }];
        let mut active = vec![0usize];
        let mut junctions = Vec::new();

        let mut labeler = LutzLabeler::new(width, Connectivity::Eight);
        let mut mask = vec![false; width];
        let mut branches = Vec::new();

        for level in 1..self.threshold_count {
            let threshold = base * (peak / base).powf(level as f32 / self.threshold_count as f32);
            branches.clear();
            for y in 0..height {
                for (x, on) in mask.iter_mut().enumerate() {
                    *on = stamp[(x, y)] > threshold;
                }
                labeler.process_row(&mask, &mut branches);
            }
            labeler.finish(&mut branches);
            branches.retain(|branch: &Vec<PixelCoordinate>| branch.len() >= self.min_branch_area);

            let mut next_active = Vec::with_capacity(active.len());
            for &node in &active {
                let inside: Vec<usize> = branches
                    .iter()
                    .enumerate()
                    .filter(|(_, branch)| owner[(branch[0].x, branch[0].y)] == node)
                    .map(|(i, _)| i)
                    .collect();
                match inside.len() {
                    0 => {}
                    1 => next_active.push(node),
                    _ => {
                        junctions.push(node);
                        for i in inside {
                            let child = nodes.len();
                            let pixels = std::mem::take(&mut branches[i]);
                            for p in &pixels {
                                owner[(p.x, p.y)] = child;
                            }
                            nodes.push(Node {
                                pixels,
                                threshold,
                                parent: Some(node),
                                children: Vec::new(),
                                split: false,
                            });
                            nodes[node].children.push(child);
                            next_active.push(child);
                        }
                    }
                }
            }

            active = next_active;
            if active.is_empty() {
                break;
            }
        }

        (nodes, junctions)
    }
}

impl PartitionStep for MultiThresholdPartitionStep {
    fn name(&self) -> &str {
        "multi_threshold"
    }

    fn partition(&self, source: Source) -> anyhow::Result<Vec<Source>> {
        match self.split(&source)? {
            Some(parts) => Ok(parts.into_iter().map(|part| source.derive(part)).collect()),
            None => Ok(vec![source]),
        }
    }
}

// ============================================================================
// Pixel assignment
// ============================================================================

/// Elliptical Gaussian model of one kept branch.
#[derive(Debug, Clone, Copy)]
struct Profile {
    x: f64,
    y: f64,
    cxx: f64,
    cyy: f64,
    cxy: f64,
    amplitude: f64,
}

impl Profile {
    fn new(pixels: &[PixelCoordinate], stamp: &Buffer2<f32>) -> Self {
        let value = |p: &PixelCoordinate| stamp[(p.x, p.y)] as f64;
        let weight = |p: &PixelCoordinate| value(p).max(0.0);
        let mut total: f64 = pixels.iter().map(weight).sum();
        let unit = total <= 0.0;
        if unit {
            total = pixels.len() as f64;
        }
        let w = |p: &PixelCoordinate| if unit { 1.0 } else { weight(p) };

        let x = pixels.iter().map(|p| w(p) * p.x as f64).sum::<f64>() / total;
        let y = pixels.iter().map(|p| w(p) * p.y as f64).sum::<f64>() / total;
        let (mut x2, mut y2, mut xy) = (0.0, 0.0, 0.0);
        for p in pixels {
            let (dx, dy) = (p.x as f64 - x, p.y as f64 - y);
            x2 += w(p) * dx * dx;
            y2 += w(p) * dy * dy;
            xy += w(p) * dx * dy;
        }
        let (mut x2, mut y2, xy) = (x2 / total, y2 / total, xy / total);
        // Single-row or single-column branches.
        if x2 * y2 - xy * xy < 0.00694 {
            x2 += 1.0 / 12.0;
            y2 += 1.0 / 12.0;
        }
        let det = x2 * y2 - xy * xy;

        let half_trace = (x2 + y2) / 2.0;
        let root = (((x2 - y2) / 2.0).powi(2) + xy * xy).sqrt();
        let a = (half_trace + root).sqrt();
        let b = (half_trace - root).max(f64::EPSILON).sqrt();

        let (min, peak) = pixels
            .iter()
            .map(value)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let spread = pixels.len() as f64 / (2.0 * std::f64::consts::PI * a * b);
        let amplitude = if spread < MAX_EXPONENT {
            (min * spread.exp()).min(4.0 * peak)
        } else {
            4.0 * peak
        };

        Self {
            x,
            y,
            cxx: y2 / det,
            cyy: x2 / det,
            cxy: -2.0 * xy / det,
            amplitude,
        }
    }

    fn distance(&self, p: PixelCoordinate) -> f64 {
        let (dx, dy) = (p.x as f64 - self.x, p.y as f64 - self.y);
        0.5 * (self.cxx * dx * dx + self.cyy * dy * dy + self.cxy * dx * dy)
    }
}

/// Give every footprint pixel outside `parts` to the part whose profile is
/// brightest at it, or to the nearest part when every profile has vanished.
fn reassign_pixels(parts: &mut [Vec<PixelCoordinate>], footprint: &[PixelCoordinate], stamp: &Buffer2<f32>) {
    let profiles: Vec<Profile> = parts.iter().map(|part| Profile::new(part, stamp)).collect();
    let mut taken = Buffer2::new_filled(stamp.width(), stamp.height(), false);
    for p in parts.iter().flatten() {
        taken[(p.x, p.y)] = true;
    }

    for &pixel in footprint {
        if taken[(pixel.x, pixel.y)] {
            continue;
        }
        let mut brightest = (0usize, 0.0f64);
        let mut nearest = (0usize, f64::INFINITY);
        for (i, profile) in profiles.iter().enumerate() {
            let distance = profile.distance(pixel);
            if distance < nearest.1 {
                nearest = (i, distance);
            }
            let density = if distance < MAX_EXPONENT {
                profile.amplitude * (-distance).exp()
            } else {
                0.0
            };
            if density > brightest.1 {
                brightest = (i, density);
            }
        }
        let target = if brightest.1 > 1.0e-31 { brightest.0 } else { nearest.0 };
        parts[target].push(pixel);
    }
}
