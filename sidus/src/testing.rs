//! Synthetic frames and sources for unit tests.

use std::sync::Arc;

use common::Buffer2;

use crate::image::{Frame, Threshold};
use crate::math::PixelCoordinate;
use crate::source::Source;
use crate::task::TaskRegistry;

pub fn empty_registry() -> Arc<TaskRegistry> {
    Arc::new(TaskRegistry::new())
}

/// Frame from an ASCII mask: `#` is 1.0, anything else 0.0, threshold 0.5.
pub fn mask_frame(rows: &[&str]) -> Frame {
    let height = rows.len();
    let width = rows.first().map_or(0, |row| row.len());
    let mut pixels = Vec::with_capacity(width * height);
    for row in rows {
        assert_eq!(row.len(), width, "ragged mask");
        pixels.extend(row.bytes().map(|b| if b == b'#' { 1.0 } else { 0.0 }));
    }
    Frame::new(
        Arc::new(Buffer2::new(width, height, pixels)),
        Threshold::Constant(0.5),
    )
    .unwrap()
}

/// Image with circular Gaussian stars `(x, y, amplitude, sigma)` on a zero sky.
pub fn star_field(width: usize, height: usize, stars: &[(f32, f32, f32, f32)]) -> Buffer2<f32> {
    Buffer2::from_fn(width, height, |x, y| {
        stars
            .iter()
            .map(|&(cx, cy, amplitude, sigma)| {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    })
}

pub fn star_frame(width: usize, height: usize, stars: &[(f32, f32, f32, f32)], threshold: f32) -> Frame {
    Frame::new(
        Arc::new(star_field(width, height, stars)),
        Threshold::Constant(threshold),
    )
    .unwrap()
}

pub fn pixels(coords: &[(usize, usize)]) -> Vec<PixelCoordinate> {
    coords.iter().map(|&(x, y)| PixelCoordinate::new(x, y)).collect()
}

/// Filled rectangle `[x0, x1] x [y0, y1]`, inclusive.
pub fn rect(x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<PixelCoordinate> {
    (y0..=y1)
        .flat_map(|y| (x0..=x1).map(move |x| PixelCoordinate::new(x, y)))
        .collect()
}

pub fn source(coords: Vec<PixelCoordinate>, registry: &Arc<TaskRegistry>) -> Source {
    Source::new(coords, Arc::clone(registry))
}

/// Task registry with every built-in plugin loaded.
pub fn builtin_registries() -> crate::plugin::Registries {
    let mut manager = crate::plugin::PluginManager::new();
    crate::plugins::register_builtin_plugins(&mut manager, &crate::config::MeasurementConfig::default());
    manager.load().unwrap()
}

pub fn builtin_registry() -> Arc<TaskRegistry> {
    builtin_registries().tasks
}
