//! Read-only pixel access for detection and measurement frames.
//!
//! Image loading (FITS, WCS) lives outside the crate; anything that can
//! report its size and a value per pixel can be segmented and measured.

use std::fmt;
use std::sync::Arc;

use common::Buffer2;

use crate::config::ConfigError;
use crate::property::Property;

/// Read-only 2-D scalar image.
pub trait Image: Send + Sync {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn value(&self, x: usize, y: usize) -> f32;
}

impl Image for Buffer2<f32> {
    #[inline]
    fn width(&self) -> usize {
        Buffer2::width(self)
    }

    #[inline]
    fn height(&self) -> usize {
        Buffer2::height(self)
    }

    #[inline]
    fn value(&self, x: usize, y: usize) -> f32 {
        self[(x, y)]
    }
}

/// Detection threshold: a pixel is "on" iff its value is strictly above it.
#[derive(Clone)]
pub enum Threshold {
    /// Same threshold for every pixel.
    Constant(f32),
    /// Per-pixel threshold map with the frame's dimensions.
    Map(Arc<dyn Image>),
}

impl Threshold {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        match self {
            Threshold::Constant(value) => *value,
            Threshold::Map(map) => map.value(x, y),
        }
    }

    #[inline]
    pub fn is_above(&self, value: f32, x: usize, y: usize) -> bool {
        value > self.at(x, y)
    }
}

impl fmt::Debug for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Constant(value) => write!(f, "Threshold::Constant({value})"),
            Threshold::Map(map) => {
                write!(f, "Threshold::Map({}x{})", map.width(), map.height())
            }
        }
    }
}

/// One detection image plus its threshold, processed as a unit.
#[derive(Clone, Debug)]
pub struct Frame {
    pub detection: DetectionFrame,
    pub threshold: Threshold,
}

impl Frame {
    /// Fails when a threshold map does not cover the image pixel for pixel.
    pub fn new(image: Arc<dyn Image>, threshold: Threshold) -> Result<Self, ConfigError> {
        if let Threshold::Map(map) = &threshold {
            if map.width() != image.width() || map.height() != image.height() {
                return Err(ConfigError::Invalid {
                    field: "threshold",
                    reason: format!(
                        "map is {}x{} but the image is {}x{}",
                        map.width(),
                        map.height(),
                        image.width(),
                        image.height()
                    ),
                });
            }
        }
        Ok(Self {
            detection: DetectionFrame::new(image),
            threshold,
        })
    }

    pub fn width(&self) -> usize {
        self.detection.image().width()
    }

    pub fn height(&self) -> usize {
        self.detection.image().height()
    }
}

/// Shared handle to the detection image a source was segmented from.
///
/// Set on every source at birth and inherited by derived sources, so
/// measurement tasks can read pixel values without any global state.
#[derive(Clone)]
pub struct DetectionFrame {
    image: Arc<dyn Image>,
}

impl DetectionFrame {
    pub fn new(image: Arc<dyn Image>) -> Self {
        Self { image }
    }

    #[inline]
    pub fn image(&self) -> &dyn Image {
        self.image.as_ref()
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.image.value(x, y)
    }
}

impl fmt::Debug for DetectionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DetectionFrame({}x{})",
            self.image.width(),
            self.image.height()
        )
    }
}

impl Property for DetectionFrame {}
