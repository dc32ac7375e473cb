//! Pixel features: load, resize, and extract interleaved RGB values.

use crate::error::{ClassifyError, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Turns an image file into a fixed-length feature vector.
///
/// Images are resized exactly to `width x height`, converted to RGB8, and
/// flattened as `R G B R G B ...` scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureExtractor {
    pub width: u32,
    pub height: u32,
}

impl FeatureExtractor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn dim(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path).map_err(|e| ClassifyError::image(path, e.to_string()))?;
        let rgb = img
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();
        Ok(rgb
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect())
    }
}
