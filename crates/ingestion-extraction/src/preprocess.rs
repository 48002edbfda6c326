//! Caffe-style image preprocessing: resize, RGB to BGR, per-channel mean
//! subtraction, channels-first layout. Pixel values stay in `0..=255`.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::{Array3, Array4, Axis};

use crate::error::ExtractionError;

/// ImageNet channel means in BGR order.
pub const IMAGENET_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
}

impl ImagePreprocessor {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn load(&self, path: &Path) -> Result<Array3<f32>, ExtractionError> {
        let image = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|err| image_error(path, err))?
            .decode()
            .map_err(|err| image_error(path, err))?;
        Ok(self.prepare(&image))
    }

    /// Returns a `(3, height, width)` array.
    #[must_use]
    pub fn prepare(&self, image: &DynamicImage) -> Array3<f32> {
        let rgb = image
            .resize_exact(self.width, self.height, FilterType::Nearest)
            .to_rgb8();
        let mut out = Array3::zeros((3, self.height as usize, self.width as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let (x, y) = (x as usize, y as usize);
            out[[0, y, x]] = f32::from(b) - IMAGENET_MEAN_BGR[0];
            out[[1, y, x]] = f32::from(g) - IMAGENET_MEAN_BGR[1];
            out[[2, y, x]] = f32::from(r) - IMAGENET_MEAN_BGR[2];
        }
        out
    }

    /// Loads a chunk of files into one `(n, 3, height, width)` batch. The
    /// first unreadable file fails the whole chunk.
    pub fn load_batch(&self, paths: &[PathBuf]) -> Result<Array4<f32>, ExtractionError> {
        let mut batch = Array4::zeros((
            paths.len(),
            3,
            self.height as usize,
            self.width as usize,
        ));
        for (slot, path) in paths.iter().enumerate() {
            let image = self.load(path)?;
            batch.index_axis_mut(Axis(0), slot).assign(&image);
        }
        Ok(batch)
    }
}

fn image_error(path: &Path, err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Image {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
