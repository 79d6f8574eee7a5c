//! Image preprocessing for the image tower.
//!
//! Turns a decoded image into the `[1, 3, 224, 224]` float tensor the model
//! was exported with:
//! 1. Resize to exactly 224x224 (bilinear, aspect ratio not preserved)
//! 2. Scale each channel to [0, 1]
//! 3. Normalize per channel with the model's mean/std
//! 4. Lay out channel-major, then row, then column

use image::imageops::FilterType;
use image::DynamicImage;

use crate::engine::{InputTensor, TensorData};

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;

/// Per-channel (R, G, B) mean of the pretraining distribution.
pub const NORM_MEAN: [f32; 3] = [0.48145467, 0.4578275, 0.40821072];

/// Per-channel (R, G, B) standard deviation of the pretraining distribution.
pub const NORM_STD: [f32; 3] = [0.26862955, 0.2613026, 0.2757771];

const PLANE: usize = (INPUT_SIZE * INPUT_SIZE) as usize;

/// A normalized, contiguous image tensor of shape `[1, 3, 224, 224]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    pub const SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];

    pub fn into_input(self) -> InputTensor {
        InputTensor {
            shape: Self::SHAPE.to_vec(),
            data: TensorData::F32(self.data),
        }
    }
}

/// Resize and normalize an image of any size.
///
/// CPU-bound for large photos; call it from the blocking pool.
pub fn to_tensor(image: &DynamicImage) -> ImageTensor {
    let resized = if image.width() == INPUT_SIZE && image.height() == INPUT_SIZE {
        image.to_rgb8()
    } else {
        image
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            .to_rgb8()
    };
    normalize(&resized)
}

fn normalize(rgb: &image::RgbImage) -> ImageTensor {
    let side = INPUT_SIZE as usize;
    let mut data = vec![0.0f32; 3 * PLANE];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * side + x as usize;
        for c in 0..3 {
            let raw = pixel[c] as f32 / 255.0;
            data[c * PLANE + idx] = (raw - NORM_MEAN[c]) / NORM_STD[c];
        }
    }

    ImageTensor { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    /// Inclusive range a normalized value of channel `c` can take.
    fn channel_bounds(c: usize) -> (f32, f32) {
        (
            (0.0 - NORM_MEAN[c]) / NORM_STD[c],
            (1.0 - NORM_MEAN[c]) / NORM_STD[c],
        )
    }

    fn at(tensor: &ImageTensor, c: usize, y: usize, x: usize) -> f32 {
        tensor.data[c * PLANE + y * INPUT_SIZE as usize + x]
    }

    #[test]
    fn test_shape_is_fixed() {
        for (w, h) in [(1, 1), (640, 480), (100, 900), (224, 224)] {
            let input = to_tensor(&gradient(w, h)).into_input();
            assert_eq!(input.shape, vec![1, 3, 224, 224]);
            assert!(matches!(input.data, TensorData::F32(ref v) if v.len() == 3 * 224 * 224));
        }
    }

    #[test]
    fn test_values_within_normalized_range() {
        let tensor = to_tensor(&gradient(500, 300));
        for c in 0..3 {
            let (lo, hi) = channel_bounds(c);
            for y in 0..224 {
                for x in 0..224 {
                    let v = at(&tensor, c, y, x);
                    assert!(v >= lo - 1e-5 && v <= hi + 1e-5, "channel {c} value {v}");
                }
            }
        }
    }

    #[test]
    fn test_channel_major_layout() {
        let mut img = RgbImage::from_pixel(224, 224, Rgb([0, 0, 0]));
        img.put_pixel(5, 7, Rgb([255, 128, 0]));
        let tensor = to_tensor(&DynamicImage::ImageRgb8(img));

        let data = &tensor.data;
        let idx = 7 * 224 + 5;
        assert!((data[idx] - (1.0 - NORM_MEAN[0]) / NORM_STD[0]).abs() < 1e-5);
        let g = (128.0 / 255.0 - NORM_MEAN[1]) / NORM_STD[1];
        assert!((data[PLANE + idx] - g).abs() < 1e-5);
        assert!((data[2 * PLANE + idx] - (-NORM_MEAN[2] / NORM_STD[2])).abs() < 1e-5);
    }

    #[test]
    fn test_solid_color_normalizes_per_channel() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 80, Rgb([255, 255, 255])));
        let tensor = to_tensor(&img);
        for c in 0..3 {
            let expected = (1.0 - NORM_MEAN[c]) / NORM_STD[c];
            // one quantization step of tolerance for the resampler
            assert!((at(&tensor, c, 100, 100) - expected).abs() < 0.02);
        }
    }

    #[test]
    fn test_exact_size_is_not_resampled() {
        let img = gradient(224, 224);
        let tensor = to_tensor(&img);
        let expected = (10.0 / 255.0 - NORM_MEAN[0]) / NORM_STD[0];
        assert!((at(&tensor, 0, 3, 10) - expected).abs() < 1e-6);
    }
}
