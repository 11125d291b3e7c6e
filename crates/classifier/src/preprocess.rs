//! Image normalization for the skin model
//!
//! Any decodable raster image becomes a `(1, 224, 224, 3)` float tensor in
//! RGB channel order, using the same numeric preprocessing as training.

use crate::ClassifierError;
use dermai_common::NormalizationScheme;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Model input height in pixels
pub const INPUT_HEIGHT: usize = 224;
/// Model input width in pixels
pub const INPUT_WIDTH: usize = 224;
/// RGB
pub const INPUT_CHANNELS: usize = 3;

/// Batch-of-one input tensor, laid out NHWC
pub type InputTensor = Array4<f32>;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode image bytes and normalize them into a model input tensor
///
/// # Errors
/// Returns `ClassifierError::InvalidImage` if the bytes cannot be decoded
pub fn normalize(bytes: &[u8], scheme: NormalizationScheme) -> Result<InputTensor, ClassifierError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ClassifierError::InvalidImage(e.to_string()))?;
    Ok(normalize_image(&img, scheme))
}

/// Normalize an already decoded image
///
/// Alpha and palette information is discarded, grayscale is expanded to three
/// equal channels, and the image is resized to 224x224 with a bilinear filter
/// regardless of its aspect ratio.
#[must_use]
pub fn normalize_image(img: &DynamicImage, scheme: NormalizationScheme) -> InputTensor {
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(
        &rgb,
        INPUT_WIDTH as u32,
        INPUT_HEIGHT as u32,
        FilterType::Triangle,
    );

    let mut array = Array4::<f32>::zeros((1, INPUT_HEIGHT, INPUT_WIDTH, INPUT_CHANNELS));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..INPUT_CHANNELS {
            array[[0, y as usize, x as usize, channel]] =
                scale_channel(scheme, channel, pixel[channel]);
        }
    }

    array
}

fn scale_channel(scheme: NormalizationScheme, channel: usize, value: u8) -> f32 {
    let value = f32::from(value);
    match scheme {
        // Rescaling happens inside the network
        NormalizationScheme::EfficientNetV2 => value,
        NormalizationScheme::ScaledCentered => value / 127.5 - 1.0,
        NormalizationScheme::ImageNet => {
            (value / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_shape_is_fixed_regardless_of_input_size() {
        for (w, h) in [(500, 500), (64, 32), (1, 1), (300, 1200)] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let tensor = normalize_image(&img, NormalizationScheme::EfficientNetV2);
            assert_eq!(tensor.shape(), &[1, 224, 224, 3], "input {w}x{h}");
        }
    }

    #[test]
    fn test_grayscale_png_expands_to_rgb() {
        let gray = GrayImage::from_pixel(500, 500, Luma([128]));
        let bytes = encode(&DynamicImage::ImageLuma8(gray), ImageFormat::Png);

        let tensor = normalize(&bytes, NormalizationScheme::EfficientNetV2).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        for c in 0..3 {
            assert_eq!(tensor[[0, 100, 100, c]], 128.0);
        }
    }

    #[test]
    fn test_channel_order_is_rgb() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 10]));
        let tensor = normalize_image(&DynamicImage::ImageRgb8(img), NormalizationScheme::EfficientNetV2);
        assert_eq!(tensor[[0, 0, 0, 0]], 255.0);
        assert_eq!(tensor[[0, 0, 0, 1]], 0.0);
        assert_eq!(tensor[[0, 0, 0, 2]], 10.0);
    }

    #[test]
    fn test_alpha_is_discarded() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([20, 40, 60, 0]));
        let bytes = encode(&DynamicImage::ImageRgba8(img), ImageFormat::Png);
        let tensor = normalize(&bytes, NormalizationScheme::EfficientNetV2).unwrap();
        assert_eq!(tensor[[0, 5, 5, 0]], 20.0);
        assert_eq!(tensor[[0, 5, 5, 1]], 40.0);
        assert_eq!(tensor[[0, 5, 5, 2]], 60.0);
    }

    #[test]
    fn test_scaled_centered_range() {
        let black = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));

        let low = normalize_image(&black, NormalizationScheme::ScaledCentered);
        let high = normalize_image(&white, NormalizationScheme::ScaledCentered);
        assert!((low[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((high[[0, 0, 0, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_imagenet_statistics() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([124, 116, 104])));
        let tensor = normalize_image(&img, NormalizationScheme::ImageNet);
        // Pixel values close to the channel means land near zero
        for c in 0..3 {
            assert!(tensor[[0, 1, 1, c]].abs() < 0.01, "channel {c}");
        }
    }

    #[test]
    fn test_undecodable_bytes() {
        let result = normalize(b"definitely not an image", NormalizationScheme::EfficientNetV2);
        assert!(matches!(result, Err(ClassifierError::InvalidImage(_))));
    }

    #[test]
    fn test_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(37, 91, |x, y| {
            Rgb([(x * 7) as u8, (y * 3) as u8, ((x + y) % 255) as u8])
        }));
        let a = normalize_image(&img, NormalizationScheme::EfficientNetV2);
        let b = normalize_image(&img, NormalizationScheme::EfficientNetV2);
        assert_eq!(a, b);
    }
}
