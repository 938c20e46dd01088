//! Letterbox preprocessing: square padding, channel conversion and tensor layout

use crate::error::{DetectionError, Result};
use crate::types::{ImageData, ImageFormat, PreprocessedTensor, ScaleRatio};
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;

/// Turn a pixel grid into the model input tensor plus the ratios needed to undo padding.
///
/// The image is padded on the right and bottom only, up to `max(W, H)` on both
/// sides, then resized uniformly to `target_width` x `target_height`. The
/// decoder relies on the pad being origin-aligned: it only multiplies by the
/// returned ratios and never subtracts an offset.
pub fn letterbox(
    image: &ImageData,
    target_width: u32,
    target_height: u32,
) -> Result<(PreprocessedTensor, ScaleRatio)> {
    if image.is_empty() {
        return Err(DetectionError::invalid_input(format!(
            "Zero-area image: {}x{}",
            image.width, image.height
        )));
    }
    if target_width == 0 || target_height == 0 {
        return Err(DetectionError::invalid_input(format!(
            "Zero-area target size: {}x{}",
            target_width, target_height
        )));
    }
    if !image.validate() {
        return Err(DetectionError::invalid_input(format!(
            "Pixel buffer of {} bytes does not match {}x{} {:?}",
            image.data.len(),
            image.width,
            image.height,
            image.format
        )));
    }

    let rgb_data = convert_to_rgb(image);
    let (canvas, ratio) = pad_to_square(rgb_data, image.width, image.height)?;

    let resized = if canvas.dimensions() == (target_width, target_height) {
        canvas
    } else {
        image::imageops::resize(&canvas, target_width, target_height, FilterType::Triangle)
    };

    Ok((PreprocessedTensor::new(to_tensor(&resized)), ratio))
}

/// Convert image to packed RGB, dropping any alpha channel without blending
pub fn convert_to_rgb(image: &ImageData) -> Vec<u8> {
    match image.format {
        ImageFormat::RGB => image.data.clone(),
        ImageFormat::BGR => {
            let mut rgb_data = Vec::with_capacity(image.data.len());
            for chunk in image.data.chunks_exact(3) {
                rgb_data.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
            }
            rgb_data
        }
        ImageFormat::RGBA => {
            let mut rgb_data = Vec::with_capacity(image.data.len() * 3 / 4);
            for chunk in image.data.chunks_exact(4) {
                rgb_data.extend_from_slice(&chunk[..3]);
            }
            rgb_data
        }
        ImageFormat::BGRA => {
            let mut rgb_data = Vec::with_capacity(image.data.len() * 3 / 4);
            for chunk in image.data.chunks_exact(4) {
                rgb_data.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
            }
            rgb_data
        }
    }
}

/// Place the image at the origin of a zero-filled `max(W, H)` square canvas
pub fn pad_to_square(rgb_data: Vec<u8>, width: u32, height: u32) -> Result<(RgbImage, ScaleRatio)> {
    let source = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb_data).ok_or_else(|| {
        DetectionError::invalid_input("Failed to create image buffer from RGB data")
    })?;

    let max_size = width.max(height);
    let ratio = ScaleRatio::for_dimensions(width, height);
    if width == height {
        return Ok((source, ratio));
    }

    let mut canvas = RgbImage::new(max_size, max_size);
    image::imageops::replace(&mut canvas, &source, 0, 0);

    Ok((canvas, ratio))
}

/// HWC RGB pixels -> `[1, 3, H, W]` float tensor scaled to [0, 1]
fn to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn solid(width: u32, height: u32, format: ImageFormat, pixel: &[u8]) -> ImageData {
        let count = (width * height) as usize;
        ImageData::new(pixel.repeat(count), width, height, format)
    }

    #[test]
    fn test_rgb_conversion() {
        let rgb_data = ImageData::new(vec![255, 128, 64, 200, 150, 100], 2, 1, ImageFormat::RGB);
        assert_eq!(convert_to_rgb(&rgb_data), vec![255, 128, 64, 200, 150, 100]);

        let bgr_data = ImageData::new(vec![64, 128, 255, 100, 150, 200], 2, 1, ImageFormat::BGR);
        assert_eq!(convert_to_rgb(&bgr_data), vec![255, 128, 64, 200, 150, 100]);
    }

    #[test]
    fn test_alpha_is_dropped_not_blended() {
        let rgba = ImageData::new(vec![10, 20, 30, 0, 40, 50, 60, 128], 2, 1, ImageFormat::RGBA);
        assert_eq!(convert_to_rgb(&rgba), vec![10, 20, 30, 40, 50, 60]);

        let bgra = ImageData::new(vec![30, 20, 10, 255], 1, 1, ImageFormat::BGRA);
        assert_eq!(convert_to_rgb(&bgra), vec![10, 20, 30]);
    }

    #[test]
    fn test_square_image_has_no_padding() {
        let image = solid(640, 640, ImageFormat::BGR, &[30, 20, 10]);
        let (tensor, ratio) = letterbox(&image, 640, 640).unwrap();

        assert_eq!(ratio, ScaleRatio::identity());
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);

        let view = tensor.view();
        assert_abs_diff_eq!(view[[0, 0, 639, 639]], 10.0 / 255.0, epsilon = 1e-6);
        assert_abs_diff_eq!(view[[0, 1, 0, 0]], 20.0 / 255.0, epsilon = 1e-6);
        assert_abs_diff_eq!(view[[0, 2, 320, 100]], 30.0 / 255.0, epsilon = 1e-6);
    }

    #[test]
    fn test_padding_is_bottom_right_only() {
        let (canvas, ratio) = pad_to_square(vec![255; 4 * 2 * 3], 4, 2).unwrap();
        assert_eq!(canvas.dimensions(), (4, 4));
        assert_eq!(ratio, ScaleRatio::new(1.0, 2.0));

        // content stays at the origin
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(3, 1).0, [255, 255, 255]);
        // appended rows are black
        assert_eq!(canvas.get_pixel(0, 2).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(3, 3).0, [0, 0, 0]);
    }

    #[test]
    fn test_portrait_pads_right() {
        let (canvas, ratio) = pad_to_square(vec![255; 2 * 6 * 3], 2, 6).unwrap();
        assert_eq!(canvas.dimensions(), (6, 6));
        assert_abs_diff_eq!(ratio.x, 3.0, epsilon = 1e-6);
        assert_eq!(ratio.y, 1.0);
        assert_eq!(canvas.get_pixel(1, 5).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(2, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_landscape_letterbox_tensor() {
        let image = solid(1280, 720, ImageFormat::RGB, &[255, 255, 255]);
        let (tensor, ratio) = letterbox(&image, 640, 640).unwrap();

        assert_eq!(ratio.x, 1.0);
        assert_abs_diff_eq!(ratio.y, 1280.0 / 720.0, epsilon = 1e-6);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);

        let view = tensor.view();
        // top-left lies inside the image, bottom rows are padding
        assert_abs_diff_eq!(view[[0, 0, 0, 0]], 1.0, epsilon = 0.01);
        for c in 0..3 {
            for x in (0..640).step_by(37) {
                assert_eq!(view[[0, c, 639, x]], 0.0);
                assert_eq!(view[[0, c, 400, x]], 0.0);
            }
        }
    }

    #[test]
    fn test_values_are_normalized() {
        let image = solid(30, 50, ImageFormat::RGBA, &[0, 128, 255, 7]);
        let (tensor, _) = letterbox(&image, 64, 64).unwrap();
        assert!(tensor.view().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_zero_area_is_rejected() {
        let image = ImageData::new(Vec::new(), 0, 480, ImageFormat::RGB);
        assert!(matches!(
            letterbox(&image, 640, 640),
            Err(DetectionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_mismatched_buffer_is_rejected() {
        let image = ImageData::new(vec![0; 10], 4, 4, ImageFormat::RGB);
        assert!(matches!(
            letterbox(&image, 640, 640),
            Err(DetectionError::InvalidInput(_))
        ));
    }
}
