use image::{imageops::FilterType, GenericImageView};
use ndarray::{Array, Ix4};
use thiserror::Error;

/// Side length the classifier was trained on.
pub const INPUT_SIZE: u32 = 256;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty upload")]
    Empty,
    #[error("Unrecognized image format: {0}")]
    Format(std::io::Error),
    #[error("Error decoding image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decodes uploaded bytes into a `[1, 256, 256, 3]` batch of raw 0-255 RGB
/// values. Scaling is left to the normalization policy.
pub fn decode_image(image_data: &[u8]) -> Result<Array<f32, Ix4>, DecodeError> {
    if image_data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(DecodeError::Format)?;

    let original_img = image_reader.decode()?;
    let (width, height) = original_img.dimensions();
    tracing::debug!(width, height, "Decoded upload");

    let img = original_img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let size = INPUT_SIZE as usize;
    let mut input = Array::zeros((1, size, size, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, y, x, 0]] = r as f32;
        input[[0, y, x, 1]] = g as f32;
        input[[0, y, x, 2]] = b as f32;
    }

    Ok(input)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    pub(crate) fn encode(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb(color));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), format)
            .unwrap();
        image_data
    }

    #[test]
    fn test_decode_png_to_fixed_shape() {
        let data = encode(100, 100, [255, 0, 0], ImageFormat::Png);
        let input = decode_image(&data).unwrap();

        assert_eq!(input.shape(), &[1, 256, 256, 3]);
        assert_eq!(input[[0, 10, 10, 0]], 255.0);
        assert_eq!(input[[0, 10, 10, 1]], 0.0);
        assert_eq!(input[[0, 255, 255, 2]], 0.0);
    }

    #[test]
    fn test_decode_non_square_jpeg() {
        let data = encode(512, 300, [20, 200, 40], ImageFormat::Jpeg);
        let input = decode_image(&data).unwrap();

        assert_eq!(input.shape(), &[1, 256, 256, 3]);
        assert!(input.iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let img = ImageBuffer::<image::Luma<u8>, Vec<u8>>::from_pixel(32, 64, image::Luma([77]));
        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();

        let input = decode_image(&data).unwrap();
        assert_eq!(input.shape(), &[1, 256, 256, 3]);
        assert_eq!(input[[0, 0, 0, 0]], 77.0);
        assert_eq!(input[[0, 0, 0, 2]], 77.0);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(DecodeError::Image(_))
        ));
        assert!(matches!(decode_image(&[]), Err(DecodeError::Empty)));
    }
}
