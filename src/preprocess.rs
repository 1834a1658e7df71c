use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use ndarray::Array4;

use crate::error::DetectError;

pub const IMAGE_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

/// Where the bytes of an upload came from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Raw file contents from a multipart upload.
    Bytes(Vec<u8>),
    /// `data:image/jpeg;base64,...` as produced by `canvas.toDataURL()`.
    DataUri(String),
}

impl ImageSource {
    pub fn into_bytes(self) -> Result<Vec<u8>, DetectError> {
        match self {
            ImageSource::Bytes(bytes) => Ok(bytes),
            ImageSource::DataUri(uri) => decode_data_uri(&uri),
        }
    }
}

/// Decodes the base64 payload of a data URI. A string without a comma is
/// taken to be bare base64.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, DetectError> {
    let payload = match uri.split_once(',') {
        Some((header, payload)) => {
            if !header.ends_with(";base64") {
                return Err(DetectError::DataUri(format!(
                    "expected a base64 data URI, got header {:?}",
                    header
                )));
            }
            payload
        }
        None => uri,
    };

    Ok(general_purpose::STANDARD.decode(payload.trim())?)
}

/// File extension implied by a data URI media type, if it names an image.
pub fn data_uri_extension(uri: &str) -> Option<&'static str> {
    let media_type = uri.strip_prefix("data:")?.split([';', ',']).next()?;
    match media_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Decodes an image and turns it into the `[1, 224, 224, 3]` batch the
/// classifier expects, with channels scaled into `[0, 1]`.
pub fn preprocess_image(image_data: &[u8]) -> Result<Array4<f32>, DetectError> {
    let img = image::load_from_memory(image_data)?;

    // to_rgb8 drops alpha and expands grayscale
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::Nearest);

    let size = IMAGE_SIZE as usize;
    let batch = Array4::from_shape_fn((1, size, size, CHANNELS), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Luma, Rgba};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn rgba_png_becomes_normalized_batch() {
        let img = ImageBuffer::from_pixel(64, 48, Rgba([255u8, 0, 51, 10]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageOutputFormat::Png);

        let batch = preprocess_image(&bytes).unwrap();

        assert_eq!(batch.ndim(), 4);
        assert_eq!(batch.shape(), &[1, 224, 224, 3]);
        assert!(batch.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(batch[[0, 10, 10, 0]], 1.0);
        assert_eq!(batch[[0, 10, 10, 1]], 0.0);
        assert!((batch[[0, 223, 223, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let img = ImageBuffer::from_pixel(300, 500, Luma([128u8]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageOutputFormat::Png);

        let batch = preprocess_image(&bytes).unwrap();

        assert_eq!(batch.shape(), &[1, 224, 224, 3]);
        let v = batch[[0, 100, 100, 0]];
        assert_eq!(v, batch[[0, 100, 100, 1]]);
        assert_eq!(v, batch[[0, 100, 100, 2]]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = preprocess_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DetectError::Decode(_)));
    }

    #[test]
    fn data_uri_round_trips_to_image() {
        let img = ImageBuffer::from_pixel(8, 8, image::Rgb([0u8, 200, 0]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageOutputFormat::Png);
        let uri = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&bytes)
        );

        let decoded = ImageSource::DataUri(uri.clone()).into_bytes().unwrap();
        assert_eq!(decoded, bytes);
        assert_eq!(data_uri_extension(&uri), Some("png"));
        assert!(preprocess_image(&decoded).is_ok());
    }

    #[test]
    fn data_uri_without_base64_marker_is_rejected() {
        let err = decode_data_uri("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, DetectError::DataUri(_)));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(DetectError::Base64(_))
        ));
    }

    #[test]
    fn unknown_media_type_has_no_extension() {
        assert_eq!(data_uri_extension("data:image/jpeg;base64,AAAA"), Some("jpg"));
        assert_eq!(data_uri_extension("data:application/pdf;base64,AAAA"), None);
        assert_eq!(data_uri_extension("AAAA"), None);
    }
}
