//! Uploaded image → base64 PNG wrapped in `ImageData`.
//!
//! Uploads arrive in whatever format the user had (JPEG photos of plots,
//! PNG screenshots). They are decoded and re-encoded as PNG so the provider
//! always receives one lossless format; axis labels and small print survive.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Decode `bytes` (PNG or JPEG) and re-encode as a base64 PNG.
pub fn encode_upload(bytes: &[u8]) -> Result<ImageData, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    encode_png(&img)
}

/// Encode an image as a base64 PNG with `detail: "high"`, so figure text is
/// not lost to a single low-resolution tile.
pub fn encode_png(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// `data:` URL for base64 PNG data.
pub fn png_data_url(b64: &str) -> String {
    format!("data:image/png;base64,{b64}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn jpeg_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([10, 200, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn jpeg_upload_becomes_png() {
        let data = encode_upload(&jpeg_bytes()).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn garbage_upload_is_rejected() {
        assert!(encode_upload(b"definitely not an image").is_err());
    }

    #[test]
    fn data_url_prefix() {
        assert_eq!(png_data_url("AAAA"), "data:image/png;base64,AAAA");
    }
}
