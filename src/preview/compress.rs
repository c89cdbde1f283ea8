use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};

use crate::preview::capture::Frame;

/// MIME prefix of an inline JPEG data URI.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Compress raw RGB pixel data to JPEG at the given quality (1-100).
///
/// Returns `None` when the buffer does not match the dimensions or the
/// encoder fails.
pub fn compress_jpeg(data: &[u8], width: u32, height: u32, quality: u8) -> Option<Vec<u8>> {
    let img: ImageBuffer<Rgb<u8>, _> = ImageBuffer::from_raw(width, height, data)?;

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    match img.write_with_encoder(encoder) {
        Ok(()) => Some(buf),
        Err(e) => {
            tracing::warn!("JPEG encoding failed: {e}");
            None
        }
    }
}

/// Encode a frame as a JPEG data URI, the payload format of the detection socket.
pub fn frame_to_data_uri(frame: &Frame, quality: u8) -> Option<String> {
    let jpeg = compress_jpeg(&frame.data, frame.width, frame.height, quality)?;
    Some(to_data_uri(&jpeg))
}

/// Wrap JPEG bytes in a `data:image/jpeg;base64,` URI.
pub fn to_data_uri(jpeg: &[u8]) -> String {
    let mut uri = String::with_capacity(JPEG_DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    uri.push_str(JPEG_DATA_URI_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(jpeg, &mut uri);
    uri
}

/// Decode a base64 JPEG (bare or data-URI wrapped) into a frame.
pub fn decode_jpeg_b64(encoded: &str) -> Option<Frame> {
    let bare = match encoded.split_once(',') {
        Some((header, body)) if header.starts_with("data:image") => body,
        _ => encoded,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(bare.trim())
        .ok()?;
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg).ok()?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(rgb.into_raw(), width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a synthetic RGB test image (gradient pattern).
    fn make_test_rgb(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x % 256) as u8);
                data.push((y % 256) as u8);
                data.push(128);
            }
        }
        data
    }

    #[test]
    fn compress_jpeg_produces_valid_jpeg_bytes() {
        let rgb = make_test_rgb(64, 48);
        let jpeg = compress_jpeg(&rgb, 64, 48, 50).unwrap();
        assert_eq!(jpeg[0], 0xFF);
        assert_eq!(jpeg[1], 0xD8);
    }

    #[test]
    fn compress_jpeg_rejects_short_buffer() {
        assert!(compress_jpeg(&[0u8; 12], 64, 48, 50).is_none());
    }

    #[test]
    fn compress_jpeg_lower_quality_produces_smaller_output() {
        let rgb = make_test_rgb(640, 480);
        let high = compress_jpeg(&rgb, 640, 480, 90).unwrap();
        let low = compress_jpeg(&rgb, 640, 480, 50).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn data_uri_has_jpeg_prefix() {
        let frame = Frame::new(make_test_rgb(16, 16), 16, 16).unwrap();
        let uri = frame_to_data_uri(&frame, 50).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn decode_accepts_bare_and_wrapped_base64() {
        let frame = Frame::new(make_test_rgb(16, 8), 16, 8).unwrap();
        let uri = frame_to_data_uri(&frame, 80).unwrap();
        let bare = uri.trim_start_matches(JPEG_DATA_URI_PREFIX);

        let from_uri = decode_jpeg_b64(&uri).unwrap();
        let from_bare = decode_jpeg_b64(bare).unwrap();
        assert_eq!(from_uri.dimensions(), (16, 8));
        assert_eq!(from_bare.dimensions(), (16, 8));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_jpeg_b64("not base64 at all!").is_none());
        assert!(decode_jpeg_b64("aGVsbG8=").is_none());
    }
}
