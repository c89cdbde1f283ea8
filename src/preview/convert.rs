use crate::preview::capture::Frame;

/// Pixel layouts a capture device may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 8-bit RGB, `RGB3`.
    Rgb24,
    /// Packed 4:2:2 YUV, `YUYV`.
    Yuyv,
    /// One JPEG per buffer, `MJPG`.
    Mjpeg,
}

impl PixelLayout {
    /// Layout for a V4L2 FourCC code, if supported.
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            _ => None,
        }
    }

    /// Convert one device buffer into an RGB frame.
    ///
    /// Trailing driver padding is ignored. Returns `None` for short or
    /// undecodable buffers.
    pub fn to_frame(self, buf: &[u8], width: u32, height: u32) -> Option<Frame> {
        let pixels = width as usize * height as usize;
        match self {
            Self::Rgb24 => Frame::new(buf.get(..pixels * 3)?.to_vec(), width, height),
            Self::Yuyv => Frame::new(yuyv_to_rgb(buf.get(..pixels * 2)?), width, height),
            Self::Mjpeg => {
                let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg).ok()?;
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                Frame::new(rgb.into_raw(), width, height)
            }
        }
    }
}

/// BT.601 YUYV to RGB, two pixels per four bytes.
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for chunk in yuyv.chunks_exact(4) {
        let (u, v) = (i32::from(chunk[1]) - 128, i32::from(chunk[3]) - 128);
        for y in [chunk[0], chunk[2]] {
            let y = i32::from(y);
            rgb.push(clamp_u8(y + ((359 * v) >> 8)));
            rgb.push(clamp_u8(y - ((88 * u + 183 * v) >> 8)));
            rgb.push(clamp_u8(y + ((454 * u) >> 8)));
        }
    }
    rgb
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
