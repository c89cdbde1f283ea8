use parking_lot::Mutex;
use std::sync::Arc;

/// A single decoded video frame.
pub struct Frame {
    /// Raw pixel data (RGB24, row-major).
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Frame {
    /// Build a frame, checking that `data` holds exactly `width * height` RGB pixels.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    /// Native resolution of the frame.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The live video signal of one capture session.
///
/// Producers push decoded frames; readers only ever look at the newest one.
/// A small ring keeps the previous frames alive while a reader still holds
/// them, and frames are handed out as `Arc` so the renderer and the sampler
/// never copy pixel buffers.
pub struct FrameBuffer {
    slots: Mutex<Ring>,
}

struct Ring {
    frames: Vec<Option<Arc<Frame>>>,
    write_idx: usize,
}

impl FrameBuffer {
    /// Create a buffer holding up to `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(Ring {
                frames: (0..capacity).map(|_| None).collect(),
                write_idx: 0,
            }),
        }
    }

    /// Push a new frame, overwriting the oldest slot.
    pub fn push(&self, frame: Frame) {
        let mut ring = self.slots.lock();
        let idx = ring.write_idx;
        ring.frames[idx] = Some(Arc::new(frame));
        ring.write_idx = (idx + 1) % ring.frames.len();
    }

    /// The most recently pushed frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        let ring = self.slots.lock();
        let len = ring.frames.len();
        let idx = (ring.write_idx + len - 1) % len;
        ring.frames[idx].clone()
    }
}
