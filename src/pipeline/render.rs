use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect as ImageRect;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::camera::source::VideoSignal;
use crate::diagnostics::stats::PipelineStats;
use crate::pipeline::overlay::OverlayState;
use crate::pipeline::protocol::DetectionBox;
use crate::preview::capture::Frame;

/// Stroke and label colour of `fall` boxes.
pub const FALL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Stroke and label colour of every other class.
pub const DEFAULT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LINE_WIDTH: u32 = 3;

/// A display surface the render loop paints onto.
pub trait Surface: Send {
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    /// Paint `frame` at the origin, covering the previous contents.
    fn draw_frame(&mut self, frame: &Frame);

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb<u8>, line: u32);

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgb<u8>);

    /// Copy of the painted pixels, for surfaces backed by memory.
    fn to_image(&self) -> Option<RgbImage> {
        None
    }
}

/// The surface slot shared by the render loop, the sampler and the owner.
pub type SharedSurface = Arc<Mutex<Option<Box<dyn Surface>>>>;

pub fn color_for(cls: &str) -> Rgb<u8> {
    if cls == crate::pipeline::protocol::FALL_CLASS {
        FALL_COLOR
    } else {
        DEFAULT_COLOR
    }
}

/// Paint every box with its label. Coordinates are used as-is, in the
/// surface's pixel space.
pub fn paint_overlay(surface: &mut dyn Surface, boxes: &[DetectionBox]) {
    for detection in boxes {
        let color = color_for(&detection.cls);
        surface.stroke_rect(
            detection.x1,
            detection.y1,
            detection.x2 - detection.x1,
            detection.y2 - detection.y1,
            color,
            LINE_WIDTH,
        );
        surface.fill_text(
            &detection.label(),
            detection.x1 + 5.0,
            detection.y1 - 5.0,
            color,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Painted,
    /// No capture session or no frame yet.
    NoVideo,
    NoSurface,
}

/// One draw cycle: match the surface to the video's native resolution,
/// paint the newest frame, then the current overlay.
pub fn render_cycle(
    signal: &VideoSignal,
    overlay: &OverlayState,
    surface: &SharedSurface,
) -> CycleOutcome {
    let Some(frame) = signal.latest_frame() else {
        return CycleOutcome::NoVideo;
    };
    let mut slot = surface.lock();
    let Some(surface) = slot.as_mut() else {
        return CycleOutcome::NoSurface;
    };

    let (width, height) = frame.dimensions();
    if surface.size() != (width, height) {
        surface.resize(width, height);
    }
    surface.draw_frame(&frame);
    paint_overlay(surface.as_mut(), overlay.read().boxes());
    CycleOutcome::Painted
}

/// The continuously rescheduled draw cycle.
///
/// Outlives capture sessions; only [`RenderLoop::stop`] ends it.
pub struct RenderLoop {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl RenderLoop {
    pub fn spawn(
        period: Duration,
        signal: VideoSignal,
        overlay: Arc<OverlayState>,
        surface: SharedSurface,
        stats: Arc<Mutex<PipelineStats>>,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_task = Arc::clone(&cancelled);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if cancelled_task.load(Ordering::Acquire) {
                    break;
                }
                let outcome = render_cycle(&signal, &overlay, &surface);
                stats
                    .lock()
                    .record_render(outcome == CycleOutcome::Painted);
            }
            tracing::debug!("render loop stopped");
        });
        Self {
            cancelled,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Set the cancellation flag and wait for the current cycle to finish.
    pub async fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A label painted next to a box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub color: Rgb<u8>,
}

/// Pixel height of box labels.
pub const LABEL_SIZE: f32 = 16.0;

/// Fonts tried when none is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Font used to rasterise box labels. Cheap to clone.
#[derive(Clone)]
pub struct LabelFont(Arc<FontVec>);

impl LabelFont {
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        FontVec::try_from_vec(bytes).ok().map(|font| Self(Arc::new(font)))
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not a usable font", path.display()),
            )
        })
    }

    /// Load `configured`, or the first installed system font.
    ///
    /// Returns `None` when nothing loads; labels are then kept as text only.
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(font) => return Some(font),
                Err(e) => tracing::warn!("label font {}: {e}", path.display()),
            }
        }
        let found = SYSTEM_FONTS
            .iter()
            .find_map(|path| Self::load(Path::new(path)).ok());
        if found.is_none() {
            tracing::warn!("no label font found; box labels will not be drawn (set --font)");
        }
        found
    }

    fn ascent(&self) -> f32 {
        self.0.as_scaled(PxScale::from(LABEL_SIZE)).ascent()
    }
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LabelFont")
    }
}

/// Clamp a canvas coordinate into `-margin..=limit + margin` so geometry
/// far off the surface still casts to a small integer.
fn clamp_coord(value: f64, limit: u32, margin: u32) -> i32 {
    let margin = f64::from(margin);
    value.round().clamp(-margin, f64::from(limit) + margin) as i32
}

/// In-memory RGB surface.
///
/// Rectangles and, when a font is available, labels are rasterised into the
/// pixel buffer. Labels are also kept as positioned text, reset with every
/// new frame.
pub struct RasterSurface {
    image: RgbImage,
    labels: Vec<TextLabel>,
    font: Option<LabelFont>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
            labels: Vec::new(),
            font: None,
        }
    }

    pub fn with_font(mut self, font: Option<LabelFont>) -> Self {
        self.font = font;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn labels(&self) -> &[TextLabel] {
        &self.labels
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbImage::new(width, height);
        self.labels.clear();
    }

    fn draw_frame(&mut self, frame: &Frame) {
        self.labels.clear();
        if self.image.dimensions() == frame.dimensions() {
            self.image.copy_from_slice(&frame.data);
        } else if let Some(image) = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        {
            self.image = image;
        }
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb<u8>, line: u32) {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return;
        }
        let line = line.max(1);
        let half = (line / 2) as i32;
        let (w, h) = self.image.dimensions();
        // Edges beyond the margin are off-surface whatever their exact value.
        let margin = line + 1;
        let (left, right) = (
            clamp_coord(x.min(x + width), w, margin),
            clamp_coord(x.max(x + width), w, margin),
        );
        let (top, bottom) = (
            clamp_coord(y.min(y + height), h, margin),
            clamp_coord(y.max(y + height), h, margin),
        );

        // Stroke centred on the outline, like a 2D canvas: `line` nested
        // one-pixel outlines from the outer edge inwards.
        for inset in 0..line as i32 {
            let x0 = left - half + inset;
            let y0 = top - half + inset;
            let rect_w = right - left + 2 * half + 1 - 2 * inset;
            let rect_h = bottom - top + 2 * half + 1 - 2 * inset;
            if rect_w <= 0 || rect_h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut self.image,
                ImageRect::at(x0, y0).of_size(rect_w as u32, rect_h as u32),
                color,
            );
        }
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgb<u8>) {
        self.labels.push(TextLabel {
            text: text.to_string(),
            x,
            y,
            color,
        });
        let Some(font) = &self.font else {
            return;
        };
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let (w, h) = self.image.dimensions();
        // `y` is the baseline; imageproc positions text by its top edge.
        let top = y - f64::from(font.ascent());
        let margin = (LABEL_SIZE as u32).saturating_mul(text.len().max(1) as u32);
        draw_text_mut(
            &mut self.image,
            color,
            clamp_coord(x, w, margin),
            clamp_coord(top, h, margin),
            PxScale::from(LABEL_SIZE),
            font.0.as_ref(),
            text,
        );
    }

    fn to_image(&self) -> Option<RgbImage> {
        Some(self.image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::capture::FrameBuffer;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Resize(u32, u32),
        Frame(u32, u32),
        Rect(f64, f64, f64, f64, Rgb<u8>),
        Text(String, f64, f64, Rgb<u8>),
    }

    /// Surface recording every call, shared with the test through an Arc.
    struct RecordingSurface {
        size: (u32, u32),
        ops: Arc<Mutex<Vec<Op>>>,
    }

    impl Surface for RecordingSurface {
        fn size(&self) -> (u32, u32) {
            self.size
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.size = (width, height);
            self.ops.lock().push(Op::Resize(width, height));
        }
        fn draw_frame(&mut self, frame: &Frame) {
            self.ops.lock().push(Op::Frame(frame.width, frame.height));
        }
        fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgb<u8>, _line: u32) {
            self.ops.lock().push(Op::Rect(x, y, w, h, color));
        }
        fn fill_text(&mut self, text: &str, x: f64, y: f64, color: Rgb<u8>) {
            self.ops.lock().push(Op::Text(text.to_string(), x, y, color));
        }
    }

    fn recording_surface() -> (SharedSurface, Arc<Mutex<Vec<Op>>>) {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let surface: Box<dyn Surface> = Box::new(RecordingSurface {
            size: (0, 0),
            ops: Arc::clone(&ops),
        });
        (Arc::new(Mutex::new(Some(surface))), ops)
    }

    fn live_signal(width: u32, height: u32) -> VideoSignal {
        let signal = VideoSignal::new();
        let buffer = Arc::new(FrameBuffer::new(1));
        let data = vec![20; (width * height * 3) as usize];
        buffer.push(Frame::new(data, width, height).unwrap());
        signal.attach(buffer);
        signal
    }

    fn fall_box() -> DetectionBox {
        DetectionBox {
            x1: 10.0,
            y1: 10.0,
            x2: 50.0,
            y2: 50.0,
            conf: 0.91,
            cls: "fall".to_string(),
        }
    }

    #[test]
    fn fall_box_paints_red_rect_and_label() {
        let (surface, ops) = recording_surface();
        let overlay = OverlayState::new();
        overlay.replace(vec![fall_box()]);

        let outcome = render_cycle(&live_signal(64, 64), &overlay, &surface);

        assert_eq!(outcome, CycleOutcome::Painted);
        assert_eq!(
            *ops.lock(),
            vec![
                Op::Resize(64, 64),
                Op::Frame(64, 64),
                Op::Rect(10.0, 10.0, 40.0, 40.0, FALL_COLOR),
                Op::Text("fall (91.0%)".to_string(), 15.0, 5.0, FALL_COLOR),
            ]
        );
    }

    #[test]
    fn other_classes_use_default_color() {
        assert_eq!(color_for("person"), DEFAULT_COLOR);
        assert_eq!(color_for("Fall"), DEFAULT_COLOR);
        assert_eq!(color_for("fall"), FALL_COLOR);
    }

    #[test]
    fn surface_resizes_only_on_resolution_change() {
        let (surface, ops) = recording_surface();
        let overlay = OverlayState::new();
        render_cycle(&live_signal(32, 24), &overlay, &surface);
        render_cycle(&live_signal(32, 24), &overlay, &surface);
        render_cycle(&live_signal(16, 8), &overlay, &surface);

        let resizes: Vec<_> = ops
            .lock()
            .iter()
            .filter(|op| matches!(op, Op::Resize(..)))
            .cloned()
            .collect();
        assert_eq!(resizes, vec![Op::Resize(32, 24), Op::Resize(16, 8)]);
    }

    #[test]
    fn cycle_without_video_or_surface_skips_paint() {
        let (surface, ops) = recording_surface();
        let overlay = OverlayState::new();
        assert_eq!(
            render_cycle(&VideoSignal::new(), &overlay, &surface),
            CycleOutcome::NoVideo
        );
        assert!(ops.lock().is_empty());

        let detached: SharedSurface = Arc::new(Mutex::new(None));
        assert_eq!(
            render_cycle(&live_signal(4, 4), &overlay, &detached),
            CycleOutcome::NoSurface
        );
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_running_without_video() {
        let stats = Arc::new(Mutex::new(PipelineStats::new()));
        let (surface, _) = recording_surface();
        let mut render = RenderLoop::spawn(
            Duration::from_millis(16),
            VideoSignal::new(),
            Arc::new(OverlayState::new()),
            surface,
            Arc::clone(&stats),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(render.is_running());
        let snap = stats.lock().snapshot();
        assert!(snap.render_cycles >= 5);
        assert_eq!(snap.painted_cycles, 0);

        render.stop().await;
        assert!(!render.is_running());
        let cycles = stats.lock().render_cycles();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.lock().render_cycles(), cycles);
    }

    #[test]
    fn raster_surface_strokes_inside_bounds() {
        let mut surface = RasterSurface::new(64, 64);
        surface.stroke_rect(10.0, 10.0, 40.0, 40.0, FALL_COLOR, 3);
        assert_eq!(*surface.image().get_pixel(10, 10), FALL_COLOR);
        assert_eq!(*surface.image().get_pixel(50, 30), FALL_COLOR);
        assert_eq!(*surface.image().get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn raster_surface_clips_out_of_bounds_rect() {
        let mut surface = RasterSurface::new(8, 8);
        surface.stroke_rect(-20.0, -20.0, 100.0, 100.0, DEFAULT_COLOR, 3);
        surface.stroke_rect(1000.0, 1000.0, 5.0, 5.0, DEFAULT_COLOR, 3);
        assert_eq!(surface.size(), (8, 8));
    }

    fn huge_box() -> DetectionBox {
        DetectionBox {
            x1: -1e300,
            y1: 10.0,
            x2: 30.0,
            y2: 1e300,
            conf: 0.5,
            cls: "fall".to_string(),
        }
    }

    #[test]
    fn huge_coordinates_are_clamped() {
        let mut surface = RasterSurface::new(64, 64);
        paint_overlay(&mut surface, &[huge_box()]);
        // The right and top edges are on the surface; the others are not.
        assert_eq!(*surface.image().get_pixel(30, 40), FALL_COLOR);
        assert_eq!(*surface.image().get_pixel(20, 10), FALL_COLOR);
        assert_eq!(*surface.image().get_pixel(0, 40), Rgb([0, 0, 0]));
        assert_eq!(surface.labels().len(), 1);
    }

    #[test]
    fn non_finite_geometry_is_skipped() {
        let mut surface = RasterSurface::new(8, 8);
        surface.stroke_rect(f64::NAN, 0.0, 4.0, 4.0, FALL_COLOR, 3);
        surface.stroke_rect(0.0, 0.0, f64::INFINITY, 4.0, FALL_COLOR, 3);
        assert!(surface.image().pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_huge_box() {
        let stats = Arc::new(Mutex::new(PipelineStats::new()));
        let overlay = Arc::new(OverlayState::new());
        overlay.replace(vec![huge_box()]);
        let raster: Box<dyn Surface> = Box::new(RasterSurface::new(1, 1));
        let surface: SharedSurface = Arc::new(Mutex::new(Some(raster)));
        let mut render = RenderLoop::spawn(
            Duration::from_millis(16),
            live_signal(64, 48),
            overlay,
            Arc::clone(&surface),
            Arc::clone(&stats),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(render.is_running());
        assert!(stats.lock().snapshot().painted_cycles >= 2);
        let image = surface.lock().as_ref().and_then(|s| s.to_image()).unwrap();
        assert_eq!(*image.get_pixel(30, 20), FALL_COLOR);

        render.stop().await;
    }

    #[test]
    fn labels_are_rasterised_with_a_font() {
        // Hosts without any system font only keep the text record.
        let Some(font) = LabelFont::discover(None) else {
            return;
        };
        let mut surface = RasterSurface::new(160, 40).with_font(Some(font));
        surface.fill_text("fall (91.0%)", 5.0, 25.0, FALL_COLOR);
        assert!(surface.image().pixels().any(|p| p.0[0] > 128));
        assert_eq!(surface.labels()[0].text, "fall (91.0%)");
    }

    #[test]
    fn invalid_font_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        let err = LabelFont::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn raster_surface_frame_resets_labels() {
        let mut surface = RasterSurface::new(2, 2);
        surface.fill_text("person (50.0%)", 1.0, 1.0, DEFAULT_COLOR);
        assert_eq!(surface.labels().len(), 1);

        let frame = Frame::new(vec![7; 12], 2, 2).unwrap();
        surface.draw_frame(&frame);
        assert!(surface.labels().is_empty());
        assert_eq!(*surface.image().get_pixel(1, 1), Rgb([7, 7, 7]));
    }
}
