use parking_lot::Mutex;
use std::sync::Arc;

use crate::pipeline::protocol::DetectionBox;

/// The boxes of the most recent detection result.
///
/// Immutable once published; readers share it through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySnapshot {
    boxes: Arc<[DetectionBox]>,
    /// Number of replacements that produced this snapshot (0 = initial).
    sequence: u64,
}

impl Default for OverlaySnapshot {
    fn default() -> Self {
        Self {
            boxes: Arc::from(Vec::new()),
            sequence: 0,
        }
    }
}

impl OverlaySnapshot {
    pub fn boxes(&self) -> &[DetectionBox] {
        &self.boxes
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Classes in paint order joined by `", "`, or `-` when nothing is detected.
    pub fn status_line(&self) -> String {
        if self.boxes.is_empty() {
            return "-".to_string();
        }
        self.boxes
            .iter()
            .map(|b| b.cls.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Single slot holding the current overlay. Last write wins.
///
/// Written only by the channel's inbound handler, read by the render loop.
#[derive(Default)]
pub struct OverlayState {
    current: Mutex<OverlaySnapshot>,
}

impl OverlayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot. Never merges with the previous value.
    pub fn replace(&self, boxes: Vec<DetectionBox>) {
        let mut current = self.current.lock();
        *current = OverlaySnapshot {
            boxes: boxes.into(),
            sequence: current.sequence + 1,
        };
    }

    /// The snapshot published by the most recent `replace`.
    pub fn read(&self) -> OverlaySnapshot {
        self.current.lock().clone()
    }
}
