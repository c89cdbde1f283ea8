use serde::Serialize;
use std::time::Instant;

/// Counters collected across the lifetime of a pipeline.
pub struct PipelineStats {
    frames_sent: u64,
    frames_skipped: u64,
    frames_dropped: u64,
    encode_failures: u64,
    results_applied: u64,
    parse_errors: u64,
    render_cycles: u64,
    painted_cycles: u64,
    bytes_sent: u64,
    start_time: Instant,
    last_result_time: Option<Instant>,
}

/// Snapshot of pipeline stats for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub frames_dropped: u64,
    pub encode_failures: u64,
    pub results_applied: u64,
    pub parse_errors: u64,
    pub render_cycles: u64,
    pub painted_cycles: u64,
    pub upload_bps: u64,
    pub render_fps: f64,
    pub ms_since_last_result: Option<u64>,
}

impl PipelineStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            frames_sent: 0,
            frames_skipped: 0,
            frames_dropped: 0,
            encode_failures: 0,
            results_applied: 0,
            parse_errors: 0,
            render_cycles: 0,
            painted_cycles: 0,
            bytes_sent: 0,
            start_time: Instant::now(),
            last_result_time: None,
        }
    }

    /// A frame submission handed to an open channel.
    pub fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// A tick that did not sample because the gate was closed.
    pub fn record_skipped(&mut self) {
        self.frames_skipped += 1;
    }

    /// A frame lost because the channel was not open.
    pub fn record_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub fn record_encode_failure(&mut self) {
        self.encode_failures += 1;
    }

    /// An inbound result replaced the overlay.
    pub fn record_result(&mut self) {
        self.results_applied += 1;
        self.last_result_time = Some(Instant::now());
    }

    pub fn record_parse_error(&mut self) {
        self.parse_errors += 1;
    }

    /// One render cycle; `painted` is false when the paint step was skipped.
    pub fn record_render(&mut self, painted: bool) {
        self.render_cycles += 1;
        if painted {
            self.painted_cycles += 1;
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn render_cycles(&self) -> u64 {
        self.render_cycles
    }

    /// Upload bandwidth in bytes per second.
    pub fn upload_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.bytes_sent as f64 / elapsed) as u64
    }

    /// Average render cycles per second since creation.
    pub fn render_fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.render_cycles as f64 / elapsed
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            frames_sent: self.frames_sent,
            frames_skipped: self.frames_skipped,
            frames_dropped: self.frames_dropped,
            encode_failures: self.encode_failures,
            results_applied: self.results_applied,
            parse_errors: self.parse_errors,
            render_cycles: self.render_cycles,
            painted_cycles: self.painted_cycles,
            upload_bps: self.upload_bps(),
            render_fps: self.render_fps(),
            ms_since_last_result: self
                .last_result_time
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
