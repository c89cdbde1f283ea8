use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::camera::types::StreamRequest;
use crate::pipeline::sampler::SamplerConfig;
use crate::pipeline::PipelineConfig;

/// Command-line configuration. Every flag can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fallcam",
    author,
    version,
    about = "Stream camera frames to a fall-detection service and overlay its results"
)]
pub struct Config {
    /// Detection socket URL.
    #[arg(long, env = "FALLCAM_WS_URL", default_value = "ws://localhost:8000/ws")]
    pub ws_url: String,

    /// Base URL of the detection service (settings, single-image upload).
    #[arg(long, env = "FALLCAM_DETECT_API", default_value = "http://localhost:8000")]
    pub detect_api: String,

    /// Base URL of the user service (subject list).
    #[arg(long, env = "FALLCAM_USERS_API", default_value = "http://localhost:5000")]
    pub users_api: String,

    /// Identifier sent with every frame.
    #[arg(long, env = "FALLCAM_CLIENT_ID", default_value = "frontend-user-123")]
    pub client_id: String,

    /// Interval between sampled frames, in milliseconds.
    #[arg(long, env = "FALLCAM_SAMPLE_PERIOD_MS", default_value_t = 1000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub sample_period_ms: u64,

    /// JPEG quality of sampled frames (1-100).
    #[arg(long, env = "FALLCAM_JPEG_QUALITY", default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Render loop rate, in cycles per second.
    #[arg(long, env = "FALLCAM_RENDER_FPS", default_value_t = 60,
          value_parser = clap::value_parser!(u32).range(1..=240))]
    pub render_fps: u32,

    /// Timeout for settings, subject and upload requests, in seconds.
    #[arg(long, env = "FALLCAM_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Use the built-in test pattern instead of a real camera
    /// (`DUMMY_CAMERA=1`, `true`, `yes` or `on`).
    #[arg(long, env = "DUMMY_CAMERA",
          value_parser = clap::builder::BoolishValueParser::new())]
    pub dummy_camera: bool,

    /// Video4Linux device node, used when built with `camera-v4l2`.
    #[arg(long, env = "FALLCAM_CAMERA_DEVICE", default_value = "/dev/video0")]
    pub camera_device: PathBuf,

    /// TrueType or OpenType font for box labels. Installed system fonts
    /// are tried when unset.
    #[arg(long, env = "FALLCAM_FONT")]
    pub font: Option<PathBuf>,

    /// Requested stream width.
    #[arg(long, env = "FALLCAM_WIDTH", default_value_t = 640)]
    pub width: u32,

    /// Requested stream height.
    #[arg(long, env = "FALLCAM_HEIGHT", default_value_t = 480)]
    pub height: u32,
}

impl Config {
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            ws_url: self.ws_url.clone(),
            sampler: SamplerConfig {
                period: Duration::from_millis(self.sample_period_ms),
                client_id: self.client_id.clone(),
                jpeg_quality: self.jpeg_quality,
            },
            render_period: Duration::from_secs(1) / self.render_fps.max(1),
            stream: StreamRequest {
                width: self.width,
                height: self.height,
                ..StreamRequest::default()
            },
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_layout() {
        let config = Config::try_parse_from(["fallcam"]).unwrap();
        assert_eq!(config.detect_api, "http://localhost:8000");
        assert_eq!(config.users_api, "http://localhost:5000");

        let pipeline = config.pipeline();
        assert_eq!(pipeline.sampler.period, Duration::from_secs(1));
        assert_eq!(pipeline.sampler.jpeg_quality, 50);
        assert_eq!(pipeline.stream.width, 640);
        assert_eq!(pipeline.stream.height, 480);
        assert_eq!(pipeline.render_period, Duration::from_secs(1) / 60);
        assert_eq!(config.camera_device, PathBuf::from("/dev/video0"));
        assert!(config.font.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "fallcam",
            "--ws-url",
            "ws://detector:9000/ws",
            "--client-id",
            "ward-3",
            "--sample-period-ms",
            "250",
            "--render-fps",
            "30",
        ])
        .unwrap();
        let pipeline = config.pipeline();
        assert_eq!(pipeline.ws_url, "ws://detector:9000/ws");
        assert_eq!(pipeline.sampler.client_id, "ward-3");
        assert_eq!(pipeline.sampler.period, Duration::from_millis(250));
        assert_eq!(pipeline.render_period, Duration::from_secs(1) / 30);
    }

    #[test]
    fn camera_and_font_flags() {
        let config = Config::try_parse_from([
            "fallcam",
            "--dummy-camera",
            "--camera-device",
            "/dev/video2",
            "--font",
            "/tmp/label.ttf",
        ])
        .unwrap();
        assert!(config.dummy_camera);
        assert_eq!(config.camera_device, PathBuf::from("/dev/video2"));
        assert_eq!(config.font, Some(PathBuf::from("/tmp/label.ttf")));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(Config::try_parse_from(["fallcam", "--jpeg-quality", "0"]).is_err());
        assert!(Config::try_parse_from(["fallcam", "--jpeg-quality", "101"]).is_err());
    }
}
