// Live pipeline: sampling, detection channel, overlay and rendering.

pub mod channel;
pub mod controller;
pub mod error;
pub mod overlay;
pub mod protocol;
pub mod render;
pub mod sampler;
pub mod selector;

pub use controller::{Pipeline, PipelineConfig};
