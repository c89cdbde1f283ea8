pub mod api;
pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod pipeline;
pub mod preview;
pub mod settings;
pub mod shell;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use api::client::ApiClient;
use camera::backend::CameraBackend;
use camera::dummy::DummyBackend;
use config::Config;
use pipeline::render::{LabelFont, RasterSurface};
use pipeline::Pipeline;
use settings::store::RemoteSettingsStore;
use shell::{Reply, Shell};

/// Pick the camera backend for this host.
///
/// The test pattern is used when `--dummy-camera` (or `DUMMY_CAMERA`) is
/// set; otherwise the native backend compiled into this build.
pub fn create_camera_backend(config: &Config) -> Arc<dyn CameraBackend> {
    if config.dummy_camera {
        tracing::info!("using dummy camera");
        return Arc::new(DummyBackend::new());
    }
    native_camera_backend(config)
}

#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
fn native_camera_backend(config: &Config) -> Arc<dyn CameraBackend> {
    tracing::info!("using v4l2 camera {}", config.camera_device.display());
    Arc::new(camera::v4l2::V4l2Backend::new(config.camera_device.clone()))
}

#[cfg(not(all(feature = "camera-v4l2", target_os = "linux")))]
fn native_camera_backend(_config: &Config) -> Arc<dyn CameraBackend> {
    tracing::warn!(
        "no native camera backend in this build; pass --dummy-camera or build with --features camera-v4l2"
    );
    Arc::new(camera::backend::NullBackend)
}

/// Run the operator console until `quit`, end of input or Ctrl-C.
pub async fn run(config: Config) -> std::io::Result<()> {
    let font = LabelFont::discover(config.font.as_deref());
    let pipeline = Pipeline::create(config.pipeline(), create_camera_backend(&config));
    pipeline.attach_surface(Box::new(
        RasterSurface::new(config.width, config.height).with_font(font.clone()),
    ));

    let client = ApiClient::new(&config.detect_api, &config.users_api, config.http_timeout());
    let store = Arc::new(RemoteSettingsStore::new(client.clone()));
    let mut shell = Shell::new(pipeline, client, store).with_label_font(font);

    let mut stdout = tokio::io::stdout();
    for reply in shell.bootstrap().await {
        write_reply(&mut stdout, &reply).await?;
    }
    stdout
        .write_all(b"fallcam ready; type 'help' for commands\n")
        .await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let reply = shell.execute(&line).await;
        if reply == Reply::Quit {
            break;
        }
        write_reply(&mut stdout, &reply).await?;
    }

    shell.shutdown().await;
    Ok(())
}

async fn write_reply(out: &mut tokio::io::Stdout, reply: &Reply) -> std::io::Result<()> {
    match reply {
        Reply::Nothing | Reply::Quit => return Ok(()),
        Reply::Output(text) => out.write_all(format!("{text}\n").as_bytes()).await?,
        Reply::Notice(text) => out.write_all(format!("!! {text}\n").as_bytes()).await?,
    }
    out.flush().await
}
