use clap::Parser;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = fallcam_lib::config::Config::parse();
    tracing::info!(
        "fallcam starting (socket {}, detect {}, users {})",
        config.ws_url,
        config.detect_api,
        config.users_api
    );
    fallcam_lib::run(config).await
}
