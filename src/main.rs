//! roadcam: publish the X11 screen as roadCameraState frames

use std::path::PathBuf;

use color_eyre::{eyre::WrapErr, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use roadcam::capture::X11Source;
use roadcam::{utils, CaptureLoop, Config, PubSocket};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    let config_path = std::env::var_os("ROADCAM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(roadcam::CONFIG_FILE));
    let config = Config::load(&config_path)
        .wrap_err_with(|| format!("invalid configuration in {}", config_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()),
    );
    #[cfg(feature = "profiling")]
    let subscriber = subscriber.with(tracing_tracy::TracyLayer::default());
    subscriber.init();

    info!("roadcam v{} launching...", env!("CARGO_PKG_VERSION"));

    // No display means nothing to do.
    let display = utils::detect_display(config.capture.display.as_deref())?;
    let source = X11Source::connect(&display)
        .wrap_err_with(|| format!("cannot open display {display}"))?;

    let publisher = PubSocket::bind(&config.publish.topic, config.publish.socket_addr()).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(utils::shutdown_signal(shutdown.clone()));

    let capture_loop = CaptureLoop::new(source, publisher, &config.pipeline);

    let stats = if config.preview.enabled {
        run_with_preview(capture_loop, &config, shutdown).await?
    } else {
        capture_loop.run(shutdown).await?
    };

    info!(
        iterations = stats.iterations,
        published = stats.published,
        capture_failures = stats.capture_failures,
        overruns = stats.overruns,
        "roadcam shutting down"
    );
    Ok(())
}

#[cfg(feature = "preview")]
async fn run_with_preview(
    capture_loop: CaptureLoop<X11Source, PubSocket>,
    config: &Config,
    shutdown: CancellationToken,
) -> Result<roadcam::LoopStats> {
    use color_eyre::eyre::eyre;
    use roadcam::display::PreviewWindow;

    let (tx, rx) = flume::bounded(1);
    let capture_handle = tokio::spawn(capture_loop.with_preview(tx).run(shutdown.clone()));

    // SDL wants the thread it was initialised on; stay on the main thread.
    let preview_config = config.preview.clone();
    tokio::task::block_in_place(|| -> Result<()> {
        let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
        let mut window = PreviewWindow::new(&sdl_context, &preview_config)?;
        window.run(&sdl_context, rx, &shutdown)
    })?;

    Ok(capture_handle.await??)
}

#[cfg(not(feature = "preview"))]
async fn run_with_preview(
    capture_loop: CaptureLoop<X11Source, PubSocket>,
    _config: &Config,
    shutdown: CancellationToken,
) -> Result<roadcam::LoopStats> {
    tracing::warn!("Preview requested but roadcam was built without the `preview` feature");
    Ok(capture_loop.run(shutdown).await?)
}
