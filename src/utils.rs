use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CaptureError;

/// Pick the X display to capture.
///
/// A configured name wins, then `$DISPLAY`. A Wayland-only session has
/// no X root window to read from.
pub fn detect_display(configured: Option<&str>) -> Result<String, CaptureError> {
    resolve_display(
        configured,
        std::env::var("DISPLAY").ok().as_deref(),
        std::env::var_os("WAYLAND_DISPLAY").is_some(),
    )
}

fn resolve_display(
    configured: Option<&str>,
    env_display: Option<&str>,
    wayland: bool,
) -> Result<String, CaptureError> {
    if let Some(name) = configured.filter(|name| !name.is_empty()) {
        return Ok(name.to_owned());
    }
    if let Some(name) = env_display.filter(|name| !name.is_empty()) {
        info!("Using display {} from $DISPLAY", name);
        return Ok(name.to_owned());
    }
    if wayland {
        return Err(CaptureError::NoDisplay(
            "Wayland session without XWayland; set DISPLAY".into(),
        ));
    }
    Err(CaptureError::NoDisplay("DISPLAY is not set".into()))
}

/// Cancel `token` on Ctrl-C or SIGTERM.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
    token.cancel();
}
