//! Full-screen X11 capture through the core GetImage request

use std::sync::Arc;

use tracing::{debug, info, instrument};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, Window};
use x11rb::rust_connection::RustConnection;

use crate::capture::convert::{pack_bgr24, raw_layout};
use crate::capture::frame::Frame;
use crate::capture::SnapshotSource;
use crate::error::CaptureError;

/// Root-window snapshot source.
///
/// The connection is opened once and closed when the source is dropped.
/// Requests run on the blocking pool so a slow server never stalls a
/// runtime worker.
pub struct X11Source {
    conn: Arc<RustConnection>,
    root: Window,
    display: String,
}

impl X11Source {
    /// Connect to the X server named by `name` (e.g. `:0`).
    pub fn connect(name: &str) -> Result<Self, CaptureError> {
        info!("Connecting to X11 display {}", name);

        let (conn, screen_num) = x11rb::connect(Some(name))?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        info!(
            "Display {}: screen {} is {}x{} at depth {}",
            name, screen_num, screen.width_in_pixels, screen.height_in_pixels, screen.root_depth
        );

        Ok(Self {
            conn: Arc::new(conn),
            root,
            display: name.to_owned(),
        })
    }
}

fn grab(conn: &RustConnection, root: Window) -> Result<Frame, CaptureError> {
    // Geometry is re-read every frame; the root window may be resized.
    let geometry = conn.get_geometry(root)?.reply()?;
    let width = u32::from(geometry.width);
    let height = u32::from(geometry.height);

    // The reply owns its buffer, so the server image is released on
    // every return path below.
    let image = conn
        .get_image(
            ImageFormat::Z_PIXMAP,
            root,
            0,
            0,
            geometry.width,
            geometry.height,
            !0,
        )?
        .reply()?;

    if image.data.is_empty() {
        return Err(CaptureError::EmptyImage { width, height });
    }

    let setup = conn.setup();
    let format = setup
        .pixmap_formats
        .iter()
        .find(|f| f.depth == image.depth)
        .ok_or(CaptureError::UnsupportedFormat {
            depth: image.depth,
            bits_per_pixel: 0,
        })?;

    let layout = raw_layout(
        width,
        height,
        image.depth,
        format.bits_per_pixel,
        format.scanline_pad,
        setup.image_byte_order.into(),
    );
    let data = pack_bgr24(&image.data, &layout)?;

    debug!(
        width,
        height,
        source_bpp = format.bits_per_pixel,
        row_bytes = layout.row_bytes,
        "Captured root window"
    );
    Ok(Frame::bgr24(data, width, height, format.bits_per_pixel))
}

impl SnapshotSource for X11Source {
    #[instrument(skip(self), fields(display = %self.display))]
    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        let conn = Arc::clone(&self.conn);
        let root = self.root;
        tokio::task::spawn_blocking(move || grab(&conn, root)).await?
    }
}
