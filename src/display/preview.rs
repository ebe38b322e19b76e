//! SDL2 debug preview of captured frames.
//! Shows whatever the capture loop last offered; it is fed through a
//! bounded channel and never slows capture down.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use flume::{Receiver, RecvTimeoutError};
use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::{Frame, PixelFormat};
use crate::PreviewConfig;

/// How long to wait for a frame before servicing window events again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// SDL2 preview window
pub struct PreviewWindow {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
}

impl PreviewWindow {
    pub fn new(sdl_context: &sdl2::Sdl, config: &PreviewConfig) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .build()?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();

        Ok(Self {
            canvas,
            texture_creator,
        })
    }

    pub fn render_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.meta.width == 0 || frame.meta.height == 0 {
            return Ok(());
        }
        let format = match frame.meta.format {
            PixelFormat::Bgr24 => PixelFormatEnum::BGR24,
        };

        let mut texture = self
            .texture_creator
            .create_texture_streaming(format, frame.meta.width, frame.meta.height)
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, &frame.data, frame.meta.stride as usize)
            .map_err(|e| eyre!(e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;

        self.canvas.present();

        metrics::histogram!("roadcam_preview_latency_ms")
            .record(frame.timestamp.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Show frames until the window is closed, the capture loop goes away
    /// or `shutdown` fires. Must run on the thread that initialised SDL.
    pub fn run(
        &mut self,
        sdl_context: &sdl2::Sdl,
        rx: Receiver<Frame>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let mut event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        'running: while !shutdown.is_cancelled() {
            for event in event_pump.poll_iter() {
                if let Event::Quit { .. } = event {
                    info!("Preview window closed");
                    break 'running;
                }
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => {
                    if let Err(e) = self.render_frame(&frame) {
                        warn!("Preview render failed: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(())
    }
}
