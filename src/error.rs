//! Error types for the capture pipeline.
//!
//! Capture failures are recoverable per frame, envelope failures are
//! contract violations between components, and publish failures only
//! happen while setting up the endpoint.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError};

/// Failures of the display snapshot source.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Neither a configured display nor `$DISPLAY` names an X server.
    #[error("no X11 display available: {0}")]
    NoDisplay(String),

    /// The X server could not be reached at startup.
    #[error("failed to connect to display: {0}")]
    Connect(#[from] ConnectError),

    /// The connection broke while a request was in flight.
    #[error("display connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The server answered a request with an error.
    #[error("display request failed: {0}")]
    Reply(#[from] ReplyError),

    /// The server returned no image data.
    #[error("display returned an empty image for {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// The image data is shorter than the geometry implies.
    #[error("short image: expected {expected} bytes, got {actual}")]
    ShortImage { expected: usize, actual: usize },

    /// The pixmap format is not 24 or 32 bits per pixel.
    #[error("unsupported pixmap format: depth {depth}, {bits_per_pixel} bpp")]
    UnsupportedFormat { depth: u8, bits_per_pixel: u8 },

    /// The blocking capture task panicked or was cancelled.
    #[error("capture task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Failures building or reading an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Pixel buffer is smaller than `stride * height`.
    #[error("pixel buffer too short: need {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },

    #[error("failed to serialize envelope: {0}")]
    Serialize(String),

    #[error("failed to decode envelope: {0}")]
    Decode(String),
}

/// Failures of the publish endpoint.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to bind publisher for {topic} on {addr}: {source}")]
    Bind {
        topic: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("publish socket I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Failures that stop the capture loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("envelope contract violated: {0}")]
    Envelope(#[from] EnvelopeError),
}
