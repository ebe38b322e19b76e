pub mod convert;
pub mod frame;
pub mod x11;

use std::future::Future;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use x11::X11Source;

use crate::error::CaptureError;

/// Anything that can hand out a full-screen snapshot on demand.
pub trait SnapshotSource {
    /// Grab the current screen contents.
    ///
    /// Width and height are read fresh on every call. An `Err` means no
    /// frame this tick; the caller keeps going.
    fn capture(&mut self) -> impl Future<Output = Result<Frame, CaptureError>> + Send;
}
