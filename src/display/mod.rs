#[cfg(feature = "preview")]
pub mod preview;

#[cfg(feature = "preview")]
pub use preview::PreviewWindow;
