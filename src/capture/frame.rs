use bytes::Bytes;
use std::time::Instant;

/// Row length in bytes for `width` pixels, padded to a 4-byte boundary.
pub const fn stride(width: u32, bytes_per_pixel: u32) -> usize {
    ((width as usize * bytes_per_pixel as usize) + 3) & !3
}

/// One captured display snapshot.
///
/// `data` holds exactly `meta.stride * meta.height` bytes. Cloning is
/// cheap and shares the pixel buffer read-only.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    /// Bits per pixel reported by the display server for the raw image.
    pub source_bits_per_pixel: u8,
}

/// Pixel layouts a published frame can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed blue, green, red; rows padded to 4 bytes.
    Bgr24,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Bgr24 => 3,
        }
    }
}

impl Frame {
    /// Wrap a packed BGR buffer. `data` must be `stride(width, 3) * height` long.
    pub fn bgr24(data: Bytes, width: u32, height: u32, source_bits_per_pixel: u8) -> Self {
        let format = PixelFormat::Bgr24;
        Self {
            data,
            meta: FrameMetadata {
                width,
                height,
                stride: stride(width, format.bytes_per_pixel()) as u32,
                format,
                source_bits_per_pixel,
            },
            timestamp: Instant::now(),
        }
    }

    /// Bytes the image occupies, padding included.
    pub fn byte_len(&self) -> usize {
        self.meta.stride as usize * self.meta.height as usize
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.meta.format.bytes_per_pixel()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_pads_rows_to_four_bytes() {
        assert_eq!(stride(1024, 3), 3072);
        assert_eq!(stride(1, 3), 4);
        assert_eq!(stride(2, 3), 8);
        assert_eq!(stride(5, 3), 16);
        assert_eq!(stride(7, 4), 28);
        assert_eq!(stride(0, 3), 0);
    }

    #[test]
    fn xga_payload_size() {
        let frame = Frame::bgr24(Bytes::from(vec![0u8; 3072 * 768]), 1024, 768, 32);
        assert_eq!(frame.meta.stride, 3072);
        assert_eq!(frame.byte_len(), 2_359_296);
        assert_eq!(frame.data.len(), frame.byte_len());
    }
}
