//! Repacking of raw Z-pixmap rows into the published BGR layout

use bytes::{BufMut, Bytes, BytesMut};
use x11rb::protocol::xproto::ImageOrder;

use crate::capture::frame::stride;
use crate::error::CaptureError;

/// Byte order of multi-byte pixels in the server's image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

impl From<ImageOrder> for ByteOrder {
    fn from(order: ImageOrder) -> Self {
        if order == ImageOrder::MSB_FIRST {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        }
    }
}

/// Layout of the raw image as delivered by the display server.
#[derive(Debug, Clone, Copy)]
pub struct RawLayout {
    pub width: u32,
    pub height: u32,
    pub depth: u8,
    pub bits_per_pixel: u8,
    /// Source row length in bytes, including scanline padding.
    pub row_bytes: usize,
    pub byte_order: ByteOrder,
}

/// Describe a Z-pixmap image from its geometry and pixmap format.
///
/// Every source row is rounded up to a multiple of `scanline_pad` bits.
/// A pad below 8 is treated as byte padding.
pub fn raw_layout(
    width: u32,
    height: u32,
    depth: u8,
    bits_per_pixel: u8,
    scanline_pad: u8,
    byte_order: ByteOrder,
) -> RawLayout {
    let pad_bits = u64::from(scanline_pad.max(8));
    let row_bits = u64::from(width) * u64::from(bits_per_pixel);
    let row_bytes = (row_bits.div_ceil(pad_bits) * pad_bits / 8) as usize;

    RawLayout {
        width,
        height,
        depth,
        bits_per_pixel,
        row_bytes,
        byte_order,
    }
}

/// Copy `src` into a packed BGR buffer with 4-byte aligned rows.
///
/// The alpha/pad byte of 32 bpp sources is dropped; padding bytes at
/// the end of each output row are zero.
pub fn pack_bgr24(src: &[u8], layout: &RawLayout) -> Result<Bytes, CaptureError> {
    let src_bpp = match layout.bits_per_pixel {
        24 => 3,
        32 => 4,
        bits_per_pixel => {
            return Err(CaptureError::UnsupportedFormat {
                depth: layout.depth,
                bits_per_pixel,
            })
        }
    };

    let width = layout.width as usize;
    let height = layout.height as usize;
    let min_row = width * src_bpp;
    if layout.row_bytes < min_row {
        return Err(CaptureError::ShortImage {
            expected: min_row * height,
            actual: layout.row_bytes * height,
        });
    }
    // The last row may omit its scanline padding.
    let needed = if height == 0 {
        0
    } else {
        layout.row_bytes * (height - 1) + min_row
    };
    if src.len() < needed {
        return Err(CaptureError::ShortImage {
            expected: needed,
            actual: src.len(),
        });
    }

    let out_stride = stride(layout.width, 3);
    let pad = out_stride - width * 3;
    let mut out = BytesMut::with_capacity(out_stride * height);

    for y in 0..height {
        let row = &src[y * layout.row_bytes..y * layout.row_bytes + min_row];
        for px in row.chunks_exact(src_bpp) {
            // Output order is always B, G, R.
            match (src_bpp, layout.byte_order) {
                (4, ByteOrder::LsbFirst) | (3, ByteOrder::LsbFirst) => {
                    out.put_slice(&px[..3]);
                }
                (4, ByteOrder::MsbFirst) => {
                    out.put_slice(&[px[3], px[2], px[1]]);
                }
                _ => {
                    out.put_slice(&[px[2], px[1], px[0]]);
                }
            }
        }
        out.put_bytes(0, pad);
    }

    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(width: u32, height: u32, bpp: u8, order: ByteOrder) -> RawLayout {
        RawLayout {
            width,
            height,
            depth: 24,
            bits_per_pixel: bpp,
            row_bytes: width as usize * (bpp as usize / 8),
            byte_order: order,
        }
    }

    #[test]
    fn strips_fourth_byte_and_pads_rows() {
        // 2x2 BGRX
        let src = [
            1, 2, 3, 0xff, 4, 5, 6, 0xff, //
            7, 8, 9, 0xff, 10, 11, 12, 0xff,
        ];
        let out = pack_bgr24(&src, &layout(2, 2, 32, ByteOrder::LsbFirst)).unwrap();
        assert_eq!(
            &out[..],
            &[1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0]
        );
    }

    #[test]
    fn msb_first_is_reordered_to_bgr() {
        // XRGB
        let src = [0xff, 30, 20, 10];
        let out = pack_bgr24(&src, &layout(1, 1, 32, ByteOrder::MsbFirst)).unwrap();
        assert_eq!(&out[..], &[10, 20, 30, 0]);
    }

    #[test]
    fn packed_24bpp_keeps_bytes() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 0, 0];
        let mut l = layout(3, 1, 24, ByteOrder::LsbFirst);
        l.row_bytes = 12;
        let out = pack_bgr24(&src, &l).unwrap();
        assert_eq!(&out[..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 0, 0]);
    }

    #[test]
    fn output_length_matches_stride() {
        let src = vec![0u8; 1024 * 768 * 4];
        let out = pack_bgr24(&src, &layout(1024, 768, 32, ByteOrder::LsbFirst)).unwrap();
        assert_eq!(out.len(), 3072 * 768);
    }

    #[test]
    fn rows_are_rounded_up_to_the_scanline_pad() {
        // 5 px * 3 bytes = 15, padded to 16
        let l = raw_layout(5, 2, 24, 24, 32, ByteOrder::LsbFirst);
        assert_eq!(l.row_bytes, 16);
        // already a multiple of 4
        assert_eq!(raw_layout(4, 2, 24, 24, 32, ByteOrder::LsbFirst).row_bytes, 12);
        assert_eq!(raw_layout(5, 2, 24, 32, 32, ByteOrder::LsbFirst).row_bytes, 20);
        // byte padding leaves rows tight
        assert_eq!(raw_layout(5, 2, 24, 24, 8, ByteOrder::LsbFirst).row_bytes, 15);
        assert_eq!(raw_layout(5, 2, 24, 24, 0, ByteOrder::LsbFirst).row_bytes, 15);
    }

    #[test]
    fn padded_source_rows_are_not_sheared() {
        let l = raw_layout(5, 2, 24, 24, 32, ByteOrder::LsbFirst);
        let mut src = Vec::new();
        for row in 0..2u8 {
            for px in 0..5u8 {
                let v = row * 100 + px * 10;
                src.extend_from_slice(&[v, v + 1, v + 2]);
            }
            src.push(0xee);
        }

        let out = pack_bgr24(&src, &l).unwrap();
        assert_eq!(out.len(), 16 * 2);
        assert_eq!(&out[..3], &[0, 1, 2]);
        assert_eq!(out[15], 0);
        assert_eq!(&out[16..19], &[100, 101, 102]);
        assert_eq!(&out[28..31], &[140, 141, 142]);
    }

    #[test]
    fn server_image_order_selects_byte_order() {
        assert_eq!(ByteOrder::from(ImageOrder::MSB_FIRST), ByteOrder::MsbFirst);
        assert_eq!(ByteOrder::from(ImageOrder::LSB_FIRST), ByteOrder::LsbFirst);

        let l = raw_layout(1, 1, 24, 32, 32, ImageOrder::MSB_FIRST.into());
        let out = pack_bgr24(&[0xff, 30, 20, 10], &l).unwrap();
        assert_eq!(&out[..], &[10, 20, 30, 0]);

        let l = raw_layout(1, 1, 24, 32, 32, ImageOrder::LSB_FIRST.into());
        let out = pack_bgr24(&[10, 20, 30, 0xff], &l).unwrap();
        assert_eq!(&out[..], &[10, 20, 30, 0]);
    }

    #[test]
    fn rejects_16bpp() {
        let err = pack_bgr24(&[0; 8], &layout(2, 2, 16, ByteOrder::LsbFirst)).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::UnsupportedFormat {
                bits_per_pixel: 16,
                ..
            }
        ));
    }

    #[test]
    fn rejects_truncated_source() {
        let err = pack_bgr24(&[0; 12], &layout(2, 2, 32, ByteOrder::LsbFirst)).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::ShortImage {
                expected: 16,
                actual: 12
            }
        ));
    }
}
