//! Message envelope for published frames
//!
//! Every published message is an [`Event`] archived with rkyv. The
//! archive is self-contained: a subscriber needs nothing but the bytes
//! to recover the frame id, the image and the transform.

use bytes::Bytes;
use rkyv::{AlignedVec, Archive, Deserialize, Serialize};

use crate::capture::frame::{stride, Frame};
use crate::error::EnvelopeError;

/// Per-process frame counter value.
pub type FrameId = u32;

/// Scratch space reserved up front by the serializer.
const SCRATCH_SPACE: usize = 4096;

/// Row-major 3x3 camera-to-world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub [f64; 9]);

impl Transform {
    pub const IDENTITY: Transform = Transform([
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 1.0,
    ]);
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Top-level published message.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct Event {
    /// Monotonic time of publication, in nanoseconds.
    pub log_mono_time: u64,
    pub valid: bool,
    pub kind: EventKind,
}

/// Event payloads. Only camera state is produced by this crate.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum EventKind {
    RoadCameraState(RoadCameraState),
}

/// One road camera frame.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct RoadCameraState {
    pub frame_id: FrameId,
    /// Packed pixels, rows padded to 4 bytes.
    pub image: Vec<u8>,
    pub transform: [f64; 9],
}

impl RoadCameraState {
    /// Take the leading `stride(width, bytes_per_pixel) * height` bytes
    /// of `pixels` as the image payload.
    pub fn from_pixels(
        pixels: &[u8],
        frame_id: FrameId,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        transform: &Transform,
    ) -> Result<Self, EnvelopeError> {
        let size = stride(width, bytes_per_pixel) * height as usize;
        let image = pixels.get(..size).ok_or(EnvelopeError::ShortBuffer {
            expected: size,
            actual: pixels.len(),
        })?;

        Ok(Self {
            frame_id,
            image: image.to_vec(),
            transform: transform.0,
        })
    }

    pub fn transform(&self) -> Transform {
        Transform(self.transform)
    }
}

impl Event {
    pub fn new(kind: EventKind, log_mono_time: u64) -> Self {
        Self {
            log_mono_time,
            valid: true,
            kind,
        }
    }

    pub fn road_camera_state(&self) -> Option<&RoadCameraState> {
        match &self.kind {
            EventKind::RoadCameraState(state) => Some(state),
        }
    }
}

/// Serialize an event into a standalone byte buffer.
pub fn encode(event: &Event) -> Result<Bytes, EnvelopeError> {
    let archived = rkyv::to_bytes::<_, SCRATCH_SPACE>(event)
        .map_err(|e| EnvelopeError::Serialize(e.to_string()))?;
    Ok(Bytes::copy_from_slice(&archived))
}

/// Build and serialize the road camera event for one captured frame.
pub fn encode_frame(
    frame: &Frame,
    frame_id: FrameId,
    transform: &Transform,
    log_mono_time: u64,
) -> Result<Bytes, EnvelopeError> {
    let state = RoadCameraState::from_pixels(
        &frame.data,
        frame_id,
        frame.meta.width,
        frame.meta.height,
        frame.bytes_per_pixel(),
        transform,
    )?;
    encode(&Event::new(EventKind::RoadCameraState(state), log_mono_time))
}

/// Validate and deserialize an event produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Event, EnvelopeError> {
    // Archives must be read from suitably aligned memory.
    let mut aligned = AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    rkyv::from_bytes::<Event>(&aligned).map_err(|e| EnvelopeError::Decode(e.to_string()))
}
