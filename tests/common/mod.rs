//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use roadcam::capture::frame::stride;
use roadcam::{CaptureError, Frame, Publisher, SnapshotSource};
use tokio::time::Instant;

/// What the scripted display does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return a frame of the given size after `delay`.
    Frame {
        width: u32,
        height: u32,
        delay: Duration,
    },
    /// Fail after `delay`.
    Fail { delay: Duration },
    /// Return a frame whose buffer is shorter than its geometry.
    Truncated { width: u32, height: u32 },
}

impl Step {
    pub fn frame(width: u32, height: u32) -> Self {
        Step::Frame {
            width,
            height,
            delay: Duration::ZERO,
        }
    }

    pub fn slow_frame(width: u32, height: u32, delay_ms: u64) -> Self {
        Step::Frame {
            width,
            height,
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn fail() -> Self {
        Step::Fail {
            delay: Duration::ZERO,
        }
    }
}

/// Plays back a fixed list of steps; the last step repeats forever.
pub struct ScriptedSource {
    steps: Vec<Step>,
    next: usize,
    calls: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        assert!(!steps.is_empty());
        Self {
            steps,
            next: 0,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start times of every `capture` call.
    pub fn calls(&self) -> Arc<Mutex<Vec<Instant>>> {
        self.calls.clone()
    }
}

pub fn filled_frame(width: u32, height: u32, fill: u8) -> Frame {
    let data = vec![fill; stride(width, 3) * height as usize];
    Frame::bgr24(Bytes::from(data), width, height, 32)
}

impl SnapshotSource for ScriptedSource {
    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.calls.lock().unwrap().push(Instant::now());
        let step = self.steps[self.next.min(self.steps.len() - 1)].clone();
        self.next += 1;

        match step {
            Step::Frame {
                width,
                height,
                delay,
            } => {
                tokio::time::sleep(delay).await;
                Ok(filled_frame(width, height, self.next as u8))
            }
            Step::Fail { delay } => {
                tokio::time::sleep(delay).await;
                Err(CaptureError::EmptyImage {
                    width: 0,
                    height: 0,
                })
            }
            Step::Truncated { width, height } => {
                let data = vec![0u8; stride(width, 3) * height as usize / 2];
                Ok(Frame::bgr24(Bytes::from(data), width, height, 32))
            }
        }
    }
}

/// Keeps every message it is asked to send.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    sent: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn send(&self, bytes: Bytes) {
        self.sent.lock().unwrap().push(bytes);
    }
}
