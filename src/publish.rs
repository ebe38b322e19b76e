//! Best-effort broadcast of serialized envelopes
//!
//! A [`PubSocket`] listens on a TCP port derived from its topic name.
//! Every connected subscriber gets its own writer task fed from a
//! broadcast queue of depth one, so a slow subscriber only ever misses
//! frames and never holds up the publisher.
//!
//! On the wire each message is a 4-byte big-endian length followed by
//! the envelope bytes.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, instrument, warn};

use crate::envelope::{self, Event};
use crate::error::PublishError;

/// Topic carrying road camera frames.
pub const ROAD_CAMERA_STATE: &str = "roadCameraState";

/// Largest single message accepted on either side of the socket.
///
/// The length prefix is a `u32`, so this is the most the wire can carry.
/// The root window spans every monitor and its frames routinely exceed
/// tens of megabytes.
pub const MAX_MESSAGE_SIZE: usize = u32::MAX as usize;

const START_PORT: u16 = 8023;
const MAX_PORT: u16 = 65535;

/// Messages queued per subscriber before older ones are dropped.
const QUEUE_DEPTH: usize = 1;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Fire-and-forget delivery of serialized messages.
pub trait Publisher {
    /// Hand `bytes` to every current subscriber. Never blocks, never fails.
    fn send(&self, bytes: Bytes);
}

/// TCP port a topic is served on: FNV-1a of the name folded into
/// `[8023, 65535)`.
pub fn port_for_topic(topic: &str) -> u16 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in topic.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let span = u64::from(MAX_PORT - START_PORT);
    START_PORT + (hash % span) as u16
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_MESSAGE_SIZE)
        .new_codec()
}

/// Publishing end of a topic.
pub struct PubSocket {
    topic: String,
    tx: broadcast::Sender<Bytes>,
    local_addr: SocketAddr,
    subscribers: Arc<AtomicUsize>,
    max_message_size: usize,
    accept_task: JoinHandle<()>,
}

impl PubSocket {
    /// Bind the topic endpoint and start accepting subscribers.
    pub async fn bind(topic: &str, addr: SocketAddr) -> Result<Self, PublishError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PublishError::Bind {
                topic: topic.to_owned(),
                addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Publishing {} on {}", topic, local_addr);

        let (tx, _) = broadcast::channel(QUEUE_DEPTH);
        let subscribers = Arc::new(AtomicUsize::new(0));
        let accept_task = tokio::spawn(accept_loop(listener, tx.clone(), subscribers.clone()));

        Ok(Self {
            topic: topic.to_owned(),
            tx,
            local_addr,
            subscribers,
            max_message_size: MAX_MESSAGE_SIZE,
            accept_task,
        })
    }

    /// Refuse messages longer than `limit` bytes. Capped at
    /// [`MAX_MESSAGE_SIZE`].
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit.min(MAX_MESSAGE_SIZE);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribers currently connected.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }
}

impl Publisher for PubSocket {
    #[instrument(skip_all, fields(topic = %self.topic, len = bytes.len()))]
    fn send(&self, bytes: Bytes) {
        // The codec would refuse it per subscriber and drop the connection.
        if bytes.len() > self.max_message_size {
            metrics::counter!("roadcam_oversized_messages").increment(1);
            warn!(
                limit = self.max_message_size,
                "Message too large for the wire, not sent"
            );
            return;
        }
        // Err only means nobody is listening.
        if self.tx.send(bytes).is_err() {
            debug!("No subscribers");
        }
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: broadcast::Sender<Bytes>,
    subscribers: Arc<AtomicUsize>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                accept_backoff(&e).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }

        // Subscribe before counting so a visible subscriber never misses
        // the next send.
        let rx = tx.subscribe();
        subscribers.fetch_add(1, Ordering::Relaxed);
        info!("Subscriber connected from {peer}");

        let subscribers = subscribers.clone();
        tokio::spawn(async move {
            forward(stream, rx).await;
            subscribers.fetch_sub(1, Ordering::Relaxed);
            info!("Subscriber {peer} disconnected");
        });
    }
}

async fn accept_backoff(err: &io::Error) {
    warn!("accept error, retrying in {:?}: {err}", ACCEPT_BACKOFF);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn forward(stream: TcpStream, mut rx: broadcast::Receiver<Bytes>) {
    let mut sink = FramedWrite::new(stream, codec());
    loop {
        match rx.recv().await {
            Ok(bytes) => {
                if let Err(e) = sink.send(bytes).await {
                    warn!("write to subscriber failed: {e}");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Subscriber lagging, dropped {skipped} messages");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Subscribing end of a topic.
pub struct SubSocket {
    frames: FramedRead<TcpStream, LengthDelimitedCodec>,
}

impl SubSocket {
    pub async fn connect(addr: SocketAddr) -> Result<Self, PublishError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            frames: FramedRead::new(stream, codec()),
        })
    }

    /// Next raw message, or `None` once the publisher is gone.
    pub async fn recv_bytes(&mut self) -> Option<Result<Bytes, PublishError>> {
        let frame = self.frames.next().await?;
        Some(frame.map(|b| b.freeze()).map_err(PublishError::from))
    }

    /// Next decoded event, or `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<Result<Event, PublishError>> {
        let bytes = match self.recv_bytes().await? {
            Ok(bytes) => bytes,
            Err(e) => return Some(Err(e)),
        };
        Some(envelope::decode(&bytes).map_err(PublishError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_port_is_stable_and_in_range() {
        let port = port_for_topic(ROAD_CAMERA_STATE);
        assert_eq!(port, port_for_topic("roadCameraState"));
        assert!((START_PORT..MAX_PORT).contains(&port));
        assert_ne!(port, port_for_topic("driverCameraState"));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_a_no_op() {
        let socket = PubSocket::bind("test", "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(socket.subscriber_count(), 0);
        socket.send(Bytes::from_static(b"nobody home"));
        socket.send(Bytes::from_static(b"still nobody"));
    }

    #[tokio::test]
    async fn bind_conflict_reports_topic_and_address() {
        let first = PubSocket::bind("busy", "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let err = match PubSocket::bind("busy", first.local_addr()).await {
            Err(e) => e,
            Ok(_) => panic!("second bind on the same port succeeded"),
        };
        assert!(matches!(err, PublishError::Bind { ref topic, .. } if topic == "busy"));
    }

    #[test]
    fn wire_limit_fits_multi_monitor_frames() {
        // Three 4K monitors side by side, BGR24.
        assert!(11520 * 3 * 2160 < MAX_MESSAGE_SIZE);
        assert_eq!(MAX_MESSAGE_SIZE, u32::MAX as usize);
    }

    #[tokio::test]
    async fn message_limit_is_capped_at_the_wire_limit() {
        let socket = PubSocket::bind("cap", "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_max_message_size(usize::MAX);
        assert_eq!(socket.max_message_size, MAX_MESSAGE_SIZE);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_accept_waits_before_retrying() {
        let start = tokio::time::Instant::now();
        accept_backoff(&io::Error::from_raw_os_error(24)).await;
        assert!(start.elapsed() >= ACCEPT_BACKOFF);
    }
}
