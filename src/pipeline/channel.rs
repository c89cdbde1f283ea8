use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::diagnostics::stats::PipelineStats;
use crate::pipeline::error::{ChannelError, Result};
use crate::pipeline::overlay::OverlayState;
use crate::pipeline::protocol::{parse_inbound, FrameSubmission};

/// Connection state of the detection socket.
///
/// `Closed → Connecting → Open → Closing → Closed`. Outbound sends are only
/// accepted in `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Connect,
    Established,
    Failed,
    CloseRequested,
    Terminated,
}

impl ChannelState {
    /// The state after `event`, or `None` when the event is not valid here.
    pub fn on(self, event: ChannelEvent) -> Option<ChannelState> {
        use ChannelEvent as E;
        use ChannelState as S;
        match (self, event) {
            (S::Closed, E::Connect) => Some(S::Connecting),
            (S::Connecting, E::Established) => Some(S::Open),
            (S::Connecting, E::Failed) => Some(S::Closed),
            (S::Connecting | S::Open, E::CloseRequested) => Some(S::Closing),
            (S::Open | S::Closing, E::Terminated | E::Failed) => Some(S::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Closed => "closed",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Destination for sampled frames.
pub trait FrameSink: Send + Sync {
    /// Fire-and-forget delivery. Never waits for an acknowledgment; fails
    /// with [`ChannelError::Unavailable`] when the frame cannot be sent now.
    fn submit(&self, submission: &FrameSubmission) -> Result<()>;
}

/// Frames waiting for the socket. Sampling is periodic, so anything beyond
/// this backlog means the socket has stalled and newer frames are dropped.
pub const OUTBOUND_CAPACITY: usize = 2;

struct Inner {
    state: ChannelState,
    outbound: Option<mpsc::Sender<Message>>,
    close: Arc<Notify>,
}

impl Inner {
    fn apply(&mut self, event: ChannelEvent) -> bool {
        match self.state.on(event) {
            Some(next) => {
                debug!("detection channel {} -> {next} ({event:?})", self.state);
                self.state = next;
                true
            }
            None => {
                debug!("detection channel ignores {event:?} while {}", self.state);
                false
            }
        }
    }
}

/// The persistent duplex connection to the detection service.
///
/// Opened once per pipeline. Inbound results replace the overlay; a closed
/// channel is never reopened from here.
pub struct StreamChannel {
    inner: Mutex<Inner>,
    overlay: Arc<OverlayState>,
    stats: Arc<Mutex<PipelineStats>>,
}

impl StreamChannel {
    pub fn new(overlay: Arc<OverlayState>, stats: Arc<Mutex<PipelineStats>>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: ChannelState::Closed,
                outbound: None,
                close: Arc::new(Notify::new()),
            }),
            overlay,
            stats,
        })
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    /// Start connecting to `url`. Returns `None` unless the channel was closed.
    pub fn connect(self: &Arc<Self>, url: impl Into<String>) -> Option<JoinHandle<()>> {
        let close = {
            let mut inner = self.inner.lock();
            if !inner.apply(ChannelEvent::Connect) {
                return None;
            }
            inner.close = Arc::new(Notify::new());
            Arc::clone(&inner.close)
        };
        let channel = Arc::clone(self);
        let url = url.into();
        Some(tokio::spawn(async move { channel.run(url, close).await }))
    }

    /// Ask the connection to shut down. No-op unless connecting or open.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.apply(ChannelEvent::CloseRequested) {
            inner.outbound = None;
            inner.close.notify_one();
        }
    }

    async fn run(self: Arc<Self>, url: String, close: Arc<Notify>) {
        let connected = tokio::select! {
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
            _ = close.notified() => {
                self.inner.lock().apply(ChannelEvent::Terminated);
                return;
            }
        };
        let socket = match connected {
            Ok((socket, _response)) => socket,
            Err(e) => {
                warn!("detection channel could not connect to {url}: {e}");
                self.inner.lock().apply(ChannelEvent::Failed);
                return;
            }
        };

        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let established = {
            let mut inner = self.inner.lock();
            let ok = inner.apply(ChannelEvent::Established);
            if ok {
                inner.outbound = Some(tx);
            }
            ok
        };
        if !established {
            let _ = sink.close().await;
            self.inner.lock().apply(ChannelEvent::Terminated);
            return;
        }
        info!("detection channel open: {url}");

        loop {
            tokio::select! {
                outbound = rx.recv() => match outbound {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            warn!("detection channel send failed: {e}");
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Close(frame))) => {
                        info!("detection channel closed by peer: {frame:?}");
                        break;
                    }
                    Some(Ok(message)) => self.handle_inbound(message),
                    Some(Err(e)) => {
                        warn!("detection channel read failed: {e}");
                        break;
                    }
                    None => break,
                },
                _ = close.notified() => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }

        let mut inner = self.inner.lock();
        inner.outbound = None;
        inner.apply(ChannelEvent::Terminated);
        info!("detection channel closed");
    }

    fn handle_inbound(&self, message: Message) {
        match message {
            Message::Text(text) => self.handle_text(&text),
            Message::Binary(bytes) => {
                warn!(
                    "discarding non-text detection message ({} bytes)",
                    bytes.len()
                );
                self.stats.lock().record_parse_error();
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_) => {}
        }
    }

    /// Apply one inbound text message. Malformed input is logged and dropped
    /// without touching the overlay or the connection.
    pub fn handle_text(&self, text: &str) {
        match parse_inbound(text) {
            Ok(message) => {
                debug!(
                    "detection result: {} box(es), falls={:?} persons={:?}",
                    message.boxes.len(),
                    message.falls_in_frame,
                    message.persons_in_frame
                );
                self.overlay.replace(message.boxes);
                self.stats.lock().record_result();
            }
            Err(e) => {
                warn!("{e}");
                self.stats.lock().record_parse_error();
            }
        }
    }
}

impl FrameSink for StreamChannel {
    fn submit(&self, submission: &FrameSubmission) -> Result<()> {
        let json = submission.to_json()?;
        let inner = self.inner.lock();
        match (&inner.outbound, inner.state) {
            (Some(tx), ChannelState::Open) => match tx.try_send(Message::Text(json)) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    Err(ChannelError::Unavailable("send backlog full".to_string()))
                }
                Err(TrySendError::Closed(_)) => {
                    Err(ChannelError::Unavailable(ChannelState::Closing.to_string()))
                }
            },
            (_, state) => Err(ChannelError::Unavailable(state.to_string())),
        }
    }
}
