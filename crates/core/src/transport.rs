//! Peer media/data transport abstraction.
//!
//! One transport exists per session attempt; the lifecycle controller owns it
//! exclusively and closes it exactly once (implementations must make `close`
//! a safe no-op on repeat calls). Control-channel traffic surfaces as an
//! ordered [`ChannelEvent`] stream.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered notifications from the control (data) channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel was acknowledged open by the remote end. This is the
    /// authoritative trigger for the ACTIVE state, independent of when the
    /// answer finished applying.
    Opened,
    /// One inbound text frame, delivered in receipt order.
    Frame(String),
    /// The channel or the underlying connection terminated.
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The local capture source refused to provide an outbound track, e.g.
    /// the user denied the microphone permission prompt.
    #[error("capture denied: {0}")]
    CaptureDenied(String),

    #[error("peer connection: {0}")]
    Peer(String),

    #[error("control channel is not open")]
    ChannelClosed,

    #[error("control channel was already opened for this transport")]
    ChannelAlreadyOpen,
}

/// The peer connection plus its control channel, driven by the negotiator in
/// the order the methods are listed.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Acquires the local audio capture source and attaches it as the sole
    /// outbound media track.
    async fn attach_capture(&self) -> Result<(), TransportError>;

    /// Opens the single control channel. Must be called before negotiation so
    /// the remote end can send events as soon as the channel is acknowledged.
    /// Callable once per transport.
    async fn open_control_channel(&self) -> Result<mpsc::Receiver<ChannelEvent>, TransportError>;

    /// Produces the local session description, applies it locally, and
    /// returns its raw SDP.
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Applies the remote answer.
    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError>;

    /// Sends one text frame on the control channel.
    async fn send_text(&self, frame: &str) -> Result<(), TransportError>;

    /// Releases the connection and channel. Idempotent.
    async fn close(&self);
}

/// Creates one fresh transport per session attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn MediaTransport>, TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    /// A transport double whose channel events are fed by the test.
    pub(crate) struct ScriptedTransport {
        pub events_tx: mpsc::Sender<ChannelEvent>,
        events_rx: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
        pub sent: Mutex<Vec<String>>,
        pub close_calls: AtomicUsize,
        pub deny_capture: Option<String>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Self::with_capture_denial(None)
        }

        pub fn with_capture_denial(deny_capture: Option<String>) -> Arc<Self> {
            let (events_tx, events_rx) = mpsc::channel(64);
            Arc::new(Self {
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                sent: Mutex::new(Vec::new()),
                close_calls: AtomicUsize::new(0),
                deny_capture,
            })
        }

        pub fn sent_frames(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaTransport for ScriptedTransport {
        async fn attach_capture(&self) -> Result<(), TransportError> {
            match &self.deny_capture {
                Some(reason) => Err(TransportError::CaptureDenied(reason.clone())),
                None => Ok(()),
            }
        }

        async fn open_control_channel(
            &self,
        ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
            self.events_rx
                .lock()
                .unwrap()
                .take()
                .ok_or(TransportError::ChannelAlreadyOpen)
        }

        async fn create_offer(&self) -> Result<String, TransportError> {
            Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=test-offer\r\n".to_string())
        }

        async fn apply_answer(&self, _sdp: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_text(&self, frame: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(frame.to_string());
            Ok(())
        }

        async fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.events_tx.try_send(ChannelEvent::Closed);
        }
    }

    /// Hands out pre-built scripted transports and counts creations.
    pub(crate) struct ScriptedFactory {
        transports: Mutex<Vec<Arc<ScriptedTransport>>>,
        pub created: AtomicUsize,
    }

    impl ScriptedFactory {
        pub fn new(transports: Vec<Arc<ScriptedTransport>>) -> Arc<Self> {
            Arc::new(Self {
                transports: Mutex::new(transports),
                created: AtomicUsize::new(0),
            })
        }

        pub fn single(transport: Arc<ScriptedTransport>) -> Arc<Self> {
            Self::new(vec![transport])
        }

        pub fn create_count(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransportFactory for ScriptedFactory {
        async fn create(&self) -> Result<Arc<dyn MediaTransport>, TransportError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let transport = {
                let mut transports = self.transports.lock().unwrap();
                if transports.is_empty() {
                    return Err(TransportError::Peer("no scripted transport left".into()));
                }
                transports.remove(0)
            };
            Ok(transport)
        }
    }
}
