//! WebRTC implementation of the media transport seam.
//!
//! One `WebRtcTransport` wraps one peer connection for the lifetime of one
//! call attempt. The control channel is created locally before the offer so
//! its m-line is part of the negotiation, matching what the remote realtime
//! endpoint expects.

use async_trait::async_trait;
use bytes::Bytes;
use civetta_core::transport::{ChannelEvent, MediaTransport, TransportError, TransportFactory};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::{
    api::{
        APIBuilder,
        interceptor_registry::register_default_interceptors,
        media_engine::{MIME_TYPE_OPUS, MediaEngine},
    },
    data_channel::{RTCDataChannel, data_channel_message::DataChannelMessage},
    interceptor::registry::Registry,
    media::Sample,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::rtp_codec::RTCRtpCodecCapability,
    track::track_local::{TrackLocal, track_local_static_sample::TrackLocalStaticSample},
};

/// Label the remote realtime endpoint publishes control events on.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

const CHANNEL_EVENT_BUFFER: usize = 256;

/// Produces the local audio track carrying captured microphone media.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn create_track(&self) -> Result<Arc<dyn TrackLocal + Send + Sync>, TransportError>;
}

/// Consumes decoded inbound audio from the remote track.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn play(&self, packet: webrtc::rtp::packet::Packet);
}

/// Capture source that negotiates an Opus sample track. The device layer
/// feeds it through [`OpusTrackCapture::writer`] once the call is up.
#[derive(Default)]
pub struct OpusTrackCapture {
    track: Mutex<Option<Arc<TrackLocalStaticSample>>>,
}

impl OpusTrackCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for pushing captured samples, once a call has attached.
    pub fn writer(&self) -> Option<Arc<TrackLocalStaticSample>> {
        self.track.lock().ok().and_then(|slot| slot.clone())
    }

    pub async fn write_sample(&self, sample: &Sample) -> Result<(), TransportError> {
        let track = self
            .writer()
            .ok_or_else(|| TransportError::CaptureDenied("no capture track attached".into()))?;
        track
            .write_sample(sample)
            .await
            .map_err(|e| TransportError::Peer(e.to_string()))
    }
}

#[async_trait]
impl CaptureSource for OpusTrackCapture {
    async fn create_track(&self) -> Result<Arc<dyn TrackLocal + Send + Sync>, TransportError> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            "civetta-mic".to_owned(),
        ));
        if let Ok(mut slot) = self.track.lock() {
            *slot = Some(track.clone());
        }
        Ok(track)
    }
}

/// Playback sink that drops inbound audio, counting what it discarded.
/// Stands in wherever no audio device is wired up (headless runs, tests).
#[derive(Default)]
pub struct DiscardPlayback {
    discarded: AtomicUsize,
}

impl DiscardPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackSink for DiscardPlayback {
    async fn play(&self, _packet: webrtc::rtp::packet::Packet) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

/// One peer connection plus its control data channel.
pub struct WebRtcTransport {
    peer: Arc<RTCPeerConnection>,
    capture: Arc<dyn CaptureSource>,
    playback: Arc<dyn PlaybackSink>,
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
    closed: AtomicBool,
}

impl WebRtcTransport {
    fn control_channel(&self) -> Result<Arc<RTCDataChannel>, TransportError> {
        self.channel
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(TransportError::ChannelClosed)
    }
}

fn peer_error(e: webrtc::Error) -> TransportError {
    TransportError::Peer(e.to_string())
}

#[async_trait]
impl MediaTransport for WebRtcTransport {
    async fn attach_capture(&self) -> Result<(), TransportError> {
        let track = self.capture.create_track().await?;
        self.peer.add_track(track).await.map_err(peer_error)?;

        let playback = self.playback.clone();
        self.peer.on_track(Box::new(move |track, _, _| {
            let playback = playback.clone();
            Box::pin(async move {
                debug!(codec = %track.codec().capability.mime_type, "remote track started");
                while let Ok((packet, _)) = track.read_rtp().await {
                    playback.play(packet).await;
                }
                debug!("remote track ended");
            })
        }));
        Ok(())
    }

    async fn open_control_channel(&self) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        {
            let slot = self
                .channel
                .lock()
                .map_err(|_| TransportError::ChannelClosed)?;
            if slot.is_some() {
                return Err(TransportError::ChannelAlreadyOpen);
            }
        }
        let channel = self
            .peer
            .create_data_channel(CONTROL_CHANNEL_LABEL, None)
            .await
            .map_err(peer_error)?;
        let (tx, rx) = mpsc::channel(CHANNEL_EVENT_BUFFER);

        let open_tx = tx.clone();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = open_tx.send(ChannelEvent::Opened).await;
            })
        }));

        let frame_tx = tx.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let frame_tx = frame_tx.clone();
            Box::pin(async move {
                let frame = String::from_utf8_lossy(&message.data).into_owned();
                let _ = frame_tx.send(ChannelEvent::Frame(frame)).await;
            })
        }));

        let close_tx = tx.clone();
        channel.on_close(Box::new(move || {
            let close_tx = close_tx.clone();
            Box::pin(async move {
                let _ = close_tx.send(ChannelEvent::Closed).await;
            })
        }));

        // A dying peer connection terminates the channel even if no on_close
        // callback ever fires.
        self.peer
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let tx = tx.clone();
                Box::pin(async move {
                    debug!(?state, "peer connection state changed");
                    if matches!(
                        state,
                        RTCPeerConnectionState::Failed
                            | RTCPeerConnectionState::Disconnected
                            | RTCPeerConnectionState::Closed
                    ) {
                        let _ = tx.try_send(ChannelEvent::Closed);
                    }
                })
            }));

        if let Ok(mut slot) = self.channel.lock() {
            *slot = Some(channel);
        }
        Ok(rx)
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        let offer = self.peer.create_offer(None).await.map_err(peer_error)?;
        let mut gathered = self.peer.gathering_complete_promise().await;
        self.peer
            .set_local_description(offer)
            .await
            .map_err(peer_error)?;
        // Waiting out ICE gathering lets the offer carry all candidates, so
        // no trickle round trips are needed after the single HTTP exchange.
        let _ = gathered.recv().await;
        let local = self
            .peer
            .local_description()
            .await
            .ok_or_else(|| TransportError::Peer("no local description".to_string()))?;
        Ok(local.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp.to_string()).map_err(peer_error)?;
        self.peer
            .set_remote_description(answer)
            .await
            .map_err(peer_error)
    }

    async fn send_text(&self, frame: &str) -> Result<(), TransportError> {
        let channel = self.control_channel()?;
        channel
            .send(&Bytes::copy_from_slice(frame.as_bytes()))
            .await
            .map_err(peer_error)?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.peer.close().await {
            warn!(error = %e, "error while closing peer connection");
        }
    }
}

/// Builds a fresh peer connection per call attempt.
pub struct WebRtcTransportFactory {
    capture: Arc<dyn CaptureSource>,
    playback: Arc<dyn PlaybackSink>,
}

impl WebRtcTransportFactory {
    pub fn new(capture: Arc<dyn CaptureSource>, playback: Arc<dyn PlaybackSink>) -> Self {
        Self { capture, playback }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self) -> Result<Arc<dyn MediaTransport>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(peer_error)?;
        let mut registry = Registry::new();
        registry =
            register_default_interceptors(registry, &mut media_engine).map_err(peer_error)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .map_err(peer_error)?;

        Ok(Arc::new(WebRtcTransport {
            peer: Arc::new(peer),
            capture: self.capture.clone(),
            playback: self.playback.clone(),
            channel: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}
