//! One gateway connection's worth of state: its byte buffer, voice
//! negotiation and session bookkeeping.
//!
//! A [`Shard`] does no I/O. The connection driver in [`crate::client`] hands
//! it raw frames and acts on the [`ShardAction`]s it returns.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use serde_json::value::RawValue;

use crate::error::FrameError;
use crate::event::Event;
use crate::model::Snowflake;
use crate::ring_buffer::SegmentedRingBuffer;
use crate::router::GatewayEventRouter;
use crate::voice::VoiceNegotiation;

/// Slots in each shard's ring.
pub const SHARD_SLICES: usize = 4;

pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const VOICE_STATE_UPDATE: u8 = 4;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

#[derive(Debug, Deserialize)]
struct GatewayPayload<'a> {
    op: u8,
    #[serde(borrow, default)]
    d: Option<&'a RawValue>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(borrow, default)]
    t: Option<Cow<'a, str>>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

/// Something the connection driver has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardAction {
    /// `HELLO` arrived: start heartbeating at this interval and identify or
    /// resume.
    Heartbeat { interval: Duration },
    /// The gateway asked for a heartbeat right away.
    HeartbeatNow,
    /// Drop the connection and resume.
    Reconnect,
    /// The session was rejected; reconnect, resuming only if allowed.
    InvalidSession { resumable: bool },
}

/// What a shard needs to resume after a disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub resume_gateway_url: Option<String>,
}

impl SessionState {
    pub fn is_resumable(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }
}

pub struct Shard {
    id: u32,
    count: u32,
    ring: SegmentedRingBuffer<SHARD_SLICES>,
    router: Arc<GatewayEventRouter>,
    voice: Arc<VoiceNegotiation>,
    session: SessionState,
}

impl Shard {
    pub fn new(id: u32, count: u32, router: Arc<GatewayEventRouter>, voice: Arc<VoiceNegotiation>) -> Self {
        Self {
            id,
            count,
            ring: SegmentedRingBuffer::new(),
            router,
            voice,
            session: SessionState::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn voice(&self) -> &Arc<VoiceNegotiation> {
        &self.voice
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Forgets the session so the next connection identifies from scratch.
    pub fn reset_session(&mut self) {
        self.session = SessionState::default();
        self.ring.clear();
    }

    /// Buffers one frame without processing it.
    pub fn feed(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        self.ring.write(frame)
    }

    /// Processes every buffered payload, one fed frame at a time.
    pub fn drain(&mut self) -> Vec<ShardAction> {
        let mut actions = Vec::new();
        while !self.ring.is_empty() {
            for frame in self.ring.read_frames() {
                process_payloads(
                    frame,
                    self.id,
                    &mut self.session,
                    &self.router,
                    &self.voice,
                    &mut actions,
                );
            }
        }
        actions
    }

    /// Buffers and processes one frame from the socket.
    ///
    /// Frames too large for a ring slot are processed in place.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Vec<ShardAction> {
        match self.feed(frame) {
            Ok(()) => self.drain(),
            Err(e) => {
                log::debug!("shard {}: {}, decoding in place", self.id, e);
                let mut actions = self.drain();
                process_payloads(
                    frame,
                    self.id,
                    &mut self.session,
                    &self.router,
                    &self.voice,
                    &mut actions,
                );
                actions
            }
        }
    }

    pub fn identify(&self, token: &str, intents: u64) -> String {
        json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": token,
                "intents": intents,
                "shard": [self.id, self.count],
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "fluxer-gateway",
                    "device": "fluxer-gateway"
                }
            }
        })
        .to_string()
    }

    pub fn heartbeat(&self) -> String {
        json!({ "op": opcode::HEARTBEAT, "d": self.session.sequence }).to_string()
    }

    /// `None` when there is no session to resume.
    pub fn resume(&self, token: &str) -> Option<String> {
        let session_id = self.session.session_id.as_ref()?;
        let seq = self.session.sequence?;
        let payload = json!({
            "op": opcode::RESUME,
            "d": {
                "token": token,
                "session_id": session_id,
                "seq": seq
            }
        });
        Some(payload.to_string())
    }
}

/// Asks the gateway to move us into a voice channel, or out of one when
/// `channel_id` is `None`.
pub fn voice_state_update(guild_id: Snowflake, channel_id: Option<Snowflake>, self_mute: bool, self_deaf: bool) -> String {
    json!({
        "op": opcode::VOICE_STATE_UPDATE,
        "d": {
            "guild_id": guild_id,
            "channel_id": channel_id,
            "self_mute": self_mute,
            "self_deaf": self_deaf
        }
    })
    .to_string()
}

/// Walks a run of concatenated payloads.
fn process_payloads(
    bytes: &[u8],
    shard_id: u32,
    session: &mut SessionState,
    router: &GatewayEventRouter,
    voice: &VoiceNegotiation,
    actions: &mut Vec<ShardAction>,
) {
    let stream = serde_json::Deserializer::from_slice(bytes).into_iter::<&RawValue>();
    for raw in stream {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("shard {}: malformed gateway frame: {}", shard_id, e);
                break;
            }
        };
        match serde_json::from_str::<GatewayPayload>(raw.get()) {
            Ok(payload) => handle_payload(payload, shard_id, session, router, voice, actions),
            Err(e) => log::warn!("shard {}: malformed gateway payload: {}", shard_id, e),
        }
    }
}

fn handle_payload(
    payload: GatewayPayload<'_>,
    shard_id: u32,
    session: &mut SessionState,
    router: &GatewayEventRouter,
    voice: &VoiceNegotiation,
    actions: &mut Vec<ShardAction>,
) {
    if let Some(sequence) = payload.s {
        session.sequence = Some(sequence);
    }
    match payload.op {
        opcode::DISPATCH => {
            let Some(name) = payload.t.as_deref() else {
                log::warn!("shard {}: dispatch without event name", shard_id);
                return;
            };
            let data = payload.d.map(|d| d.get()).unwrap_or("null");
            match router.dispatch(name, data.as_bytes(), Some(voice)) {
                Ok(Some(event)) => {
                    if let Event::Ready(ready) = event.as_ref() {
                        log::info!("shard {}: ready as {}", shard_id, ready.user.username);
                        session.session_id = Some(ready.session_id.clone());
                        session.resume_gateway_url = ready.resume_gateway_url.clone();
                    } else if let Event::Resumed = event.as_ref() {
                        log::info!("shard {}: resumed", shard_id);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("shard {}: {}", shard_id, e),
            }
        }
        opcode::HEARTBEAT => actions.push(ShardAction::HeartbeatNow),
        opcode::RECONNECT => actions.push(ShardAction::Reconnect),
        opcode::INVALID_SESSION => {
            let resumable = payload
                .d
                .and_then(|d| serde_json::from_str::<bool>(d.get()).ok())
                .unwrap_or(false);
            if !resumable {
                *session = SessionState::default();
            }
            actions.push(ShardAction::InvalidSession { resumable });
        }
        opcode::HELLO => {
            let hello = payload.d.and_then(|d| serde_json::from_str::<Hello>(d.get()).ok());
            match hello {
                Some(hello) => actions.push(ShardAction::Heartbeat {
                    interval: Duration::from_millis(hello.heartbeat_interval),
                }),
                None => log::warn!("shard {}: HELLO without heartbeat interval", shard_id),
            }
        }
        opcode::HEARTBEAT_ACK => log::trace!("shard {}: heartbeat acknowledged", shard_id),
        op => log::debug!("shard {}: unhandled opcode {}", shard_id, op),
    }
}
