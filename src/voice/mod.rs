//! Voice connection negotiation.
//!
//! Joining a voice channel yields two dispatches in no fixed order: a
//! `VOICE_SERVER_UPDATE` with the endpoint and token, and our own
//! `VOICE_STATE_UPDATE` with the session id. [`VoiceNegotiation`] joins the
//! two halves and hands the result to whoever asked.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ClientError;
use crate::model::{Snowflake, VoiceConnectionData, VoiceServerUpdate, VoiceState};

/// What feeding one update into the negotiation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    /// Not collecting, or the update belongs to another guild or user.
    Ignored,
    /// Recorded one half; still waiting for the other.
    Partial,
    /// Both halves present; the descriptor was handed off.
    Completed,
}

struct Collecting {
    guild_id: Snowflake,
    server: Option<(String, String)>,
    session_id: Option<String>,
    sender: oneshot::Sender<VoiceConnectionData>,
}

#[derive(Default)]
struct State {
    user_id: Option<Snowflake>,
    collecting: Option<Collecting>,
}

/// Per-connection negotiation state: idle, or collecting for one guild.
#[derive(Default)]
pub struct VoiceNegotiation {
    state: Mutex<State>,
}

impl VoiceNegotiation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records which user this connection is logged in as. Only that user's
    /// state updates complete a negotiation.
    pub fn set_user_id(&self, user_id: Snowflake) {
        self.state.lock().user_id = Some(user_id);
    }

    pub fn user_id(&self) -> Option<Snowflake> {
        self.state.lock().user_id
    }

    /// Starts collecting for `guild_id`.
    ///
    /// Fails if a negotiation is already in flight on this connection.
    pub fn begin(
        &self,
        guild_id: Snowflake,
    ) -> Result<oneshot::Receiver<VoiceConnectionData>, ClientError> {
        let mut state = self.state.lock();
        if let Some(current) = &state.collecting {
            return Err(ClientError::Voice(format!(
                "voice negotiation for guild {} already in progress",
                current.guild_id
            )));
        }
        let (sender, receiver) = oneshot::channel();
        state.collecting = Some(Collecting {
            guild_id,
            server: None,
            session_id: None,
            sender,
        });
        log::debug!("collecting voice data for guild {}", guild_id);
        Ok(receiver)
    }

    /// Abandons the negotiation for `guild_id`. Returns whether one was running.
    pub fn cancel(&self, guild_id: Snowflake) -> bool {
        let mut state = self.state.lock();
        match &state.collecting {
            Some(c) if c.guild_id == guild_id => {
                state.collecting = None;
                log::debug!("voice negotiation for guild {} cancelled", guild_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.state.lock().collecting.is_some()
    }

    pub fn on_server_update(&self, update: &VoiceServerUpdate) -> NegotiationStep {
        let Some(endpoint) = update.endpoint.as_ref() else {
            log::debug!("voice server update for guild {} without endpoint", update.guild_id);
            return NegotiationStep::Ignored;
        };
        let mut state = self.state.lock();
        let Some(collecting) = state.collecting.as_mut() else {
            return NegotiationStep::Ignored;
        };
        if collecting.guild_id != update.guild_id {
            return NegotiationStep::Ignored;
        }
        collecting.server = Some((endpoint.clone(), update.token.clone()));
        Self::try_complete(&mut state)
    }

    pub fn on_state_update(&self, update: &VoiceState) -> NegotiationStep {
        if update.session_id.is_empty() {
            log::debug!("voice state update for user {} without session id", update.user_id);
            return NegotiationStep::Ignored;
        }
        let mut state = self.state.lock();
        if state.user_id != Some(update.user_id) {
            return NegotiationStep::Ignored;
        }
        let Some(collecting) = state.collecting.as_mut() else {
            return NegotiationStep::Ignored;
        };
        if update.guild_id != Some(collecting.guild_id) {
            return NegotiationStep::Ignored;
        }
        collecting.session_id = Some(update.session_id.clone());
        Self::try_complete(&mut state)
    }

    fn try_complete(state: &mut State) -> NegotiationStep {
        let ready = state
            .collecting
            .as_ref()
            .is_some_and(|c| c.server.is_some() && c.session_id.is_some());
        if !ready {
            return NegotiationStep::Partial;
        }
        let Some(Collecting {
            guild_id,
            server: Some((endpoint, token)),
            session_id: Some(session_id),
            sender,
        }) = state.collecting.take()
        else {
            return NegotiationStep::Partial;
        };

        let data = VoiceConnectionData {
            endpoint,
            token,
            session_id,
        };
        if sender.send(data).is_err() {
            log::debug!("voice data for guild {} dropped, nobody waiting", guild_id);
        } else {
            log::debug!("voice data for guild {} complete", guild_id);
        }
        NegotiationStep::Completed
    }
}
