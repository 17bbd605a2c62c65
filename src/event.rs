//! Typed inbound event surface of the Triline client.
//!
//! [`TrilineEvent`] is what consumers receive on the event channel returned
//! by [`TrilineClient::start`](crate::client::TrilineClient::start). It is
//! the set of authority messages plus two synthetic transport-level events:
//! `Connected` (emitted once, before anything else) and `Disconnected`
//! (always the final event on the channel).

use crate::protocol::{ConnectionId, ServerMessage, SessionId, SessionSnapshot};

/// Events delivered to the client consumer, in server-emission order.
#[derive(Debug, Clone)]
pub enum TrilineEvent {
    /// Synthetic: the transport reached the authority. The session state
    /// machine reacts by emitting `createGame` or `joinGame`.
    Connected,
    /// A session now exists; its id is part of the navigable address.
    GameCreated {
        session_id: SessionId,
        snapshot: SessionSnapshot,
    },
    /// Authoritative snapshot replacing all local session state.
    GameUpdate { snapshot: SessionSnapshot },
    /// The session reached a terminal state.
    GameOver { snapshot: SessionSnapshot },
    /// A participant asked for a rematch. `from` may be this client.
    RematchOffer { from: ConnectionId },
    /// The opponent's connection went away; the session is inert.
    PlayerLeft { message: String },
    /// The authority rejected an intent or the session is unusable.
    ServerError { message: String },
    /// Synthetic: the transport is gone. Always the last event delivered.
    Disconnected { reason: Option<String> },
}

impl From<ServerMessage> for TrilineEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::GameCreated {
                game_id,
                game_state,
            } => Self::GameCreated {
                session_id: game_id,
                snapshot: game_state,
            },
            ServerMessage::GameUpdate(snapshot) => Self::GameUpdate { snapshot },
            ServerMessage::GameOver(snapshot) => Self::GameOver { snapshot },
            ServerMessage::RematchOffer { player } => Self::RematchOffer { from: player },
            ServerMessage::PlayerLeft { message } => Self::PlayerLeft { message },
            ServerMessage::Error { message } => Self::ServerError { message },
        }
    }
}
