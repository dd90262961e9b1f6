//! Typed gateway events.
//!
//! Instead of matching on raw `(op, t, serde_json::Value)` tuples everywhere,
//! the gateway module deserializes dispatch payloads into this enum so the
//! rest of the bot can pattern-match on strongly-typed data. The pet bot only
//! cares about READY, GUILD_CREATE, and INTERACTION_CREATE; everything else
//! lands in [`GatewayEvent::Unknown`].

use tracing::warn;

use crate::types::*;

// ---------------------------------------------------------------------------
// The top-level event enum
// ---------------------------------------------------------------------------

/// A fully-parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// We've successfully identified / resumed, the bot is ready.
    Ready(ReadyEvent),

    /// Guild object lazily sent after READY (and on joining a new server).
    GuildCreate(Guild),

    /// A slash command (or ping) arrived.
    InteractionCreate(Interaction),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session has been invalidated (op 9). The inner bool indicates whether
    /// the session is resumable (`true`) or we must re-identify (`false`).
    InvalidSession(bool),

    /// An event we received but don't have a typed variant for.
    Unknown {
        event_name: Option<String>,
        op: u8,
    },
}

// ---------------------------------------------------------------------------
// Parsing from a raw GatewayPayload
// ---------------------------------------------------------------------------

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`] into a typed event.
    ///
    /// This never fails, unrecognized events become [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => {
                let resumable = payload
                    .d
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                GatewayEvent::InvalidSession(resumable)
            }
            11 => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
            },
        }
    }

    /// Parse an op-0 DISPATCH event by its `t` name.
    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let Some(d) = data else {
            return GatewayEvent::Unknown { event_name, op: 0 };
        };

        let Some(name) = event_name else {
            return GatewayEvent::Unknown {
                event_name: None,
                op: 0,
            };
        };

        match name.as_str() {
            "READY" => match serde_json::from_value::<ReadyEvent>(d) {
                Ok(ready) => GatewayEvent::Ready(ready),
                Err(e) => Self::parse_failure(name, e),
            },
            "GUILD_CREATE" => match serde_json::from_value::<Guild>(d) {
                Ok(guild) => GatewayEvent::GuildCreate(guild),
                Err(e) => Self::parse_failure(name, e),
            },
            "INTERACTION_CREATE" => match serde_json::from_value::<Interaction>(d) {
                Ok(interaction) => GatewayEvent::InteractionCreate(interaction),
                Err(e) => Self::parse_failure(name, e),
            },
            _ => GatewayEvent::Unknown {
                event_name: Some(name),
                op: 0,
            },
        }
    }

    fn parse_failure(event_name: String, e: serde_json::Error) -> Self {
        warn!(event = %event_name, error = %e, "failed to parse dispatch payload");
        GatewayEvent::Unknown {
            event_name: Some(event_name),
            op: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
