use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Errors raised while decoding a frame from the real-time channel
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("`{tag}` frame is missing `{field}`")]
    MissingField {
        tag: &'static str,
        field: &'static str,
    },

    #[error("`{tag}` frame has an unexpected payload: {reason}")]
    BadPayload { tag: &'static str, reason: String },
}

/// Raw frame shape: `{t: tag, d: payload, v: sequence}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub t: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u64>,
}

/// UCI-like move text as it travels on the wire (`e2e4`, `e7e8q`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompactMove(String);

impl CompactMove {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompactMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompactMove {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

impl From<String> for CompactMove {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Authoritative remaining time for both sides, whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub white_remaining_seconds: u64,
    pub black_remaining_seconds: u64,
}

/// Castling squares reported next to a king move
///
/// The server may describe castling with the rook's squares in `uci`; `king`
/// holds the king's real origin and destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CastleInfo {
    #[serde(default)]
    pub king: Option<(String, String)>,
    #[serde(default)]
    pub rook: Option<(String, String)>,
}

/// Status name attached to moves and game-end frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStatus {
    Mate,
    Resign,
    OutOfTime,
    Draw,
    Stalemate,
    Other(String),
}

impl GameStatus {
    pub fn from_name(name: &str) -> Self {
        match name {
            "mate" => GameStatus::Mate,
            "resign" => GameStatus::Resign,
            "outoftime" | "timeout" => GameStatus::OutOfTime,
            "draw" => GameStatus::Draw,
            "stalemate" => GameStatus::Stalemate,
            other => GameStatus::Other(other.to_owned()),
        }
    }

    /// Whether this status ends the game
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Other(_))
    }
}

/// Winner announced by an `end` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Victor {
    White,
    Black,
    Draw,
}

impl Victor {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "white" => Some(Victor::White),
            "black" => Some(Victor::Black),
            "draw" => Some(Victor::Draw),
            _ => None,
        }
    }
}

/// A move delivered by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveEvent {
    pub seq: u64,
    pub uci: CompactMove,
    pub ply: Option<u32>,
    pub clock: Option<ClockSnapshot>,
    pub castle: Option<CastleInfo>,
    pub status: Option<GameStatus>,
}

impl MoveEvent {
    /// True when the status marks this move as checkmate
    pub fn is_mate(&self) -> bool {
        matches!(self.status, Some(GameStatus::Mate))
    }
}

/// Typed server event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Move(MoveEvent),
    Batch(Vec<InboundEvent>),
    Reload {
        seq: u64,
    },
    GameEnd {
        victor: Victor,
        status: Option<GameStatus>,
    },
    Heartbeat,
}

#[derive(Deserialize)]
struct MovePayload {
    uci: Option<String>,
    ply: Option<u32>,
    clock: Option<WireClock>,
    castle: Option<CastleInfo>,
    status: Option<WireStatus>,
}

#[derive(Deserialize)]
struct WireClock {
    white: f64,
    black: f64,
}

#[derive(Deserialize)]
struct WireStatus {
    name: String,
}

impl From<WireClock> for ClockSnapshot {
    fn from(clock: WireClock) -> Self {
        Self {
            white_remaining_seconds: clock.white.max(0.0).floor() as u64,
            black_remaining_seconds: clock.black.max(0.0).floor() as u64,
        }
    }
}

impl InboundEvent {
    /// Parse one text frame.
    ///
    /// Returns `Ok(None)` for frames this client does not act on (chat,
    /// crowd updates, ...). The bare `0` text is the server's pong.
    pub fn parse(text: &str) -> Result<Option<Self>, ProtocolError> {
        let trimmed = text.trim();
        if trimmed == "0" {
            return Ok(Some(InboundEvent::Heartbeat));
        }
        let envelope: Envelope = serde_json::from_str(trimmed)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>, ProtocolError> {
        match envelope.t.as_str() {
            "move" => parse_move(envelope.v, envelope.d).map(|m| Some(InboundEvent::Move(m))),
            "b" => parse_batch(envelope.d).map(Some),
            "reload" => Ok(Some(InboundEvent::Reload {
                seq: envelope.v.unwrap_or(0),
            })),
            "end" => parse_end(envelope.d).map(Some),
            "p" | "n" => Ok(Some(InboundEvent::Heartbeat)),
            _ => Ok(None),
        }
    }

    /// Sequence number carried by the event, if any
    pub fn seq(&self) -> Option<u64> {
        match self {
            InboundEvent::Move(m) => Some(m.seq),
            InboundEvent::Reload { seq } => Some(*seq),
            InboundEvent::Batch(events) => events.iter().filter_map(InboundEvent::seq).max(),
            InboundEvent::GameEnd { .. } | InboundEvent::Heartbeat => None,
        }
    }
}

fn parse_move(v: Option<u64>, d: Option<Value>) -> Result<MoveEvent, ProtocolError> {
    let payload = d.ok_or(ProtocolError::MissingField {
        tag: "move",
        field: "d",
    })?;
    let payload: MovePayload = serde_json::from_value(payload)?;
    let uci = payload.uci.ok_or(ProtocolError::MissingField {
        tag: "move",
        field: "uci",
    })?;
    // Older frames only carry the resulting ply; the move that produces ply N has seq N - 1.
    let seq = v
        .or_else(|| payload.ply.and_then(|p| p.checked_sub(1)).map(u64::from))
        .ok_or(ProtocolError::MissingField {
            tag: "move",
            field: "v",
        })?;

    Ok(MoveEvent {
        seq,
        uci: CompactMove(uci),
        ply: payload.ply,
        clock: payload.clock.map(ClockSnapshot::from),
        castle: payload.castle,
        status: payload.status.map(|s| GameStatus::from_name(&s.name)),
    })
}

fn parse_batch(d: Option<Value>) -> Result<InboundEvent, ProtocolError> {
    let items = match d {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(ProtocolError::BadPayload {
                tag: "b",
                reason: format!("expected an array, got {other}"),
            })
        }
    };

    // A bad entry is skipped so the entries around it still apply
    let mut events = Vec::with_capacity(items.len());
    for item in items {
        let decoded = serde_json::from_value::<Envelope>(item)
            .map_err(ProtocolError::from)
            .and_then(InboundEvent::from_envelope);
        match decoded {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => warn!("[NETWORK] Skipping undecodable batch entry: {}", e),
        }
    }
    Ok(InboundEvent::Batch(events))
}

fn parse_end(d: Option<Value>) -> Result<InboundEvent, ProtocolError> {
    let bad = |reason: String| ProtocolError::BadPayload { tag: "end", reason };

    match d {
        None | Some(Value::Null) => Ok(InboundEvent::GameEnd {
            victor: Victor::Draw,
            status: None,
        }),
        Some(Value::String(name)) => {
            let victor = Victor::from_name(&name).ok_or_else(|| bad(format!("unknown winner `{name}`")))?;
            Ok(InboundEvent::GameEnd {
                victor,
                status: None,
            })
        }
        Some(Value::Object(map)) => {
            let victor = match map.get("winner").and_then(Value::as_str) {
                Some(name) => Victor::from_name(name).ok_or_else(|| bad(format!("unknown winner `{name}`")))?,
                None => Victor::Draw,
            };
            let status = match map.get("status") {
                Some(Value::String(name)) => Some(GameStatus::from_name(name)),
                Some(Value::Object(status)) => status
                    .get("name")
                    .and_then(Value::as_str)
                    .map(GameStatus::from_name),
                _ => None,
            };
            Ok(InboundEvent::GameEnd { victor, status })
        }
        Some(other) => Err(bad(format!("unexpected value {other}"))),
    }
}

/// Frames the client sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Liveness ping carrying the client's applied ply count
    Ping { ply: u32 },
    /// Locally played move; `promotion` is the lowercase role letter
    Move {
        from: String,
        to: String,
        promotion: Option<char>,
    },
}

impl ClientMessage {
    pub fn to_envelope(&self) -> Envelope {
        match self {
            ClientMessage::Ping { ply } => Envelope {
                t: "p".to_owned(),
                d: None,
                v: Some(u64::from(*ply)),
            },
            ClientMessage::Move {
                from,
                to,
                promotion,
            } => {
                let mut d = json!({ "from": from, "to": to });
                if let (Some(role), Some(map)) = (promotion, d.as_object_mut()) {
                    map.insert("promotion".to_owned(), Value::String(role.to_string()));
                }
                Envelope {
                    t: "move".to_owned(),
                    d: Some(d),
                    v: None,
                }
            }
        }
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.to_envelope())?)
    }
}
