use glam::Vec2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domain events
// ---------------------------------------------------------------------------

/// Which paddle a client controls. Player 0 is on the left, player 1 on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Side> {
        match index {
            0 => Some(Side::Left),
            1 => Some(Side::Right),
            _ => None,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    fn wire(self) -> u8 {
        self.index() as u8
    }
}

/// State changes one peer must tell the other about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    /// Ball served with this velocity
    Start { velocity: Vec2 },
    /// A paddle's top edge moved (sent every tick)
    Position { paddle: Side, position: f32 },
    /// Authoritative ball state right after a rebound
    Rally { position: Vec2, velocity: Vec2 },
    /// The sender missed; both sides start a new round
    Reset,
}

/// Reasons a message is refused or dropped. None of them stop the game.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Malformed payload on {topic}: {reason}")]
    Malformed { topic: String, reason: String },
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
    #[error("Unknown player id: {0}")]
    UnknownPlayer(u8),
    #[error("NaN or Infinity in payload on {0}")]
    NonFinite(String),
    #[error("Peer tried to move our own paddle")]
    OwnPaddle,
    #[error("Stale message: seq={seq}, last applied={last}")]
    Stale { seq: u64, last: u64 },
    #[error("Message echoed back from our own client")]
    Echo,
}

// ---------------------------------------------------------------------------
// Wire messages (JSON, one topic per kind)
// ---------------------------------------------------------------------------

/// Fields every message carries so the receiver can drop echoes and stale copies.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Header {
    /// Player id of the sender (0 or 1)
    pub from: u8,
    /// Random per-process id, lets a restarted peer begin a fresh sequence
    pub session: u32,
    pub seq: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StartMsg {
    #[serde(flatten)]
    pub header: Header,
    pub dx: f32,
    pub dy: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PositionMsg {
    #[serde(flatten)]
    pub header: Header,
    pub paddle: u8,
    pub y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RallyMsg {
    #[serde(flatten)]
    pub header: Header,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResetMsg {
    #[serde(flatten)]
    pub header: Header,
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Topics {
    pub game_id: String,
}

impl Topics {
    pub fn new(game_id: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
        }
    }

    pub fn start(&self) -> String {
        format!("pong/game/{}/start", self.game_id)
    }

    pub fn rally(&self) -> String {
        format!("pong/game/{}/rally", self.game_id)
    }

    pub fn reset(&self) -> String {
        format!("pong/game/{}/reset", self.game_id)
    }

    pub fn position(&self, side: Side) -> String {
        format!("pong/game/{}/p{}/position", self.game_id, side.index())
    }

    /// Everything this client needs to hear from `opponent`.
    pub fn inbound(&self, opponent: Side) -> [String; 4] {
        [
            self.start(),
            self.rally(),
            self.reset(),
            self.position(opponent),
        ]
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// A decoded message from the peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inbound {
    pub header: Header,
    pub event: SyncEvent,
}

/// Stamps outgoing events with the sender's header.
#[derive(Debug, Clone)]
pub struct Outbox {
    from: Side,
    session: u32,
    next_seq: u64,
}

impl Outbox {
    pub fn new(from: Side, session: u32) -> Self {
        Self {
            from,
            session,
            next_seq: 1,
        }
    }

    fn next_header(&mut self) -> Header {
        let seq = self.next_seq;
        self.next_seq += 1;
        Header {
            from: self.from.wire(),
            session: self.session,
            seq,
            timestamp: now_ms(),
        }
    }

    /// Returns the topic and JSON payload for `event`. Events carrying NaN or
    /// infinite numbers are refused, since JSON would turn them into `null`.
    pub fn encode(
        &mut self,
        topics: &Topics,
        event: &SyncEvent,
    ) -> Result<(String, Vec<u8>), SyncError> {
        let (topic, numbers) = match *event {
            SyncEvent::Start { velocity } => (topics.start(), vec![velocity.x, velocity.y]),
            SyncEvent::Position { paddle, position } => (topics.position(paddle), vec![position]),
            SyncEvent::Rally { position, velocity } => (
                topics.rally(),
                vec![position.x, position.y, velocity.x, velocity.y],
            ),
            SyncEvent::Reset => (topics.reset(), Vec::new()),
        };
        finite(&topic, &numbers)?;

        let header = self.next_header();
        let payload = match *event {
            SyncEvent::Start { velocity } => serde_json::to_vec(&StartMsg {
                header,
                dx: velocity.x,
                dy: velocity.y,
            }),
            SyncEvent::Position { paddle, position } => serde_json::to_vec(&PositionMsg {
                header,
                paddle: paddle.wire(),
                y: position,
            }),
            SyncEvent::Rally { position, velocity } => serde_json::to_vec(&RallyMsg {
                header,
                x: position.x,
                y: position.y,
                dx: velocity.x,
                dy: velocity.y,
            }),
            SyncEvent::Reset => serde_json::to_vec(&ResetMsg { header }),
        };
        let payload = payload.map_err(|e| SyncError::Malformed {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;
        Ok((topic, payload))
    }
}

fn parse<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, SyncError> {
    serde_json::from_slice(payload).map_err(|e| SyncError::Malformed {
        topic: topic.to_string(),
        reason: e.to_string(),
    })
}

fn finite(topic: &str, values: &[f32]) -> Result<(), SyncError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SyncError::NonFinite(topic.to_string()))
    }
}

fn side_of(id: u8) -> Result<Side, SyncError> {
    Side::from_index(id).ok_or(SyncError::UnknownPlayer(id))
}

/// Decode a payload according to the topic it arrived on.
pub fn decode(topics: &Topics, topic: &str, payload: &[u8]) -> Result<Inbound, SyncError> {
    let (header, event) = if topic == topics.start() {
        let msg: StartMsg = parse(topic, payload)?;
        finite(topic, &[msg.dx, msg.dy])?;
        (
            msg.header,
            SyncEvent::Start {
                velocity: Vec2::new(msg.dx, msg.dy),
            },
        )
    } else if topic == topics.rally() {
        let msg: RallyMsg = parse(topic, payload)?;
        finite(topic, &[msg.x, msg.y, msg.dx, msg.dy])?;
        (
            msg.header,
            SyncEvent::Rally {
                position: Vec2::new(msg.x, msg.y),
                velocity: Vec2::new(msg.dx, msg.dy),
            },
        )
    } else if topic == topics.reset() {
        let msg: ResetMsg = parse(topic, payload)?;
        (msg.header, SyncEvent::Reset)
    } else if topic == topics.position(Side::Left) || topic == topics.position(Side::Right) {
        let msg: PositionMsg = parse(topic, payload)?;
        finite(topic, &[msg.y])?;
        let paddle = side_of(msg.paddle)?;
        if topics.position(paddle) != topic {
            return Err(SyncError::Malformed {
                topic: topic.to_string(),
                reason: format!("paddle {} published on the wrong topic", msg.paddle),
            });
        }
        (
            msg.header,
            SyncEvent::Position {
                paddle,
                position: msg.y,
            },
        )
    } else {
        return Err(SyncError::UnknownTopic(topic.to_string()));
    };

    side_of(header.from)?;
    Ok(Inbound { header, event })
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Drops our own echoes and anything older than what was already applied.
///
/// MQTT only orders messages within one topic, and positions travel at a
/// different QoS than the other events, so each event kind keeps its own mark.
#[derive(Debug, Clone)]
pub struct PeerFilter {
    self_id: Side,
    last: [Option<(u32, u64)>; 4],
}

fn kind_index(event: &SyncEvent) -> usize {
    match event {
        SyncEvent::Start { .. } => 0,
        SyncEvent::Position { .. } => 1,
        SyncEvent::Rally { .. } => 2,
        SyncEvent::Reset => 3,
    }
}

impl PeerFilter {
    pub fn new(self_id: Side) -> Self {
        Self {
            self_id,
            last: [None; 4],
        }
    }

    pub fn accept(&mut self, inbound: &Inbound) -> Result<(), SyncError> {
        let header = inbound.header;
        if header.from == self.self_id.wire() {
            return Err(SyncError::Echo);
        }
        let mark = &mut self.last[kind_index(&inbound.event)];
        if let Some((session, last)) = *mark {
            if session == header.session && header.seq <= last {
                return Err(SyncError::Stale {
                    seq: header.seq,
                    last,
                });
            }
        }
        *mark = Some((header.session, header.seq));
        Ok(())
    }
}

pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
