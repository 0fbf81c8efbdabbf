use rumqttc::{Client, MqttOptions, QoS};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, TryRecvError, TrySendError},
    Arc,
};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::protocol::{decode, Inbound, Outbox, PeerFilter, Side, SyncError, SyncEvent, Topics};

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No peer at all; events go nowhere
    Offline,
    Connecting,
    Connected,
    Disconnected,
}

/// Carries [`SyncEvent`]s between the two peers.
///
/// The game loop calls `poll` at the top of a tick and `send` after stepping,
/// so remote state is never applied halfway through a step.
pub trait SyncTransport {
    /// Queue an event for the peer without blocking.
    fn send(&mut self, event: SyncEvent);
    /// Events from the peer accepted since the last call, oldest first.
    fn poll(&mut self) -> Vec<SyncEvent>;
    fn status(&self) -> LinkStatus;
}

/// Single-player practice: nothing is sent, nothing arrives.
#[derive(Debug, Default)]
pub struct OfflineTransport;

impl SyncTransport for OfflineTransport {
    fn send(&mut self, _event: SyncEvent) {}

    fn poll(&mut self) -> Vec<SyncEvent> {
        Vec::new()
    }

    fn status(&self) -> LinkStatus {
        LinkStatus::Offline
    }
}

/// Run an inbound message through the ordering filter, logging what gets dropped.
fn admit(filter: &mut PeerFilter, inbound: Inbound) -> Option<SyncEvent> {
    match filter.accept(&inbound) {
        Ok(()) => Some(inbound.event),
        Err(SyncError::Echo) => None,
        Err(e @ SyncError::Stale { .. }) => {
            debug!("dropping inbound message: {}", e);
            None
        }
        Err(e) => {
            warn!("dropping inbound message: {}", e);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub game_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            game_id: "demo".to_string(),
            username: None,
            password: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT relay
// ---------------------------------------------------------------------------

/// What the network thread hands back to the game loop
#[derive(Debug, Clone)]
enum NetworkEvent {
    Message(Inbound),
    Connected,
    Disconnected,
}

/// Both peers publish to and subscribe on the same broker topics; the broker
/// is a dumb relay and holds no game state.
pub struct MqttTransport {
    rx: mpsc::Receiver<NetworkEvent>,
    tx: mpsc::SyncSender<SyncEvent>,
    client: Client,
    filter: PeerFilter,
    status: LinkStatus,
}

fn qos_for(event: &SyncEvent) -> QoS {
    match event {
        // sent every tick, losing one is harmless
        SyncEvent::Position { .. } => QoS::AtMostOnce,
        _ => QoS::AtLeastOnce,
    }
}

impl MqttTransport {
    /// Spawn the MQTT threads for `self_id` and return immediately.
    pub fn connect(config: NetworkConfig, self_id: Side) -> Self {
        let (event_tx, event_rx) = mpsc::channel::<NetworkEvent>();
        let (outbound_tx, outbound_rx) = mpsc::sync_channel::<SyncEvent>(64);

        let topics = Topics::new(&config.game_id);
        let session: u32 = rand::random();
        let client_id = format!("net-pong-p{}-{:08x}", self_id.index(), session);

        let mut mqttoptions = MqttOptions::new(client_id, &config.broker_host, config.broker_port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if let (Some(user), Some(pass)) = (config.username, config.password) {
            mqttoptions.set_credentials(user, pass);
        }

        let (client, mut connection) = Client::new(mqttoptions, 64);
        let online = Arc::new(AtomicBool::new(false));
        info!(
            host = %config.broker_host,
            port = config.broker_port,
            game = %config.game_id,
            "connecting to broker"
        );

        // Publisher: stamps and forwards everything the game loop sends.
        // Only the connection thread drains rumqttc's request channel, so
        // nothing here may block on it.
        let publish_client = client.clone();
        let publish_topics = topics.clone();
        let publish_online = Arc::clone(&online);
        thread::spawn(move || {
            let mut outbox = Outbox::new(self_id, session);
            while let Ok(event) = outbound_rx.recv() {
                let position = matches!(event, SyncEvent::Position { .. });
                if position && !publish_online.load(Ordering::Relaxed) {
                    continue;
                }
                let (topic, payload) = match outbox.encode(&publish_topics, &event) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(?event, "not publishing: {}", e);
                        continue;
                    }
                };
                if let Err(e) = publish_client.try_publish(topic, qos_for(&event), false, payload) {
                    if position {
                        debug!("position publish dropped: {}", e);
                    } else {
                        warn!(?event, "publish dropped: {}", e);
                    }
                }
            }
        });

        // Incoming messages
        let subscribe_client = client.clone();
        let listener_online = Arc::clone(&online);
        thread::spawn(move || {
            let inbound_topics = topics.inbound(self_id.opponent());
            let mut unsubscribed: Vec<String> = Vec::new();
            for notification in connection.iter() {
                let forwarded = match notification {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                        listener_online.store(true, Ordering::Relaxed);
                        // clean session: subscriptions do not survive a reconnect
                        unsubscribed = inbound_topics.to_vec();
                        event_tx.send(NetworkEvent::Connected)
                    }
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(msg))) => {
                        match decode(&topics, &msg.topic, &msg.payload) {
                            Ok(inbound) => event_tx.send(NetworkEvent::Message(inbound)),
                            Err(e) => {
                                warn!("dropping inbound message: {}", e);
                                Ok(())
                            }
                        }
                    }
                    Err(e) => {
                        debug!("connection error: {}", e);
                        listener_online.store(false, Ordering::Relaxed);
                        unsubscribed.clear();
                        let sent = event_tx.send(NetworkEvent::Disconnected);
                        thread::sleep(Duration::from_secs(1));
                        sent
                    }
                    _ => Ok(()),
                };
                if forwarded.is_err() {
                    // game loop is gone
                    break;
                }

                // a full request channel leaves the topic pending for the next notification
                unsubscribed.retain(|topic| {
                    subscribe_client
                        .try_subscribe(topic.as_str(), QoS::AtLeastOnce)
                        .is_err()
                });
            }
        });

        Self {
            rx: event_rx,
            tx: outbound_tx,
            client,
            filter: PeerFilter::new(self_id),
            status: LinkStatus::Connecting,
        }
    }
}

impl SyncTransport for MqttTransport {
    fn send(&mut self, event: SyncEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(SyncEvent::Position { .. })) => {}
            Err(TrySendError::Full(event)) => warn!(?event, "outbound queue full, dropping"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn poll(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(NetworkEvent::Message(inbound)) => {
                    if let Some(event) = admit(&mut self.filter, inbound) {
                        events.push(event);
                    }
                }
                Ok(NetworkEvent::Connected) => {
                    if self.status != LinkStatus::Connected {
                        info!("connected to broker");
                    }
                    self.status = LinkStatus::Connected;
                }
                Ok(NetworkEvent::Disconnected) => {
                    if self.status != LinkStatus::Disconnected {
                        warn!("lost connection to broker, retrying");
                    }
                    self.status = LinkStatus::Disconnected;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.status = LinkStatus::Disconnected;
                    break;
                }
            }
        }
        events
    }

    fn status(&self) -> LinkStatus {
        self.status
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("disconnect not sent: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory pair for tests: same encoding and filtering as the broker path
// ---------------------------------------------------------------------------

#[cfg(test)]
pub struct MemoryTransport {
    topics: Topics,
    outbox: Outbox,
    filter: PeerFilter,
    tx: mpsc::Sender<(String, Vec<u8>)>,
    rx: mpsc::Receiver<(String, Vec<u8>)>,
}

#[cfg(test)]
impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let topics = Topics::new("memory");
        let (left_tx, right_rx) = mpsc::channel();
        let (right_tx, left_rx) = mpsc::channel();
        let left = MemoryTransport {
            topics: topics.clone(),
            outbox: Outbox::new(Side::Left, 1),
            filter: PeerFilter::new(Side::Left),
            tx: left_tx,
            rx: left_rx,
        };
        let right = MemoryTransport {
            topics,
            outbox: Outbox::new(Side::Right, 2),
            filter: PeerFilter::new(Side::Right),
            tx: right_tx,
            rx: right_rx,
        };
        (left, right)
    }
}

#[cfg(test)]
impl SyncTransport for MemoryTransport {
    fn send(&mut self, event: SyncEvent) {
        match self.outbox.encode(&self.topics, &event) {
            Ok(message) => {
                self.tx.send(message).ok();
            }
            Err(e) => warn!(?event, "not publishing: {}", e),
        }
    }

    fn poll(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok((topic, payload)) = self.rx.try_recv() {
            match decode(&self.topics, &topic, &payload) {
                Ok(inbound) => events.extend(admit(&mut self.filter, inbound)),
                Err(e) => warn!("dropping inbound message: {}", e),
            }
        }
        events
    }

    fn status(&self) -> LinkStatus {
        LinkStatus::Connected
    }
}
