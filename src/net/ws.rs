//! WebSocket streaming: WorldUpdate frames out, command messages in.
//!
//! One producer task builds a diff each second from the store's dirty
//! tracking plus tapped events and broadcasts it to every connection; each
//! client receives a full snapshot on connect. The read side accepts
//! control commands (start/stop/step, spawn/remove, orders) in either JSON
//! text or MessagePack binary frames.
//!
//! The simulation mutex is only held for short copy-out sections, never
//! across an await.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::codec::Codec;
use crate::agents::{Component, Sex};
use crate::events::{EventKind, SimulationEvent};
use crate::ports::SpawnSpec;
use crate::simulation::{OrderSpec, Simulation};
use crate::snapshot::WorldSnapshot;
use crate::types::{AgentId, Position};

/// Diff stream cadence, ms
const DIFF_INTERVAL_MS: u64 = 1_000;

/// Event kinds forwarded to viewers
const STREAMED_EVENTS: [EventKind; 9] = [
    EventKind::AgentBorn,
    EventKind::AgentRemoved,
    EventKind::CombatKill,
    EventKind::NeedsCritical,
    EventKind::GroupFormed,
    EventKind::BlessingGranted,
    EventKind::AnimalDied,
    EventKind::ProductionOutput,
    EventKind::TerrainModified,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDiff {
    pub id: AgentId,
    pub components: Vec<Component>,
}

/// Frames streamed to viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldUpdate {
    FullSnapshot {
        timestamp: u64,
        snapshot: Box<WorldSnapshot>,
    },
    Diff {
        timestamp: u64,
        changed: Vec<AgentDiff>,
        events: Vec<SimulationEvent>,
    },
}

/// Commands accepted on the read side
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandMessage {
    Start,
    Stop,
    Step,
    SpawnAgent {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        sex: Option<String>,
        #[serde(default)]
        age_years: Option<f32>,
        #[serde(default)]
        x: Option<f32>,
        #[serde(default)]
        y: Option<f32>,
    },
    RemoveAgent {
        agent_id: String,
    },
    IssueOrder {
        agent_id: String,
        order: OrderSpec,
    },
}

type EventOutbox = Arc<Mutex<Vec<SimulationEvent>>>;

/// Register bus taps that copy streamed events into the outbox
fn register_event_taps(sim: &Arc<Mutex<Simulation>>, outbox: EventOutbox) {
    let Ok(mut sim) = sim.lock() else {
        return;
    };
    for kind in STREAMED_EVENTS {
        let outbox = outbox.clone();
        sim.world.events.on(kind, move |event, _sink| {
            if let Ok(mut pending) = outbox.lock() {
                pending.push(event.clone());
            }
            Ok(())
        });
    }
}

fn to_message(codec: Codec, update: &WorldUpdate) -> Option<Message> {
    match codec.encode(update) {
        Ok(bytes) if codec.is_binary() => Some(Message::Binary(bytes)),
        Ok(bytes) => String::from_utf8(bytes).ok().map(Message::Text),
        Err(err) => {
            error!("WS: encode failed: {}", err);
            None
        }
    }
}

/// Start the WebSocket endpoint; runs until the process exits
pub async fn run_ws_server(
    sim: Arc<Mutex<Simulation>>,
    port: u16,
    codec: Codec,
) -> crate::errors::Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("WS: streaming endpoint listening on ws://0.0.0.0:{}", port);

    let outbox: EventOutbox = Arc::new(Mutex::new(Vec::new()));
    register_event_taps(&sim, outbox.clone());

    let (broadcaster, _) = broadcast::channel::<Message>(64);
    tokio::spawn(diff_producer(
        sim.clone(),
        broadcaster.clone(),
        outbox,
        codec,
    ));

    while let Ok((stream, addr)) = listener.accept().await {
        debug!("WS: new connection from {}", addr);
        let sim = sim.clone();
        let receiver = broadcaster.subscribe();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws_stream) => {
                    handle_connection(ws_stream, sim, receiver, codec, addr.to_string()).await;
                }
                Err(err) => {
                    warn!("WS: handshake with {} failed: {}", addr, err);
                }
            }
        });
    }
    Ok(())
}

/// Periodically turn dirty components + tapped events into one broadcast
async fn diff_producer(
    sim: Arc<Mutex<Simulation>>,
    broadcaster: broadcast::Sender<Message>,
    outbox: EventOutbox,
    codec: Codec,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(DIFF_INTERVAL_MS));
    loop {
        interval.tick().await;
        if broadcaster.receiver_count() == 0 {
            continue;
        }
        let update = {
            let Ok(mut sim) = sim.lock() else {
                continue;
            };
            let timestamp = sim.world.now();
            let dirty = sim.world.store.take_dirty();
            let changed: Vec<AgentDiff> = dirty
                .into_iter()
                .filter(|(id, _)| sim.world.store.has_agent(id))
                .map(|(id, kinds)| AgentDiff {
                    components: sim.world.store.get_components(&id, &kinds),
                    id,
                })
                .collect();
            let events = outbox
                .lock()
                .map(|mut pending| pending.drain(..).collect::<Vec<_>>())
                .unwrap_or_default();
            if changed.is_empty() && events.is_empty() {
                None
            } else {
                Some(WorldUpdate::Diff {
                    timestamp,
                    changed,
                    events,
                })
            }
        };
        if let Some(update) = update {
            if let Some(message) = to_message(codec, &update) {
                let _ = broadcaster.send(message);
            }
        }
    }
}

async fn handle_connection(
    ws_stream: WebSocketStream<TcpStream>,
    sim: Arc<Mutex<Simulation>>,
    mut updates: broadcast::Receiver<Message>,
    codec: Codec,
    client: String,
) {
    let (mut sink, mut source) = ws_stream.split();

    // Full snapshot on connect
    let snapshot_update = {
        let Ok(sim) = sim.lock() else {
            return;
        };
        WorldUpdate::FullSnapshot {
            timestamp: sim.world.now(),
            snapshot: Box::new(sim.export_snapshot("stream")),
        }
    };
    if let Some(message) = to_message(codec, &snapshot_update) {
        if sink.send(message).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(message) => {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WS: client {} lagged, skipped {} updates", client, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match Codec::decode_text::<CommandMessage>(&text) {
                            Ok(command) => handle_command(&sim, command),
                            Err(err) => warn!("WS: bad command from {}: {}", client, err),
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        match Codec::decode::<CommandMessage>(&bytes) {
                            Ok(command) => handle_command(&sim, command),
                            Err(err) => warn!("WS: bad command from {}: {}", client, err),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WS: client {} disconnected", client);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("WS: error from {}: {}", client, err);
                        break;
                    }
                }
            }
        }
    }
}

fn handle_command(sim: &Arc<Mutex<Simulation>>, command: CommandMessage) {
    let Ok(mut sim) = sim.lock() else {
        return;
    };
    match command {
        CommandMessage::Start => sim.start(),
        CommandMessage::Stop => sim.stop(),
        CommandMessage::Step => sim.step(),
        CommandMessage::SpawnAgent {
            name,
            sex,
            age_years,
            x,
            y,
        } => {
            let spec = SpawnSpec {
                name,
                sex: match sex.as_deref() {
                    Some("male") => Some(Sex::Male),
                    Some("female") => Some(Sex::Female),
                    _ => None,
                },
                age_years: age_years.unwrap_or(20.0),
                position: match (x, y) {
                    (Some(x), Some(y)) => Some(Position::new(x, y)),
                    _ => None,
                },
                parents: None,
                immortal: false,
            };
            if let Err(err) = sim.spawn_agent(spec) {
                warn!("WS: spawn command failed: {}", err);
            }
        }
        CommandMessage::RemoveAgent { agent_id } => {
            if let Err(err) = sim.remove_agent(&AgentId::new(agent_id), "viewer command") {
                warn!("WS: remove command failed: {}", err);
            }
        }
        CommandMessage::IssueOrder { agent_id, order } => {
            if let Err(err) = sim.issue_order(&AgentId::new(agent_id), &order) {
                warn!("WS: order command failed: {}", err);
            }
        }
    }
}
