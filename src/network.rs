/// Network Module
///
/// Builds and drives the libp2p swarm backing the storage node: Kademlia
/// for peer discovery (consumed only as a `get_closest_peers` oracle, see
/// [`crate::peer_selector`]), `request_response` for the shard send/forward
/// RPCs (see [`crate::transport`]), and gossipsub for the download
/// checklist / delete-shard control bus.
///
/// The swarm itself is owned by a single background task (`run_swarm`);
/// everything else talks to it through [`NetworkHandle`] over a command
/// channel, matching the channel-driven-loop style the upload/download
/// pipelines use for their own state machines.
use std::collections::HashMap;
use std::time::Duration;

use futures::stream::StreamExt;
use libp2p::kad::{self, store::MemoryStore};
use libp2p::request_response::{self, ProtocolSupport};
use libp2p::{gossipsub, noise, swarm::NetworkBehaviour, swarm::SwarmEvent, tcp, yamux};
use libp2p::{Multiaddr, PeerId, Swarm, SwarmBuilder};
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::error::{DfsError, DfsResult};
use crate::peer_selector::NearestPeers;
use crate::transport::{forward_protocol, send_protocol, TransportRequest, TransportResponse};

#[derive(NetworkBehaviour)]
pub struct MeshBehaviour {
    pub kad: kad::Behaviour<MemoryStore>,
    pub transport: request_response::cbor::Behaviour<TransportRequest, TransportResponse>,
    pub gossipsub: gossipsub::Behaviour,
}

/// Inbound events a caller cares about, surfaced from the swarm driver loop.
#[derive(Debug)]
pub enum NetworkEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// An inbound transport request; the receiver must reply on `channel`
    /// via [`NetworkCommand::RespondTransport`].
    TransportRequest {
        peer: PeerId,
        request: TransportRequest,
        channel: request_response::ResponseChannel<TransportResponse>,
    },
    GossipMessage {
        topic: String,
        data: Vec<u8>,
        source: Option<PeerId>,
    },
}

enum NetworkCommand {
    GetClosestPeers {
        key: Vec<u8>,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    SendRequest {
        peer: PeerId,
        request: TransportRequest,
        reply: oneshot::Sender<DfsResult<TransportResponse>>,
    },
    RespondTransport {
        channel: request_response::ResponseChannel<TransportResponse>,
        response: TransportResponse,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
    },
    Subscribe {
        topic: String,
    },
    Dial {
        addr: Multiaddr,
    },
}

/// Handle used by the rest of the application to talk to the swarm driver.
#[derive(Clone)]
pub struct NetworkHandle {
    cmd_tx: mpsc::Sender<NetworkCommand>,
    pub local_peer_id: PeerId,
}

impl NetworkHandle {
    pub async fn send_transport_request(
        &self,
        peer: PeerId,
        request: TransportRequest,
    ) -> DfsResult<TransportResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(NetworkCommand::SendRequest { peer, request, reply: reply_tx })
            .await
            .map_err(|_| DfsError::Network("swarm driver task has shut down".into()))?;
        reply_rx
            .await
            .map_err(|_| DfsError::Network("swarm driver dropped the reply channel".into()))?
    }

    pub async fn respond_transport(
        &self,
        channel: request_response::ResponseChannel<TransportResponse>,
        response: TransportResponse,
    ) -> DfsResult<()> {
        self.cmd_tx
            .send(NetworkCommand::RespondTransport { channel, response })
            .await
            .map_err(|_| DfsError::Network("swarm driver task has shut down".into()))
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> DfsResult<()> {
        self.cmd_tx
            .send(NetworkCommand::Publish { topic: topic.to_string(), data })
            .await
            .map_err(|_| DfsError::Network("swarm driver task has shut down".into()))
    }

    pub async fn subscribe(&self, topic: &str) -> DfsResult<()> {
        self.cmd_tx
            .send(NetworkCommand::Subscribe { topic: topic.to_string() })
            .await
            .map_err(|_| DfsError::Network("swarm driver task has shut down".into()))
    }

    pub async fn dial(&self, addr: Multiaddr) -> DfsResult<()> {
        self.cmd_tx
            .send(NetworkCommand::Dial { addr })
            .await
            .map_err(|_| DfsError::Network("swarm driver task has shut down".into()))
    }
}

#[async_trait::async_trait]
impl NearestPeers for NetworkHandle {
    async fn closest_peers(&self, key: &[u8]) -> Vec<PeerId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(NetworkCommand::GetClosestPeers { key: key.to_vec(), reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

fn build_swarm(config: &Config) -> DfsResult<Swarm<MeshBehaviour>> {
    let swarm = SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
        .map_err(|e| DfsError::Network(format!("failed to configure transport: {}", e)))?
        .with_behaviour(|key| {
            let peer_id = key.public().to_peer_id();

            let store = MemoryStore::new(peer_id);
            let mut kad = kad::Behaviour::new(peer_id, store);
            kad.set_mode(Some(kad::Mode::Server));

            let transport = request_response::cbor::Behaviour::new(
                [
                    (send_protocol(), ProtocolSupport::Full),
                    (forward_protocol(), ProtocolSupport::Full),
                ],
                request_response::Config::default(),
            );

            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(10))
                .validation_mode(gossipsub::ValidationMode::Permissive)
                .build()
                .expect("static gossipsub config is valid");
            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )
            .expect("static gossipsub behaviour config is valid");

            MeshBehaviour { kad, transport, gossipsub }
        })
        .map_err(|e| DfsError::Network(format!("failed to build swarm behaviour: {}", e)))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(config.conn_timeout()))
        .build();

    Ok(swarm)
}

/// Builds the swarm, listens, dials configured bootstrap peers, and spawns
/// the driver task. Returns a handle for commands and a receiver for events.
pub async fn spawn_network(config: &Config) -> DfsResult<(NetworkHandle, mpsc::Receiver<NetworkEvent>)> {
    let mut swarm = build_swarm(config)?;
    let local_peer_id = *swarm.local_peer_id();
    tracing::info!("local peer id: {}", local_peer_id);

    let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.network.default_port)
        .parse()
        .map_err(|e| DfsError::Network(format!("invalid listen address: {:?}", e)))?;
    swarm
        .listen_on(listen_addr)
        .map_err(|e| DfsError::Network(format!("failed to listen: {}", e)))?;

    for node in &config.network.bootstrap_nodes {
        if let (Ok(peer_id), Ok(addr)) = (node.peer_id.parse::<PeerId>(), node.address.parse::<Multiaddr>()) {
            swarm.behaviour_mut().kad.add_address(&peer_id, addr.clone());
            if let Err(e) = swarm.dial(addr) {
                tracing::warn!("failed to dial bootstrap peer {}: {:?}", peer_id, e);
            }
        } else {
            tracing::warn!("skipping malformed bootstrap node entry: {:?}", node);
        }
    }
    if !config.network.bootstrap_nodes.is_empty() {
        let _ = swarm.behaviour_mut().kad.bootstrap();
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);

    tokio::spawn(run_swarm(swarm, cmd_rx, event_tx));

    Ok((NetworkHandle { cmd_tx, local_peer_id }, event_rx))
}

async fn run_swarm(
    mut swarm: Swarm<MeshBehaviour>,
    mut cmd_rx: mpsc::Receiver<NetworkCommand>,
    event_tx: mpsc::Sender<NetworkEvent>,
) {
    let mut pending_queries: HashMap<kad::QueryId, oneshot::Sender<Vec<PeerId>>> = HashMap::new();
    let mut pending_requests: HashMap<
        request_response::OutboundRequestId,
        oneshot::Sender<DfsResult<TransportResponse>>,
    > = HashMap::new();

    loop {
        tokio::select! {
            Some(command) = cmd_rx.recv() => {
                handle_command(&mut swarm, command, &mut pending_queries, &mut pending_requests);
            }
            event = swarm.select_next_some() => {
                handle_swarm_event(&mut swarm, event, &mut pending_queries, &mut pending_requests, &event_tx).await;
            }
        }
    }
}

fn handle_command(
    swarm: &mut Swarm<MeshBehaviour>,
    command: NetworkCommand,
    pending_queries: &mut HashMap<kad::QueryId, oneshot::Sender<Vec<PeerId>>>,
    pending_requests: &mut HashMap<request_response::OutboundRequestId, oneshot::Sender<DfsResult<TransportResponse>>>,
) {
    match command {
        NetworkCommand::GetClosestPeers { key, reply } => {
            let query_id = swarm.behaviour_mut().kad.get_closest_peers(key);
            pending_queries.insert(query_id, reply);
        }
        NetworkCommand::SendRequest { peer, request, reply } => {
            let request_id = swarm.behaviour_mut().transport.send_request(&peer, request);
            pending_requests.insert(request_id, reply);
        }
        NetworkCommand::RespondTransport { channel, response } => {
            if swarm.behaviour_mut().transport.send_response(channel, response).is_err() {
                tracing::warn!("failed to send transport response: channel closed");
            }
        }
        NetworkCommand::Publish { topic, data } => {
            let ident_topic = gossipsub::IdentTopic::new(topic);
            if let Err(e) = swarm.behaviour_mut().gossipsub.publish(ident_topic, data) {
                tracing::warn!("gossipsub publish failed: {:?}", e);
            }
        }
        NetworkCommand::Subscribe { topic } => {
            let ident_topic = gossipsub::IdentTopic::new(topic);
            if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(&ident_topic) {
                tracing::warn!("gossipsub subscribe failed: {:?}", e);
            }
        }
        NetworkCommand::Dial { addr } => {
            if let Err(e) = swarm.dial(addr) {
                tracing::warn!("dial failed: {:?}", e);
            }
        }
    }
}

async fn handle_swarm_event(
    swarm: &mut Swarm<MeshBehaviour>,
    event: SwarmEvent<MeshBehaviourEvent>,
    pending_queries: &mut HashMap<kad::QueryId, oneshot::Sender<Vec<PeerId>>>,
    pending_requests: &mut HashMap<request_response::OutboundRequestId, oneshot::Sender<DfsResult<TransportResponse>>>,
    event_tx: &mpsc::Sender<NetworkEvent>,
) {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => {
            tracing::info!("listening on {}", address);
        }
        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            let _ = event_tx.send(NetworkEvent::PeerConnected(peer_id)).await;
        }
        SwarmEvent::ConnectionClosed { peer_id, .. } => {
            let _ = event_tx.send(NetworkEvent::PeerDisconnected(peer_id)).await;
        }
        SwarmEvent::Behaviour(MeshBehaviourEvent::Kad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetClosestPeers(result),
            ..
        })) => {
            if let Some(reply) = pending_queries.remove(&id) {
                let peers = match result {
                    Ok(ok) => ok.peers.into_iter().map(|p| p.peer_id).collect(),
                    Err(_) => Vec::new(),
                };
                let _ = reply.send(peers);
            }
        }
        SwarmEvent::Behaviour(MeshBehaviourEvent::Transport(request_response::Event::Message {
            peer,
            message,
            ..
        })) => match message {
            request_response::Message::Request { request, channel, .. } => {
                let _ = event_tx
                    .send(NetworkEvent::TransportRequest { peer, request, channel })
                    .await;
            }
            request_response::Message::Response { request_id, response } => {
                if let Some(reply) = pending_requests.remove(&request_id) {
                    let _ = reply.send(Ok(response));
                }
            }
        },
        SwarmEvent::Behaviour(MeshBehaviourEvent::Transport(request_response::Event::OutboundFailure {
            request_id,
            error,
            ..
        })) => {
            if let Some(reply) = pending_requests.remove(&request_id) {
                let _ = reply.send(Err(DfsError::Network(format!("transport request failed: {:?}", error))));
            }
        }
        SwarmEvent::Behaviour(MeshBehaviourEvent::Gossipsub(gossipsub::Event::Message {
            message,
            propagation_source,
            ..
        })) => {
            let _ = event_tx
                .send(NetworkEvent::GossipMessage {
                    topic: message.topic.to_string(),
                    data: message.data,
                    source: Some(propagation_source),
                })
                .await;
        }
        _ => {}
    }
}
