use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::time::Duration;

use futures::StreamExt;
use libp2p::request_response::{self, OutboundRequestId};
use libp2p::swarm::{Config as SwarmConfig, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, identify, identity, kad, mdns};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::common::{ConnectionHandle, NetworkCommand, NetworkEvent, WireAck, WirePayload};
use crate::config::AppConfig;

use super::adapter::{HandleIds, parse_target};
use super::behavior::{ChatBehavior, ChatBehaviorEvent, build_behavior};
use super::transport::build_transport;

/// Owns the libp2p swarm. Runs as a background task and talks to the
/// session only through the command and event channels.
pub struct P2PClient {
    event_sender: mpsc::Sender<NetworkEvent>,
    command_receiver: mpsc::Receiver<NetworkCommand>,
    bootstrap_peers: Vec<(PeerId, Multiaddr)>,
    config: AppConfig,
    handle_ids: HandleIds,
    /// Peers with a completed handshake, in either direction.
    sessions: HashMap<PeerId, ConnectionHandle>,
    pending_hellos: HashMap<OutboundRequestId, ConnectionHandle>,
    pending_sends: HashMap<OutboundRequestId, ConnectionHandle>,
}

impl P2PClient {
    pub fn new(
        event_sender: mpsc::Sender<NetworkEvent>,
        command_receiver: mpsc::Receiver<NetworkCommand>,
        bootstrap_peers: Vec<(PeerId, Multiaddr)>,
        config: AppConfig,
        handle_ids: HandleIds,
    ) -> Self {
        Self {
            event_sender,
            command_receiver,
            bootstrap_peers,
            config,
            handle_ids,
            sessions: HashMap::new(),
            pending_hellos: HashMap::new(),
            pending_sends: HashMap::new(),
        }
    }

    pub async fn run(mut self, local_key: identity::Keypair) -> Result<(), Box<dyn Error>> {
        let local_peer_id = PeerId::from(local_key.public());
        log::info!("Local PeerID: {local_peer_id}");

        let transport = build_transport(&local_key)?;
        let behavior = build_behavior(&local_key, local_peer_id, self.config.enable_mdns)?;

        let idle_timeout = Duration::from_secs(self.config.idle_connection_timeout_secs);
        let swarm_config =
            SwarmConfig::with_tokio_executor().with_idle_connection_timeout(idle_timeout);
        let mut swarm = Swarm::new(transport, behavior, local_peer_id, swarm_config);

        swarm.listen_on(self.config.listen_address.parse()?)?;

        if self.bootstrap_peers.is_empty() {
            log::info!("No bootstrap peers configured; relying on LAN discovery and full addresses");
        } else {
            for (peer_id, addr) in &self.bootstrap_peers {
                log::info!("Adding bootstrap peer {peer_id} at {addr}");
                swarm.behaviour_mut().kad.add_address(peer_id, addr.clone());
            }
            if let Err(err) = swarm.behaviour_mut().kad.bootstrap() {
                log::warn!("Failed to trigger Kademlia bootstrap: {err}");
            }
        }

        self.emit(NetworkEvent::Ready {
            local_id: local_peer_id.to_string(),
        })
        .await;
        log::info!("Network event loop started");

        let mut keep_alive = time::interval(keep_alive_period(idle_timeout));
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &mut swarm).await,
                        None => break,
                    }
                }
                event = swarm.select_next_some() => {
                    self.handle_swarm_event(event, &mut swarm).await;
                }
                _ = keep_alive.tick() => {
                    self.send_keep_alives(&mut swarm);
                }
            }
        }

        log::info!("Command channel closed; network task exiting");
        Ok(())
    }

    /// Idle connections are closed by the swarm; open chat sessions are
    /// not idle, so give each one some traffic.
    fn send_keep_alives(&self, swarm: &mut Swarm<ChatBehavior>) {
        for peer_id in self.sessions.keys() {
            if swarm.is_connected(peer_id) {
                swarm
                    .behaviour_mut()
                    .chat
                    .send_request(peer_id, WirePayload::KeepAlive);
            }
        }
    }

    async fn emit(&self, event: NetworkEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to deliver network event: {err}");
        }
    }

    async fn handle_command(&mut self, command: NetworkCommand, swarm: &mut Swarm<ChatBehavior>) {
        match command {
            NetworkCommand::Connect {
                handle,
                target,
                sender,
            } => {
                let Some((peer_id, addr)) = parse_target(&target) else {
                    self.emit(NetworkEvent::Errored {
                        handle: Some(handle),
                        reason: format!("invalid peer address '{target}'"),
                    })
                    .await;
                    return;
                };
                if let Some(addr) = addr {
                    swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }

                log::info!("Opening chat session with {peer_id}");
                let request_id = swarm
                    .behaviour_mut()
                    .chat
                    .send_request(&peer_id, WirePayload::Hello { sender });
                self.pending_hellos.insert(request_id, handle);
            }
            NetworkCommand::Send { handle, payload } => {
                let peer_id = match PeerId::from_str(&handle.peer_id) {
                    Ok(peer_id) => peer_id,
                    Err(err) => {
                        log::error!("Cannot send to {handle}: {err}");
                        return;
                    }
                };
                log::debug!("Sending {payload:?} to {peer_id}");
                let request_id = swarm.behaviour_mut().chat.send_request(&peer_id, payload);
                self.pending_sends.insert(request_id, handle);
            }
            NetworkCommand::Close { handle } => {
                self.pending_hellos.retain(|_, pending| pending.id != handle.id);
                let Ok(peer_id) = PeerId::from_str(&handle.peer_id) else {
                    return;
                };
                match self.sessions.get(&peer_id) {
                    Some(open) if open.id != handle.id => {
                        log::debug!("{handle} was superseded by {open}; keeping the connection");
                        return;
                    }
                    Some(_) => {
                        self.sessions.remove(&peer_id);
                    }
                    None => {}
                }
                if swarm.disconnect_peer_id(peer_id).is_err() {
                    log::debug!("Peer {peer_id} was not connected");
                }
            }
        }
    }

    async fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<ChatBehaviorEvent>,
        swarm: &mut Swarm<ChatBehavior>,
    ) {
        match event {
            SwarmEvent::Behaviour(ChatBehaviorEvent::Chat(event)) => {
                self.handle_chat_event(event, swarm).await;
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                log::debug!("Identify info from {peer_id}: {}", info.agent_version);
                for addr in info.listen_addrs {
                    swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Kad(event)) => {
                handle_kad_event(event);
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Mdns(mdns::Event::Discovered(list))) => {
                for (peer_id, addr) in list {
                    log::debug!("mDNS discovered {peer_id} at {addr}");
                    swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Mdns(mdns::Event::Expired(list))) => {
                for (peer_id, _) in list {
                    log::debug!("mDNS record expired for {peer_id}");
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                log::info!("Listening on {address}");
                self.emit(NetworkEvent::Listening(address.to_string())).await;
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                log::debug!("Connection established with {peer_id} ({endpoint:?})");
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    if let Some(handle) = self.sessions.remove(&peer_id) {
                        self.emit(NetworkEvent::Closed(handle)).await;
                    }
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                log::warn!("Outgoing connection to {peer_id:?} failed: {error}");
            }
            _ => {}
        }
    }

    async fn handle_chat_event(
        &mut self,
        event: request_response::Event<WirePayload, WireAck>,
        swarm: &mut Swarm<ChatBehavior>,
    ) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    if swarm
                        .behaviour_mut()
                        .chat
                        .send_response(channel, WireAck { accepted: true })
                        .is_err()
                    {
                        log::warn!("Could not acknowledge request from {peer}");
                    }
                    self.handle_request(peer, request).await;
                }
                request_response::Message::Response {
                    request_id,
                    response,
                } => {
                    self.handle_response(peer, request_id, response).await;
                }
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                let handle = self
                    .pending_hellos
                    .remove(&request_id)
                    .or_else(|| self.pending_sends.remove(&request_id));
                if let Some(handle) = handle {
                    self.emit(NetworkEvent::Errored {
                        handle: Some(handle),
                        reason: format!("request to {peer} failed: {error}"),
                    })
                    .await;
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                log::warn!("Inbound request from {peer} failed: {error}");
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    /// Inbound requests are accepted unconditionally. A hello opens a new
    /// session with the peer and supersedes our own pending hello to it, if
    /// any; any other payload reuses the existing session.
    async fn handle_request(&mut self, peer: PeerId, request: WirePayload) {
        match &request {
            WirePayload::Hello { sender } => {
                log::info!("Incoming connection from {peer} ({sender})");
                let remote = peer.to_string();
                self.pending_hellos
                    .retain(|_, pending| pending.peer_id != remote);
                let handle = ConnectionHandle::new(self.handle_ids.next(), remote);
                self.sessions.insert(peer, handle.clone());
                self.emit(NetworkEvent::Incoming(handle)).await;
                return;
            }
            WirePayload::KeepAlive => {
                log::trace!("Keep-alive from {peer}");
                return;
            }
            WirePayload::Message { .. } | WirePayload::Typing { .. } => {}
        }

        let handle = match self.sessions.get(&peer) {
            Some(handle) => handle.clone(),
            None => {
                let handle = ConnectionHandle::new(self.handle_ids.next(), peer.to_string());
                self.sessions.insert(peer, handle.clone());
                self.emit(NetworkEvent::Incoming(handle.clone())).await;
                handle
            }
        };
        self.emit(NetworkEvent::Payload {
            handle,
            payload: request,
        })
        .await;
    }

    async fn handle_response(&mut self, peer: PeerId, request_id: OutboundRequestId, response: WireAck) {
        if let Some(handle) = self.pending_hellos.remove(&request_id) {
            if response.accepted {
                self.sessions.insert(peer, handle.clone());
                self.emit(NetworkEvent::Opened(handle)).await;
            } else {
                self.emit(NetworkEvent::Errored {
                    handle: Some(handle),
                    reason: format!("{peer} declined the connection"),
                })
                .await;
            }
        } else if let Some(handle) = self.pending_sends.remove(&request_id) {
            if !response.accepted {
                log::warn!("{peer} rejected a payload on {handle}");
            }
        }
    }
}

/// Half the idle timeout, so an open session always sees traffic before
/// the swarm would close its connection.
fn keep_alive_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).max(Duration::from_millis(500))
}

fn handle_kad_event(event: kad::Event) {
    match event {
        kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::Bootstrap(res),
            ..
        } => match res {
            Ok(kad::BootstrapOk { num_remaining, .. }) => {
                log::info!("Kademlia bootstrap ok, remaining peers: {num_remaining}");
            }
            Err(err) => {
                log::warn!("Kademlia bootstrap error: {err:?}");
            }
        },
        kad::Event::RoutingUpdated { peer, .. } => {
            log::debug!("Kademlia routing table updated for {peer}");
        }
        _ => {}
    }
}

/// Keep only entries of the form `<multiaddr>/p2p/<PeerId>`.
pub fn parse_bootstrap_peers(entries: &[String]) -> Vec<(PeerId, Multiaddr)> {
    entries
        .iter()
        .filter_map(|entry| match parse_target(entry) {
            Some((peer_id, Some(mut addr))) => {
                addr.pop();
                Some((peer_id, addr))
            }
            _ => {
                log::warn!("Bootstrap entry `{entry}` is not a multiaddr with /p2p/PeerId suffix");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::P2PTransport;
    use crate::session::{ChatSession, ConnectionState, load_or_create_identity};
    use crate::storage::ChatDatabase;

    const WAIT: Duration = Duration::from_secs(15);

    fn loopback_config(idle_secs: u64) -> AppConfig {
        AppConfig {
            listen_address: "/ip4/127.0.0.1/tcp/0".to_string(),
            enable_mdns: false,
            idle_connection_timeout_secs: idle_secs,
            ..AppConfig::default()
        }
    }

    /// Spawns a client and returns its channels once it is listening.
    async fn start_client(
        keypair: identity::Keypair,
        config: AppConfig,
        handle_ids: HandleIds,
    ) -> (mpsc::Sender<NetworkCommand>, mpsc::Receiver<NetworkEvent>, String) {
        let peer_id = PeerId::from(keypair.public());
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, mut event_rx) = mpsc::channel(32);
        let client = P2PClient::new(event_tx, cmd_rx, Vec::new(), config, handle_ids);
        tokio::spawn(async move {
            if let Err(err) = client.run(keypair).await {
                log::error!("test client stopped: {err}");
            }
        });
        let addr = wait_for(&mut event_rx, |event| match event {
            NetworkEvent::Listening(addr) => Some(addr.clone()),
            _ => None,
        })
        .await;
        (cmd_tx, event_rx, format!("{addr}/p2p/{peer_id}"))
    }

    async fn wait_for<T>(
        events: &mut mpsc::Receiver<NetworkEvent>,
        mut pick: impl FnMut(&NetworkEvent) -> Option<T>,
    ) -> T {
        time::timeout(WAIT, async {
            loop {
                let event = events.recv().await.expect("network task stopped");
                if let Some(found) = pick(&event) {
                    return found;
                }
            }
        })
        .await
        .expect("timed out waiting for a network event")
    }

    struct Node {
        peer_id: PeerId,
        addr: String,
        commands: mpsc::Sender<NetworkCommand>,
        events: mpsc::Receiver<NetworkEvent>,
        handle_ids: HandleIds,
    }

    impl Node {
        async fn start() -> Self {
            let keypair = identity::Keypair::generate_ed25519();
            let peer_id = PeerId::from(keypair.public());
            let handle_ids = HandleIds::default();
            let (commands, events, addr) =
                start_client(keypair, loopback_config(60), handle_ids.clone()).await;
            Self {
                peer_id,
                addr,
                commands,
                events,
                handle_ids,
            }
        }

        async fn dial(&self, target: &str) -> ConnectionHandle {
            let (peer_id, _) = parse_target(target).unwrap();
            let handle = ConnectionHandle::new(self.handle_ids.next(), peer_id.to_string());
            self.commands
                .send(NetworkCommand::Connect {
                    handle: handle.clone(),
                    target: target.to_string(),
                    sender: "tester".to_string(),
                })
                .await
                .unwrap();
            handle
        }

        async fn opened(&mut self) -> ConnectionHandle {
            wait_for(&mut self.events, |event| match event {
                NetworkEvent::Opened(handle) => Some(handle.clone()),
                _ => None,
            })
            .await
        }

        async fn incoming(&mut self) -> ConnectionHandle {
            wait_for(&mut self.events, |event| match event {
                NetworkEvent::Incoming(handle) => Some(handle.clone()),
                _ => None,
            })
            .await
        }
    }

    /// A chat session wired to a live client, pumped by hand.
    struct Peer {
        session: ChatSession<P2PTransport>,
        events: mpsc::Receiver<NetworkEvent>,
        addr: String,
    }

    impl Peer {
        async fn start(name: &str, config: AppConfig) -> Self {
            let store = ChatDatabase::in_memory().unwrap();
            let identity = load_or_create_identity(&store).unwrap();
            let handle_ids = HandleIds::default();
            let (commands, events, addr) =
                start_client(identity.keypair, config, handle_ids.clone()).await;
            let mut session =
                ChatSession::new(store, identity.user, P2PTransport::new(commands, handle_ids));
            session.save_username(name).unwrap();
            Self {
                session,
                events,
                addr,
            }
        }

        async fn pump_until(&mut self, done: impl Fn(&ChatSession<P2PTransport>) -> bool) {
            let Self { session, events, .. } = self;
            time::timeout(WAIT, async {
                while !done(&*session) {
                    let event = events.recv().await.expect("network task stopped");
                    session.handle_event(event).unwrap();
                }
            })
            .await
            .expect("timed out waiting for the session");
        }

        fn drain(&mut self) {
            while let Ok(event) = self.events.try_recv() {
                self.session.handle_event(event).unwrap();
            }
        }
    }

    fn is_open(session: &ChatSession<P2PTransport>) -> bool {
        session.connection_state() == ConnectionState::Open
    }

    fn has_message(session: &ChatSession<P2PTransport>, content: &str) -> bool {
        session
            .message_list()
            .unwrap()
            .iter()
            .any(|message| message.content == content)
    }

    #[test]
    fn bootstrap_entries_need_a_peer_suffix() {
        let peer_id = PeerId::random();
        let entries = vec![
            format!("/ip4/10.0.0.1/tcp/4001/p2p/{peer_id}"),
            "/ip4/10.0.0.2/tcp/4001".to_string(),
            "garbage".to_string(),
        ];
        let peers = parse_bootstrap_peers(&entries);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].0, peer_id);
        assert_eq!(peers[0].1.to_string(), "/ip4/10.0.0.1/tcp/4001");
    }

    #[test]
    fn keep_alive_runs_well_inside_the_idle_timeout() {
        assert_eq!(
            keep_alive_period(Duration::from_secs(300)),
            Duration::from_secs(150)
        );
        assert_eq!(
            keep_alive_period(Duration::from_millis(200)),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn acked_hello_opens_dialer_and_announces_incoming() {
        let mut alice = Node::start().await;
        let mut bob = Node::start().await;

        let handle = alice.dial(&bob.addr).await;
        assert_eq!(alice.opened().await, handle);
        let incoming = bob.incoming().await;
        assert_eq!(incoming.peer_id, alice.peer_id.to_string());
        assert_ne!(incoming.peer_id, bob.peer_id.to_string());
    }

    #[tokio::test]
    async fn payloads_arrive_on_the_incoming_handle_until_closed() {
        let mut alice = Node::start().await;
        let mut bob = Node::start().await;
        let handle = alice.dial(&bob.addr).await;
        alice.opened().await;
        let incoming = bob.incoming().await;

        let payload = WirePayload::Message {
            content: "hi bob".to_string(),
            sender: "Alice".to_string(),
            timestamp: 1,
        };
        alice
            .commands
            .send(NetworkCommand::Send {
                handle: handle.clone(),
                payload: payload.clone(),
            })
            .await
            .unwrap();
        let (got_handle, got_payload) = wait_for(&mut bob.events, |event| match event {
            NetworkEvent::Payload { handle, payload } => Some((handle.clone(), payload.clone())),
            _ => None,
        })
        .await;
        assert_eq!(got_handle, incoming);
        assert_eq!(got_payload, payload);

        alice
            .commands
            .send(NetworkCommand::Close { handle })
            .await
            .unwrap();
        let closed = wait_for(&mut bob.events, |event| match event {
            NetworkEvent::Closed(handle) => Some(handle.clone()),
            _ => None,
        })
        .await;
        assert_eq!(closed, incoming);
    }

    #[tokio::test]
    async fn unreachable_peer_is_reported_on_its_handle() {
        let mut alice = Node::start().await;
        let target = format!("/ip4/127.0.0.1/tcp/1/p2p/{}", PeerId::random());

        let handle = alice.dial(&target).await;
        let failed = wait_for(&mut alice.events, |event| match event {
            NetworkEvent::Errored { handle, .. } => handle.clone(),
            _ => None,
        })
        .await;
        assert_eq!(failed, handle);
    }

    #[tokio::test]
    async fn crossed_dials_still_deliver_messages() {
        let mut alice = Peer::start("Alice", loopback_config(60)).await;
        let mut bob = Peer::start("Bob", loopback_config(60)).await;
        let (alice_addr, bob_addr) = (alice.addr.clone(), bob.addr.clone());

        alice.session.connect_to_friend(&bob_addr).unwrap();
        bob.session.connect_to_friend(&alice_addr).unwrap();
        alice.pump_until(is_open).await;
        bob.pump_until(is_open).await;

        alice.session.send_message("hello from alice").unwrap();
        bob.pump_until(|s| has_message(s, "hello from alice")).await;
        bob.session.send_message("hello from bob").unwrap();
        alice.pump_until(|s| has_message(s, "hello from bob")).await;
    }

    #[tokio::test]
    async fn quiet_session_outlives_the_idle_timeout() {
        let mut alice = Peer::start("Alice", loopback_config(2)).await;
        let mut bob = Peer::start("Bob", loopback_config(2)).await;

        alice.session.connect_to_friend(&bob.addr).unwrap();
        alice.pump_until(is_open).await;
        bob.pump_until(is_open).await;

        time::sleep(Duration::from_secs(5)).await;
        alice.drain();
        bob.drain();
        assert_eq!(alice.session.connection_state(), ConnectionState::Open);
        assert_eq!(bob.session.connection_state(), ConnectionState::Open);

        alice.session.send_message("still here").unwrap();
        bob.pump_until(|s| has_message(s, "still here")).await;
    }
}
