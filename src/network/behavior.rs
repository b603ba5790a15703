use std::error::Error;

use libp2p::kad::{self, Mode as KadMode, store::MemoryStore};
use libp2p::request_response::{self, ProtocolSupport};
use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{PeerId, StreamProtocol, identify, identity, mdns};

use crate::common::{WireAck, WirePayload};

pub const CHAT_PROTOCOL: StreamProtocol = StreamProtocol::new("/peer-messenger/chat/1.0.0");
const IDENTIFY_PROTOCOL: &str = "peer-messenger/1.0.0";

#[derive(NetworkBehaviour)]
pub struct ChatBehavior {
    pub chat: request_response::json::Behaviour<WirePayload, WireAck>,
    pub kad: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
}

pub fn build_behavior(
    local_key: &identity::Keypair,
    local_peer_id: PeerId,
    enable_mdns: bool,
) -> Result<ChatBehavior, Box<dyn Error>> {
    let chat = request_response::json::Behaviour::new(
        [(CHAT_PROTOCOL, ProtocolSupport::Full)],
        request_response::Config::default(),
    );

    let store = MemoryStore::new(local_peer_id);
    let mut kad = kad::Behaviour::new(local_peer_id, store);
    kad.set_mode(Some(KadMode::Server));

    let identify_config =
        identify::Config::new(IDENTIFY_PROTOCOL.into(), local_key.public().clone());
    let identify = identify::Behaviour::new(identify_config);

    let mdns = if enable_mdns {
        Some(mdns::tokio::Behaviour::new(
            mdns::Config::default(),
            local_peer_id,
        )?)
    } else {
        None
    };

    Ok(ChatBehavior {
        chat,
        kad,
        identify,
        mdns: Toggle::from(mdns),
    })
}
