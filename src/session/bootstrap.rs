use libp2p::{PeerId, identity};

use crate::error::{ChatError, Result};
use crate::storage::{ChatDatabase, User};

/// The resolved local identity: the persisted user record and the keypair
/// whose PeerId is `user.user_id`.
pub struct Identity {
    pub user: User,
    pub keypair: identity::Keypair,
}

/// Load the user record, or create one with a fresh keypair on first launch.
///
/// A record whose keypair cannot be decoded gets a new keypair; the stored
/// username is kept.
pub fn load_or_create_identity(store: &ChatDatabase) -> Result<Identity> {
    match store.get_user()? {
        Some(mut user) => match identity::Keypair::from_protobuf_encoding(&user.keypair) {
            Ok(keypair) => {
                let peer_id = PeerId::from(keypair.public()).to_string();
                if peer_id != user.user_id {
                    log::warn!("Stored user id {} does not match keypair; using {peer_id}", user.user_id);
                    user.user_id = peer_id;
                    store.put_user(&user)?;
                }
                log::info!("Loaded identity {} ({})", user.user_id, display_name(&user));
                Ok(Identity { user, keypair })
            }
            Err(err) => {
                log::warn!("Stored identity key is unreadable ({err}); generating a new one");
                let (keypair, encoded, peer_id) = generate_keypair()?;
                user.user_id = peer_id;
                user.keypair = encoded;
                store.put_user(&user)?;
                Ok(Identity { user, keypair })
            }
        },
        None => {
            let (keypair, encoded, peer_id) = generate_keypair()?;
            let user = User::new(peer_id, encoded);
            store.put_user(&user)?;
            log::info!("Generated new identity {}", user.user_id);
            Ok(Identity { user, keypair })
        }
    }
}

fn generate_keypair() -> Result<(identity::Keypair, Vec<u8>, String)> {
    let keypair = identity::Keypair::generate_ed25519();
    let encoded = keypair
        .to_protobuf_encoding()
        .map_err(|e| ChatError::Identity(format!("failed to encode identity key: {e}")))?;
    let peer_id = PeerId::from(keypair.public()).to_string();
    Ok((keypair, encoded, peer_id))
}

fn display_name(user: &User) -> &str {
    if user.username.is_empty() {
        "unnamed"
    } else {
        &user.username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_launch_generates_and_persists_identity() {
        let store = ChatDatabase::in_memory().unwrap();
        let identity = load_or_create_identity(&store).unwrap();

        assert!(!identity.user.user_id.is_empty());
        assert!(identity.user.username.is_empty());
        assert_eq!(
            identity.user.user_id,
            PeerId::from(identity.keypair.public()).to_string()
        );
        assert_eq!(store.get_user().unwrap().unwrap(), identity.user);
        assert_eq!(store.chat_count().unwrap(), 0);
    }

    #[test]
    fn relaunch_reuses_the_stored_identity() {
        let store = ChatDatabase::in_memory().unwrap();
        let first = load_or_create_identity(&store).unwrap();
        let mut user = first.user.clone();
        user.username = "Alice".to_string();
        store.put_user(&user).unwrap();

        let second = load_or_create_identity(&store).unwrap();
        assert_eq!(second.user.user_id, first.user.user_id);
        assert_eq!(second.user.username, "Alice");
    }

    #[test]
    fn corrupt_key_is_replaced_but_name_kept() {
        let store = ChatDatabase::in_memory().unwrap();
        let mut user = User::new("broken", vec![0xde, 0xad]);
        user.username = "Alice".to_string();
        store.put_user(&user).unwrap();

        let identity = load_or_create_identity(&store).unwrap();
        assert_ne!(identity.user.user_id, "broken");
        assert_eq!(identity.user.username, "Alice");
        assert_eq!(store.get_user().unwrap().unwrap().user_id, identity.user.user_id);
    }
}
