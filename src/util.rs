//! Utility functions shared across components.

use std::net::{SocketAddr, ToSocketAddrs};

use chrono::Utc;

use crate::ledger::{Peer, PublicKey};
use crate::{Error, Result};

/// Gets system clock in milliseconds since unix epoch
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Parse a peer description in the format `PUBKEY@IP`, where `PUBKEY` is the
/// hex-encoded ed25519 public key and `IP` resolves to a socket address.
pub fn parse_peer(s: &str) -> Result<Peer> {
    let parts: Vec<&str> = s.split('@').collect();
    if parts.len() != 2 {
        return Err(Error::PeerParseError);
    }
    let public_key = PublicKey::from_hex(parts[0])?;
    let address: SocketAddr = parts[1]
        .to_socket_addrs()
        .map_err(|_| Error::PeerParseError)?
        .next()
        .ok_or(Error::PeerParseError)?;
    Ok(Peer::new(address, public_key))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_peer() {
        let key_hex = hex::encode([7u8; 32]);
        let peer = parse_peer(&format!("{}@127.0.0.1:9090", key_hex)).unwrap();
        assert_eq!(peer.public_key, PublicKey([7u8; 32]));
        assert_eq!(peer.address, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());

        // Errors
        match parse_peer("") {
            Err(Error::PeerParseError) => (),
            other => panic!("unexpected: {:?}", other),
        }

        match parse_peer("@127.0.0.1:9090") {
            Err(Error::PeerParseError) => (),
            other => panic!("unexpected: {:?}", other),
        }

        match parse_peer("deadbeef@127.0.0.1:9090") {
            // too short for a public key
            Err(Error::PeerParseError) => (),
            other => panic!("unexpected: {:?}", other),
        }

        match parse_peer(&format!("{}@not-an-ip", key_hex)) {
            Err(Error::PeerParseError) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
